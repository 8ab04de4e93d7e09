//! Supervising one run of a solver or utility
//!
//! [`BasicRunner`] starts the process, checks every line for time steps,
//! fatal errors and warnings, keeps the log and the state files current, and
//! passes the lines on to its handler. [`RunControl`] changes the case's
//! controlDict to stop the solver or make it write, both on request and when
//! sentinel files appear in the case.

mod basic;
mod check;
pub mod control;
mod data;
mod handlers;
pub mod logfile;
mod sink;
mod state;

pub use basic::{AnalyzedRunner, BasicRunner, ConvergenceRunner, RunnerBuilder, UtilityRunner};
pub use check::RunnerCheck;
pub use control::{RunControl, StopAt};
pub use data::{DEFAULT_REMARK, RunData};
pub use handlers::{Analyzed, CONVERGENCE_ANALYZER, Convergence, Plain, RunEnv, RunHandler, Utility};
pub use logfile::{LogMode, RestartInfo};
pub use sink::{Collect, LineSink, Progress, StdoutEcho};
pub use state::{RunState, STATE_PREFIX, StateFiles};
