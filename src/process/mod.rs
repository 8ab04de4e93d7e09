//! Running the solver process
//!
//! This module spawns a solver or utility, merges its output streams into one
//! ordered stream of decoded lines, and follows the resources it uses. The
//! [`FoamWorker`] ties these together for a supervisor.

mod command;
mod error;
pub mod resources;
mod stream;
mod worker;

pub use command::FoamCommand;
pub use error::{ProcessError, ProcessResult};
pub use resources::ResourceUsage;
pub use stream::{LineReader, decode_line};
pub use worker::{FoamWorker, WorkerOptions};
