//! Supervised execution and log analysis for OpenFOAM runs

pub mod analysis;
pub mod buffer;
pub mod config;
pub mod error;
pub mod parallel;
pub mod process;
pub mod runner;
pub mod timers;
pub mod util;

pub use util::logging::init as init_logging;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::analysis::{AnalyzerGroup, LineAnalyzer, RegExpAnalyzer, TimeLines, standard_group};
    pub use crate::config::FoamConfig;
    pub use crate::error::{FoamError, Result};
    pub use crate::parallel::MpiLauncher;
    pub use crate::process::{FoamCommand, FoamWorker, WorkerOptions};
    pub use crate::runner::{
        AnalyzedRunner, BasicRunner, ConvergenceRunner, RunControl, RunData, RunnerBuilder, UtilityRunner,
    };
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
