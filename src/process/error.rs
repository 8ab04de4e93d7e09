use std::io;
use thiserror::Error;

/// Result type for process operations
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

/// Errors that can occur while running the solver process
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read from process: {0}")]
    Read(io::Error),

    #[error("Failed to wait for process: {0}")]
    Wait(io::Error),

    #[error("Process has not been started")]
    NotStarted,

    #[error("Process was already started")]
    AlreadyStarted,

    #[error("Process output handle unavailable")]
    NoOutput,

    #[error("Process task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for ProcessError {
    fn from(err: tokio::task::JoinError) -> Self {
        ProcessError::Task(err.to_string())
    }
}

impl From<ProcessError> for crate::error::FoamError {
    fn from(err: ProcessError) -> Self {
        crate::error::FoamError::Process(err.to_string())
    }
}
