// src/error.rs
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, FoamError>;

/// Error type for the foamrun library
///
/// Only setup problems and failed file patches end up here. Conditions the
/// solver reports in its output (fatal errors, warnings) are recorded in the
/// run data instead.
#[derive(Error, Debug)]
pub enum FoamError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Case directory {0} does not exist. No use running")]
    CaseNotFound(PathBuf),

    #[error("Machine file error: {0}")]
    MachineFile(String),

    #[error("MPI launcher '{0}' not found on PATH")]
    LauncherNotFound(String),

    #[error("Parallel setup error: {0}")]
    Parallel(String),

    #[error("controlDict error for {path}: {message}")]
    ControlDict { path: PathBuf, message: String },

    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("Analyzer '{0}' is already registered")]
    DuplicateAnalyzer(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl FoamError {
    /// Build a controlDict error for the given file
    pub fn control_dict(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        FoamError::ControlDict {
            path: path.into(),
            message: message.into(),
        }
    }
}
