use serde::Deserialize;
use std::time::Duration;

use crate::analysis::Accumulation;

/// Top-level configuration for supervised runs
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FoamConfig {
    /// How solver output is read and recognised
    #[serde(default)]
    pub solver_output: SolverOutputConfig,
    /// Timer intervals and run-control settings
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// MPI launcher settings for parallel runs
    #[serde(default)]
    pub mpi: MpiSettings,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Custom expressions added to every analyzed run
    #[serde(default)]
    pub custom: Vec<CustomExpression>,
}

/// Settings for reading solver output
#[derive(Debug, Deserialize, Clone)]
pub struct SolverOutputConfig {
    /// Regular expression recognising a new time step; the value is group 2
    #[serde(default = "default_time_regexp")]
    pub time_regexp: String,
    /// Strip leading and trailing whitespace from every line
    #[serde(default)]
    pub strip_spaces: bool,
}

fn default_time_regexp() -> String {
    "^(Time =|Iteration:) (.+)$".to_string()
}

impl Default for SolverOutputConfig {
    fn default() -> Self {
        Self {
            time_regexp: default_time_regexp(),
            strip_spaces: false,
        }
    }
}

/// Settings for timers and controlDict handling
#[derive(Debug, Deserialize, Clone)]
pub struct ExecutionConfig {
    /// Interval for polling the sentinel files in the case directory
    #[serde(default = "default_poll_ms")]
    pub stop_file_interval_ms: u64,
    /// Interval for sampling memory usage of the child
    #[serde(default = "default_poll_ms")]
    pub memory_interval_ms: u64,
    /// Random jitter added to every timer tick
    #[serde(default)]
    pub timer_jitter_ms: u64,
    /// Minimum time between two rewrites of the state files
    #[serde(default = "default_state_write_secs")]
    pub state_write_interval_secs: u64,
    /// Delay after a controlDict re-read before a write request is undone
    #[serde(default = "default_restore_wait_secs")]
    pub control_dict_restore_wait_secs: u64,
}

fn default_poll_ms() -> u64 {
    500
}

fn default_state_write_secs() -> u64 {
    10
}

fn default_restore_wait_secs() -> u64 {
    60
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            stop_file_interval_ms: default_poll_ms(),
            memory_interval_ms: default_poll_ms(),
            timer_jitter_ms: 0,
            state_write_interval_secs: default_state_write_secs(),
            control_dict_restore_wait_secs: default_restore_wait_secs(),
        }
    }
}

impl ExecutionConfig {
    pub fn stop_file_interval(&self) -> Duration {
        Duration::from_millis(self.stop_file_interval_ms)
    }

    pub fn memory_interval(&self) -> Duration {
        Duration::from_millis(self.memory_interval_ms)
    }

    pub fn timer_jitter(&self) -> Duration {
        Duration::from_millis(self.timer_jitter_ms)
    }

    pub fn state_write_interval(&self) -> Duration {
        Duration::from_secs(self.state_write_interval_secs)
    }

    pub fn control_dict_restore_wait(&self) -> Duration {
        Duration::from_secs(self.control_dict_restore_wait_secs)
    }
}

/// MPI launcher settings
#[derive(Debug, Deserialize, Clone)]
pub struct MpiSettings {
    /// MPI flavour; only OpenMPI style arguments are generated
    #[serde(default = "default_mpi_implementation")]
    pub implementation: String,
    /// Launcher executable
    #[serde(default = "default_mpi_run")]
    pub run: String,
    /// Options placed directly after the launcher
    #[serde(default)]
    pub options_pre: Vec<String>,
    /// Options placed after the process count
    #[serde(default)]
    pub options_post: Vec<String>,
    /// Pass `--prefix $MPI_ARCH_PATH` to the launcher
    #[serde(default)]
    pub add_prefix: bool,
}

fn default_mpi_implementation() -> String {
    "OPENMPI".to_string()
}

fn default_mpi_run() -> String {
    "mpirun".to_string()
}

impl Default for MpiSettings {
    fn default() -> Self {
        Self {
            implementation: default_mpi_implementation(),
            run: default_mpi_run(),
            options_pre: Vec::new(),
            options_post: Vec::new(),
            add_prefix: false,
        }
    }
}

/// Logging settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
}

/// Logging level
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

/// A user supplied expression that becomes a named analyzer
#[derive(Debug, Deserialize, Clone)]
pub struct CustomExpression {
    /// Analyzer name
    pub name: String,
    /// Regular expression, `%f%` stands for a floating point number
    pub expr: String,
    /// 1-based capture groups forming the per-entity identifier
    #[serde(default)]
    pub id_groups: Vec<usize>,
    /// Names for the captured values
    #[serde(default)]
    pub titles: Vec<String>,
    /// How values within one time step are combined
    #[serde(default)]
    pub accumulation: Accumulation,
    /// Disabled expressions are skipped
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}
