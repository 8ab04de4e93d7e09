//! State files for tools watching a run from outside
//!
//! Each file in the case directory holds one value and is rewritten with
//! truncate-and-write semantics. Readers may see a partial file.

use chrono::Local;
use log::{trace, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Prefix of every state file
pub const STATE_PREFIX: &str = "PyFoamState.";

/// Format of the time stamps written to the state files
pub const ASCTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Current local time in asctime layout
pub fn asctime() -> String {
    Local::now().format(ASCTIME_FORMAT).to_string()
}

/// Lifecycle of a supervised run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Created,
    Running,
    Interrupted,
    Finished,
    /// Finished after printing `End`
    FinishedEnded,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Created => "Created",
            RunState::Running => "Running",
            RunState::Interrupted => "Interrupted",
            RunState::Finished => "Finished",
            RunState::FinishedEnded => "Finished - Ended",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Interrupted | RunState::Finished | RunState::FinishedEnded)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writer for the `PyFoamState.*` files of one case
#[derive(Debug)]
pub struct StateFiles {
    dir: PathBuf,
    enabled: bool,
    interval: Duration,
    last_state: Option<Instant>,
    last_seen: Option<Instant>,
    last_time: Option<Instant>,
}

impl StateFiles {
    /// Write into `dir`, refreshing throttled files at most every `interval`
    pub fn new(dir: impl AsRef<Path>, interval: Duration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            enabled: true,
            interval,
            last_state: None,
            last_seen: None,
            last_time: None,
        }
    }

    /// Turn all writes into no-ops
    pub fn disabled(dir: impl AsRef<Path>) -> Self {
        Self {
            enabled: false,
            ..Self::new(dir, Duration::ZERO)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", STATE_PREFIX, name))
    }

    /// Content of a state file, if it exists
    pub fn read(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.path(name)).ok()
    }

    fn write(&self, name: &str, value: &str) {
        if !self.enabled {
            return;
        }
        let path = self.path(name);
        trace!("Writing {} to {}", value, path.display());
        if let Err(e) = fs::write(&path, format!("{}\n", value)) {
            warn!("Could not write state file {}: {}", path.display(), e);
        }
    }

    fn due(last: Option<Instant>, interval: Duration) -> bool {
        last.is_none_or(|at| at.elapsed() > interval)
    }

    pub fn write_started_at(&self) {
        self.write("StartedAt", &asctime());
    }

    /// Write the run state
    ///
    /// Unless `always` is set this only refreshes the file when the last
    /// write is older than the interval less one second.
    pub fn write_state(&mut self, state: RunState, always: bool) {
        let interval = self.interval.saturating_sub(Duration::from_secs(1));
        if always || Self::due(self.last_state, interval) {
            self.write("TheState", state.as_str());
            self.last_state = Some(Instant::now());
        }
    }

    /// Record that output was seen, throttled to the interval
    pub fn write_last_seen(&mut self) {
        if Self::due(self.last_seen, self.interval) {
            self.write("LastOutputSeen", &asctime());
            self.last_seen = Some(Instant::now());
        }
    }

    /// Record the current simulation time
    ///
    /// Nothing is written before a time is known.
    pub fn write_now_time(&mut self, time: Option<f64>, force: bool) {
        let Some(time) = time else {
            return;
        };
        if force || Self::due(self.last_time, self.interval) {
            self.write("CurrentTime", &time.to_string());
            self.last_time = Some(Instant::now());
        }
    }
}
