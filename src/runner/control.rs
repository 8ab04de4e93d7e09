//! Run control through the case's `controlDict`
//!
//! OpenFOAM re-reads `system/controlDict` while it runs, so stopping a run or
//! forcing a write is done by rewriting a few top-level entries. The first
//! change takes a backup of the original bytes; [`RunControl::restore`] puts
//! them back exactly.

use log::{debug, info, warn};
use regex::{Captures, Regex};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{FoamError, Result};
use crate::timers::RunRequests;

/// Suffix of the backup written next to the patched file
pub const BACKUP_SUFFIX: &str = ".foamrun.bak";

/// Values for the `stopAt` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAt {
    /// Write the current time step and stop
    WriteNow,
    /// Stop at the next regular write
    NextWrite,
    /// Stop immediately without writing
    NoWriteNow,
}

impl StopAt {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopAt::WriteNow => "writeNow",
            StopAt::NextWrite => "nextWrite",
            StopAt::NoWriteNow => "noWriteNow",
        }
    }
}

fn entry_regex(key: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?m)^({})(\s+)([^;]*);", regex::escape(key)))
}

/// Value of a top-level `key value;` entry
pub fn read_entry(text: &str, key: &str) -> Option<String> {
    let re = entry_regex(key).ok()?;
    re.captures(text).map(|c| c[3].trim().to_string())
}

/// Set a top-level `key value;` entry, appending it when missing
pub fn set_entry(text: &str, key: &str, value: &str) -> String {
    let Ok(re) = entry_regex(key) else {
        return text.to_string();
    };
    if re.is_match(text) {
        re.replacen(text, 1, |c: &Captures| format!("{}{}{};", &c[1], &c[2], value))
            .into_owned()
    } else {
        let mut out = text.to_string();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{} {};\n", key, value));
        out
    }
}

#[derive(Debug, Default)]
struct ControlState {
    /// Bytes of the file before the first change
    original: Option<Vec<u8>>,
    stop: Option<StopAt>,
    write_requested: bool,
    /// `writeControl` and `writeInterval` before the write request
    saved_write: Option<(Option<String>, Option<String>)>,
    restore_at: Option<Instant>,
    /// `startFrom` or `endTime` changed, these outlive a write reset
    run_patched: bool,
    /// Number of changes applied to the file
    patches: usize,
}

/// Shared handle to the run control of one case
///
/// Clones share their state, so the stop-file poller and the supervisor see
/// the same requests. Each stop request is applied at most once per run.
#[derive(Debug, Clone)]
pub struct RunControl {
    path: PathBuf,
    restore_wait: Duration,
    state: Arc<Mutex<ControlState>>,
}

impl RunControl {
    /// Control the `system/controlDict` of `case_dir`
    pub fn new(case_dir: impl AsRef<Path>, restore_wait: Duration) -> Self {
        Self {
            path: case_dir.as_ref().join("system").join("controlDict"),
            restore_wait,
            state: Arc::new(Mutex::new(ControlState::default())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ControlState>> {
        self.state
            .lock()
            .map_err(|_| FoamError::Other("Lock poisoned".to_string()))
    }

    /// Current value of an entry in the file
    pub fn read(&self, key: &str) -> Result<Option<String>> {
        let text = fs::read_to_string(&self.path)
            .map_err(|e| FoamError::control_dict(&self.path, e.to_string()))?;
        Ok(read_entry(&text, key))
    }

    fn apply(&self, state: &mut ControlState, entries: &[(&str, &str)]) -> Result<()> {
        match self.write_entries(state, entries) {
            Ok(()) => {
                state.patches += 1;
                Ok(())
            }
            Err(e) => {
                warn!("Could not patch {}: {}", self.path.display(), e);
                if state.original.is_some() {
                    if let Err(restore) = self.restore_locked(state) {
                        warn!("Restoring {} failed as well: {}", self.path.display(), restore);
                    }
                }
                Err(FoamError::control_dict(&self.path, e.to_string()))
            }
        }
    }

    fn write_entries(&self, state: &mut ControlState, entries: &[(&str, &str)]) -> io::Result<()> {
        let bytes = fs::read(&self.path)?;
        if state.original.is_none() {
            fs::write(self.backup_path(), &bytes)?;
            state.original = Some(bytes.clone());
        }

        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        for (key, value) in entries {
            text = set_entry(&text, key, value);
        }
        fs::write(&self.path, text)
    }

    fn write_stop_at(&self, stop: StopAt) -> Result<bool> {
        let mut state = self.lock()?;
        if state.stop.is_some() {
            debug!("Stop already requested, ignoring {}", stop.as_str());
            return Ok(false);
        }
        if state.original.is_some() {
            warn!("The controlDict has already been modified");
        }
        self.apply(&mut state, &[("stopAt", stop.as_str())])?;
        state.stop = Some(stop);
        warn!("Setting stopAt to {} in {}", stop.as_str(), self.path.display());
        Ok(true)
    }

    /// Stop after writing the current time step
    ///
    /// Returns `false` when a stop was requested before.
    pub fn stop_gracefully(&self) -> Result<bool> {
        self.write_stop_at(StopAt::WriteNow)
    }

    /// Stop at the next regular write
    pub fn stop_at_next_write(&self) -> Result<bool> {
        self.write_stop_at(StopAt::NextWrite)
    }

    /// Stop immediately without writing
    pub fn stop_without_write(&self) -> Result<bool> {
        self.write_stop_at(StopAt::NoWriteNow)
    }

    /// Make the solver write the next time step
    ///
    /// A no-op, returning `false`, while an earlier request is pending.
    pub fn write_results(&self) -> Result<bool> {
        let mut state = self.lock()?;
        if state.write_requested {
            return Ok(false);
        }

        if state.saved_write.is_none() {
            let text = fs::read_to_string(&self.path)
                .map_err(|e| FoamError::control_dict(&self.path, e.to_string()))?;
            state.saved_write = Some((read_entry(&text, "writeControl"), read_entry(&text, "writeInterval")));
        }
        self.apply(&mut state, &[("writeControl", "timeStep"), ("writeInterval", "1")])?;
        state.write_requested = true;
        warn!("Requested a write of the next time step");
        Ok(true)
    }

    /// Start from the latest time, used when restarting a case
    pub fn set_start_from_latest(&self) -> Result<()> {
        let mut state = self.lock()?;
        self.apply(&mut state, &[("startFrom", "latestTime")])?;
        state.run_patched = true;
        Ok(())
    }

    /// Change the end time of the run
    pub fn set_end_time(&self, end_time: f64) -> Result<()> {
        let mut state = self.lock()?;
        self.apply(&mut state, &[("endTime", &end_time.to_string())])?;
        state.run_patched = true;
        Ok(())
    }

    /// The solver re-read the file, a pending write request has been seen
    ///
    /// The write entries are put back after the restore wait, so the changed
    /// timestamp of the file is noticed again by the solver.
    pub fn control_dict_reread(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.write_requested {
            warn!(
                "Preparing to reset controlDict in {} seconds",
                self.restore_wait.as_secs_f64()
            );
            state.restore_at = Some(Instant::now() + self.restore_wait);
            state.write_requested = false;
        }
        Ok(())
    }

    /// When the pending write reset is due
    pub fn restore_deadline(&self) -> Option<Instant> {
        self.state.lock().ok().and_then(|s| s.restore_at)
    }

    /// Undo a write request once its reset is due
    pub fn tick(&self) -> Result<()> {
        let mut state = self.lock()?;
        match state.restore_at {
            Some(at) if at <= Instant::now() => {}
            _ => return Ok(()),
        }
        state.restore_at = None;

        if state.stop.is_none() && !state.run_patched {
            info!("Restoring {}", self.path.display());
            return self.restore_locked(&mut state);
        }

        // Other changes must stay, only the write entries go back
        if let Some((control, interval)) = state.saved_write.take() {
            let mut entries = Vec::new();
            if let Some(control) = control.as_deref() {
                entries.push(("writeControl", control));
            }
            if let Some(interval) = interval.as_deref() {
                entries.push(("writeInterval", interval));
            }
            if !entries.is_empty() {
                self.apply(&mut state, &entries)?;
            }
        }
        Ok(())
    }

    fn restore_locked(&self, state: &mut ControlState) -> Result<()> {
        let Some(original) = state.original.take() else {
            return Ok(());
        };
        if let Err(e) = fs::write(&self.path, &original) {
            state.original = Some(original);
            return Err(FoamError::control_dict(&self.path, e.to_string()));
        }
        let backup = self.backup_path();
        if backup.exists() {
            if let Err(e) = fs::remove_file(&backup) {
                warn!("Could not remove {}: {}", backup.display(), e);
            }
        }

        state.saved_write = None;
        state.write_requested = false;
        state.restore_at = None;
        state.run_patched = false;
        Ok(())
    }

    /// Put the original file back if anything was changed
    pub fn restore(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.original.is_some() {
            info!("Restoring {}", self.path.display());
        }
        self.restore_locked(&mut state)
    }

    /// Whether the file currently differs from its original
    pub fn is_modified(&self) -> bool {
        self.state.lock().map(|s| s.original.is_some()).unwrap_or(false)
    }

    /// The stop that was requested, if any
    pub fn stop_requested(&self) -> Option<StopAt> {
        self.state.lock().ok().and_then(|s| s.stop)
    }

    pub fn write_pending(&self) -> bool {
        self.state.lock().map(|s| s.write_requested).unwrap_or(false)
    }

    /// Number of changes written to the file so far
    pub fn patch_count(&self) -> usize {
        self.state.lock().map(|s| s.patches).unwrap_or(0)
    }
}

impl RunRequests for RunControl {
    fn stop_gracefully(&self) -> Result<()> {
        RunControl::stop_gracefully(self).map(|_| ())
    }

    fn stop_at_next_write(&self) -> Result<()> {
        RunControl::stop_at_next_write(self).map(|_| ())
    }

    fn stop_without_write(&self) -> Result<()> {
        RunControl::stop_without_write(self).map(|_| ())
    }

    fn write_results(&self) -> Result<()> {
        RunControl::write_results(self).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONTROL_DICT: &str = "FoamFile\n{\n    version     2.0;\n    object      controlDict;\n}\n\napplication     simpleFoam;\nstartFrom       startTime;\nstopAt          endTime;\nwriteControl    runTime;\nwriteInterval   100;\n\nfunctions\n{\n    probes\n    {\n        writeControl timeStep;\n    }\n}\n";

    fn case() -> (TempDir, RunControl) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("system")).unwrap();
        fs::write(dir.path().join("system/controlDict"), CONTROL_DICT).unwrap();
        let control = RunControl::new(dir.path(), Duration::ZERO);
        (dir, control)
    }

    #[test]
    fn test_entries() {
        assert_eq!(read_entry(CONTROL_DICT, "stopAt").as_deref(), Some("endTime"));
        assert_eq!(read_entry(CONTROL_DICT, "endTime"), None);

        let patched = set_entry(CONTROL_DICT, "writeControl", "timeStep");
        assert!(patched.contains("writeControl    timeStep;\n"));
        // nested entries are left alone
        assert!(patched.contains("        writeControl timeStep;\n"));
        assert_eq!(patched.matches("writeControl").count(), 2);

        let appended = set_entry("a 1;", "endTime", "5");
        assert_eq!(appended, "a 1;\nendTime 5;\n");
    }

    #[test]
    fn test_stop_gracefully_round_trip() {
        let (dir, control) = case();
        let path = dir.path().join("system/controlDict");

        assert!(control.stop_gracefully().unwrap());
        assert_eq!(control.read("stopAt").unwrap().as_deref(), Some("writeNow"));
        assert!(control.backup_path().exists());
        assert_eq!(control.stop_requested(), Some(StopAt::WriteNow));

        // further stops are ignored
        assert!(!control.stop_gracefully().unwrap());
        assert!(!control.stop_without_write().unwrap());
        assert_eq!(control.read("stopAt").unwrap().as_deref(), Some("writeNow"));
        assert_eq!(control.patch_count(), 1);

        control.restore().unwrap();
        assert_eq!(fs::read(&path).unwrap(), CONTROL_DICT.as_bytes());
        assert!(!control.backup_path().exists());
        assert!(!control.is_modified());
    }

    #[test]
    fn test_write_results_idempotent() {
        let (dir, control) = case();
        let path = dir.path().join("system/controlDict");

        assert!(control.write_results().unwrap());
        let once = fs::read(&path).unwrap();
        assert!(!control.write_results().unwrap());
        assert_eq!(fs::read(&path).unwrap(), once);
        assert_eq!(control.patch_count(), 1);
        assert_eq!(control.read("writeInterval").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_reread_restores_write_entries() {
        let (dir, control) = case();
        let path = dir.path().join("system/controlDict");

        control.write_results().unwrap();
        control.tick().unwrap();
        assert!(control.is_modified());

        control.control_dict_reread().unwrap();
        assert!(control.restore_deadline().is_some());
        assert!(!control.write_pending());
        control.tick().unwrap();
        assert_eq!(fs::read(&path).unwrap(), CONTROL_DICT.as_bytes());

        // a new request is possible again
        assert!(control.write_results().unwrap());
    }

    #[test]
    fn test_reread_keeps_stop_request() {
        let (_dir, control) = case();

        control.write_results().unwrap();
        control.stop_at_next_write().unwrap();
        control.control_dict_reread().unwrap();
        control.tick().unwrap();

        assert_eq!(control.read("writeControl").unwrap().as_deref(), Some("runTime"));
        assert_eq!(control.read("writeInterval").unwrap().as_deref(), Some("100"));
        assert_eq!(control.read("stopAt").unwrap().as_deref(), Some("nextWrite"));
    }

    #[test]
    fn test_missing_control_dict() {
        let dir = TempDir::new().unwrap();
        let control = RunControl::new(dir.path(), Duration::ZERO);
        assert!(matches!(control.stop_gracefully(), Err(FoamError::ControlDict { .. })));
        assert!(!control.is_modified());
        control.restore().unwrap();
    }

    #[test]
    fn test_failed_stop_can_be_retried() {
        let dir = TempDir::new().unwrap();
        let control = RunControl::new(dir.path(), Duration::ZERO);
        assert!(control.stop_gracefully().is_err());
        assert_eq!(control.stop_requested(), None);

        fs::create_dir(dir.path().join("system")).unwrap();
        fs::write(dir.path().join("system/controlDict"), CONTROL_DICT).unwrap();
        assert!(control.stop_gracefully().unwrap());
        assert_eq!(control.read("stopAt").unwrap().as_deref(), Some("writeNow"));
        assert_eq!(control.stop_requested(), Some(StopAt::WriteNow));
    }

    #[test]
    fn test_write_reset_keeps_end_time() {
        let (_dir, control) = case();

        control.set_end_time(2.5).unwrap();
        control.write_results().unwrap();
        control.control_dict_reread().unwrap();
        control.tick().unwrap();

        assert_eq!(control.read("endTime").unwrap().as_deref(), Some("2.5"));
        assert_eq!(control.read("writeControl").unwrap().as_deref(), Some("runTime"));
        assert_eq!(control.read("writeInterval").unwrap().as_deref(), Some("100"));
        assert!(control.is_modified());
    }

    #[test]
    fn test_start_from_and_end_time() {
        let (dir, control) = case();
        control.set_start_from_latest().unwrap();
        control.set_end_time(2.5).unwrap();
        assert_eq!(control.read("startFrom").unwrap().as_deref(), Some("latestTime"));
        assert_eq!(control.read("endTime").unwrap().as_deref(), Some("2.5"));

        control.restore().unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("system/controlDict")).unwrap(),
            CONTROL_DICT
        );
    }
}
