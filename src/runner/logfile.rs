//! Log file naming, the restart chain and the log writers

use flate2::Compression;
use flate2::write::GzEncoder;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::control::read_entry;
use crate::buffer::TailBuffer;

/// Default log name for a command: `PyFoam.<program>`
pub fn log_name(argv: &[String]) -> String {
    let program = argv
        .first()
        .map(|p| {
            Path::new(p)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.clone())
        })
        .unwrap_or_default();
    format!("PyFoam.{}", program)
}

/// `path` with `suffix` appended to its file name
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn exists_plain_or_gz(path: &Path) -> bool {
    path.exists() || with_suffix(path, ".gz").exists()
}

/// Where the log of a run goes when it continues an earlier one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartInfo {
    /// Number of the restart, `.restartNN`
    pub number: u32,
    /// The log file for this run
    pub log_file: PathBuf,
}

/// Find the log file of a restarted run
///
/// A run is a restart when the log of an earlier run exists (plain or
/// gzipped) and the controlDict says `startFrom latestTime`. The log then
/// gets the first free `.restartNN` suffix and the earlier logs stay as
/// they are.
pub fn find_restart(log_file: &Path, control_dict: &Path) -> Option<RestartInfo> {
    if !exists_plain_or_gz(log_file) {
        return None;
    }
    let text = fs::read_to_string(control_dict).ok()?;
    if read_entry(&text, "startFrom").as_deref() != Some("latestTime") {
        return None;
    }

    let mut number = 0;
    loop {
        let candidate = with_suffix(log_file, &format!(".restart{:02}", number));
        if !exists_plain_or_gz(&candidate) {
            info!("Restarted run, logging to {}", candidate.display());
            return Some(RestartInfo {
                number,
                log_file: candidate,
            });
        }
        number += 1;
    }
}

/// Remove `<log_file>.restart*` left from an earlier chain of runs
pub fn remove_stale_restarts(log_file: &Path) -> io::Result<usize> {
    let Some(dir) = log_file.parent() else {
        return Ok(0);
    };
    let Some(prefix) = log_file.file_name().map(|n| format!("{}.restart", n.to_string_lossy())) else {
        return Ok(0);
    };
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let path = entry.path();
        debug!("Removing old restart log {}", path.display());
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        removed += 1;
    }
    Ok(removed)
}

/// How the output of a run is logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogMode {
    /// Every line to a plain file
    #[default]
    Full,
    /// Every line to a gzipped file
    Compressed,
    /// Only the last N lines, rewritten when the buffer is cut
    Tail(usize),
    /// No log file
    Disabled,
}

impl LogMode {
    /// Final log path for `log_file` in this mode
    pub fn path_for(&self, log_file: &Path) -> PathBuf {
        match self {
            LogMode::Compressed => with_suffix(log_file, ".gz"),
            _ => log_file.to_path_buf(),
        }
    }
}

/// Destination of the log lines of one run
pub enum LogWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<File>),
    Tail { path: PathBuf, buffer: TailBuffer },
    Disabled,
}

impl LogWriter {
    /// Open the log at `path`, which already carries any `.gz` suffix
    pub fn open(path: &Path, mode: LogMode) -> io::Result<Self> {
        Ok(match mode {
            LogMode::Full => LogWriter::Plain(BufWriter::new(File::create(path)?)),
            LogMode::Compressed => LogWriter::Gzip(GzEncoder::new(File::create(path)?, Compression::default())),
            LogMode::Tail(limit) => LogWriter::Tail {
                path: path.to_path_buf(),
                buffer: TailBuffer::new(limit),
            },
            LogMode::Disabled => LogWriter::Disabled,
        })
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            LogWriter::Plain(out) => {
                writeln!(out, "{}", line)?;
                out.flush()
            }
            LogWriter::Gzip(out) => writeln!(out, "{}", line),
            LogWriter::Tail { path, buffer } => {
                if buffer.push(line) {
                    write_tail(path, buffer)?;
                }
                Ok(())
            }
            LogWriter::Disabled => Ok(()),
        }
    }

    /// Flush and close, the tail is written now
    pub fn close(self) -> io::Result<()> {
        match self {
            LogWriter::Plain(mut out) => out.flush(),
            LogWriter::Gzip(out) => out.finish().map(|_| ()),
            LogWriter::Tail { path, buffer } => write_tail(&path, &buffer),
            LogWriter::Disabled => Ok(()),
        }
    }
}

fn write_tail(path: &Path, buffer: &TailBuffer) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for line in buffer.tail() {
        writeln!(out, "{}", line)?;
    }
    out.flush().inspect_err(|e| warn!("Could not write log tail {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn case_with_start_from(dir: &Path, start_from: &str) -> PathBuf {
        fs::create_dir_all(dir.join("system")).unwrap();
        let control = dir.join("system/controlDict");
        fs::write(&control, format!("startFrom {};\nendTime 1;\n", start_from)).unwrap();
        control
    }

    #[test]
    fn test_log_name() {
        let argv = vec!["/opt/openfoam/bin/simpleFoam".to_string(), "-case".to_string()];
        assert_eq!(log_name(&argv), "PyFoam.simpleFoam");
        assert_eq!(log_name(&[]), "PyFoam.");
    }

    #[test]
    fn test_restart_numbering() {
        let dir = TempDir::new().unwrap();
        let control = case_with_start_from(dir.path(), "latestTime");
        let log = dir.path().join("PyFoam.simpleFoam.logfile");

        assert_eq!(find_restart(&log, &control), None);

        fs::write(&log, "first run\n").unwrap();
        let first = find_restart(&log, &control).unwrap();
        assert_eq!(first.number, 0);
        assert!(first.log_file.ends_with("PyFoam.simpleFoam.logfile.restart00"));

        // a gzipped restart log counts as taken
        fs::write(with_suffix(&first.log_file, ".gz"), "").unwrap();
        let second = find_restart(&log, &control).unwrap();
        assert_eq!(second.number, 1);
    }

    #[test]
    fn test_no_restart_without_latest_time() {
        let dir = TempDir::new().unwrap();
        let control = case_with_start_from(dir.path(), "startTime");
        let log = dir.path().join("PyFoam.icoFoam.logfile");
        fs::write(&log, "").unwrap();
        assert_eq!(find_restart(&log, &control), None);
    }

    #[test]
    fn test_remove_stale_restarts() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("PyFoam.icoFoam.logfile");
        fs::write(&log, "").unwrap();
        fs::write(with_suffix(&log, ".restart00"), "").unwrap();
        fs::create_dir(with_suffix(&log, ".restart01.analyzed")).unwrap();
        fs::write(dir.path().join("PyFoam.other.logfile.restart00"), "").unwrap();

        assert_eq!(remove_stale_restarts(&log).unwrap(), 2);
        assert!(log.exists());
        assert!(dir.path().join("PyFoam.other.logfile.restart00").exists());
    }

    #[test]
    fn test_gzip_log() {
        let dir = TempDir::new().unwrap();
        let path = LogMode::Compressed.path_for(&dir.path().join("run.logfile"));
        assert!(path.to_string_lossy().ends_with(".logfile.gz"));

        let mut writer = LogWriter::open(&path, LogMode::Compressed).unwrap();
        writer.write_line("Time = 1").unwrap();
        writer.write_line("End").unwrap();
        writer.close().unwrap();

        let mut text = String::new();
        GzDecoder::new(File::open(&path).unwrap()).read_to_string(&mut text).unwrap();
        assert_eq!(text, "Time = 1\nEnd\n");
    }

    #[test]
    fn test_tail_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.logfile");
        let mut writer = LogWriter::open(&path, LogMode::Tail(2)).unwrap();
        for i in 0..5 {
            writer.write_line(&format!("line {}", i)).unwrap();
        }
        writer.close().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "line 3\nline 4\n");
    }
}
