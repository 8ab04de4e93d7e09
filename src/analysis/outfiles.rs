use log::{debug, warn};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::TimeLines;
use crate::error::Result;

/// Writes the time series of analyzers to plain data files
///
/// Each quantity gets a file `<analyzer>_<quantity>` with one
/// `time<TAB>value` line per time step. Points are appended when the step
/// is complete, that is when the time changes or the run ends.
#[derive(Debug)]
pub struct DataFiles {
    dir: PathBuf,
    /// Points already written, per file
    written: HashMap<String, usize>,
}

impl DataFiles {
    /// Create the output directory if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        debug!("Writing analysis data to {}", dir.display());
        Ok(Self {
            dir,
            written: HashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(analyzer: &str, quantity: &str) -> String {
        let quantity = quantity.replace(['/', ' '], "_");
        format!("{}_{}", analyzer, quantity)
    }

    /// Append the points not written yet
    pub fn flush(&mut self, analyzer: &str, lines: &TimeLines) -> Result<()> {
        for quantity in lines.quantities() {
            let Some(points) = lines.values(quantity) else {
                continue;
            };
            let name = Self::file_name(analyzer, quantity);
            let done = self.written.get(&name).copied().unwrap_or(0);

            let end = points.len();
            if end <= done {
                continue;
            }

            let path = self.dir.join(&name);
            let mut file = if done == 0 {
                File::create(&path)?
            } else {
                OpenOptions::new().append(true).open(&path)?
            };
            for (t, v) in &points[done..end] {
                writeln!(file, "{}\t{}", t, v)?;
            }
            self.written.insert(name, end);
        }
        Ok(())
    }

    /// Start all files over with the next flush
    pub fn reset(&mut self) {
        for name in self.written.keys() {
            if let Err(e) = File::create(self.dir.join(name)) {
                warn!("Could not truncate data file {}: {}", name, e);
            }
        }
        self.written.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_flush_complete_steps() {
        let dir = TempDir::new().unwrap();
        let mut files = DataFiles::new(dir.path().join("out")).unwrap();
        let mut lines = TimeLines::new();

        lines.set_time(1.0);
        lines.set_value("p", 0.5);

        files.flush("Linear", &lines).unwrap();
        let path = dir.path().join("out").join("Linear_p");
        assert_eq!(fs::read_to_string(&path).unwrap(), "1\t0.5\n");

        lines.set_time(2.0);
        lines.set_value("p", 0.25);
        files.flush("Linear", &lines).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1\t0.5\n2\t0.25\n");

        files.reset();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}
