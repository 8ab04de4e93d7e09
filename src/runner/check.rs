use regex::Regex;

use crate::analysis::{FLOAT_REGEXP, TimeAnalyzer};
use crate::error::Result;

/// Lines the solver prints when it (re-)reads its controlDict
const CONTROL_DICT_READ: [&str; 2] = [
    "Reading object controlDict from file",
    "Re-reading object controlDict from file",
];

/// Line-level checks the supervisor applies to every line
///
/// Tracks whether the solver printed its final `End` after the last time
/// step, and recognises mesh creation and controlDict reads.
#[derive(Debug, Clone)]
pub struct RunnerCheck {
    time: TimeAnalyzer,
    create: Regex,
    end_seen: bool,
}

impl RunnerCheck {
    pub fn new(time_regexp: &str) -> Result<Self> {
        Ok(Self {
            time: TimeAnalyzer::with_regexp(time_regexp)?,
            create: Regex::new(&format!("^Create mesh for time = ({})$", FLOAT_REGEXP))?,
            end_seen: false,
        })
    }

    /// The time a line announces
    ///
    /// A new time clears the end marker, a line reading `End` sets it.
    pub fn get_time(&mut self, line: &str) -> Option<f64> {
        match self.time.parse_time(line) {
            Some(t) => {
                self.end_seen = false;
                Some(t)
            }
            None => {
                if line.trim() == "End" {
                    self.end_seen = true;
                }
                None
            }
        }
    }

    /// The time the mesh is created for
    pub fn get_create_time(&self, line: &str) -> Option<f64> {
        let caps = self.create.captures(line)?;
        caps.get(1)?.as_str().parse().ok()
    }

    /// Whether the line reports a read of the controlDict
    pub fn control_dict_read(&self, line: &str) -> bool {
        CONTROL_DICT_READ.iter().any(|marker| line.contains(marker))
    }

    /// Whether `End` was seen after the last time step
    pub fn end_seen(&self) -> bool {
        self.end_seen
    }
}

impl Default for RunnerCheck {
    fn default() -> Self {
        Self {
            time: TimeAnalyzer::new(),
            create: Regex::new(&format!("^Create mesh for time = ({})$", FLOAT_REGEXP))
                .expect("valid regex"),
            end_seen: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_seen_follows_time() {
        let mut check = RunnerCheck::default();
        assert_eq!(check.get_time("Time = 0.5"), Some(0.5));
        assert!(!check.end_seen());
        assert_eq!(check.get_time("  End  "), None);
        assert!(check.end_seen());
        assert_eq!(check.get_time("Time = 1"), Some(1.0));
        assert!(!check.end_seen());
        assert_eq!(check.get_time("Ending soon"), None);
        assert!(!check.end_seen());
    }

    #[test]
    fn test_create_time_and_control_dict() {
        let check = RunnerCheck::default();
        assert_eq!(check.get_create_time("Create mesh for time = 0.25"), Some(0.25));
        assert_eq!(check.get_create_time("Create mesh for time = now"), None);
        assert!(check.control_dict_read("Re-reading object controlDict from file \"system/controlDict\""));
        assert!(!check.control_dict_read("Reading field p"));
    }

    #[test]
    fn test_custom_time_regexp() {
        let mut check = RunnerCheck::new("^(Step) (.+)$").unwrap();
        assert_eq!(check.get_time("Step 12"), Some(12.0));
        assert_eq!(check.get_time("Time = 1"), None);
        assert!(RunnerCheck::new("(unclosed").is_err());
    }
}
