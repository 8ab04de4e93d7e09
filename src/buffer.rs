//! Bounded text buffers used while supervising a run
//!
//! [`WarningBuffer`] collects the context around `FOAM Warning` lines and
//! stops growing once a global line limit is hit. [`TailBuffer`] keeps only
//! the last lines of the solver output for tail-only logging.

use log::{debug, trace};
use std::collections::VecDeque;

/// Configuration for the warning buffer
#[derive(Debug, Clone)]
pub struct WarningBufferConfig {
    /// Lines of context recorded after each warning
    pub lines_per_warning: usize,

    /// Total context lines across all warnings before collection stops
    pub max_total_lines: usize,
}

impl Default for WarningBufferConfig {
    fn default() -> Self {
        Self {
            lines_per_warning: 20,
            max_total_lines: 500,
        }
    }
}

/// Text collected for the warnings a solver printed
#[derive(Debug, Default)]
pub struct WarningBuffer {
    config: WarningBufferConfig,

    /// Number of warnings seen, collected or not
    count: usize,

    text: Option<String>,

    /// Context lines still to be added for the current warning
    pending: usize,

    /// Context lines added so far
    total_lines: usize,

    collecting: bool,
}

impl WarningBuffer {
    /// Create a new warning buffer with default limits
    pub fn new() -> Self {
        Self::with_config(WarningBufferConfig::default())
    }

    /// Create a new warning buffer with custom limits
    pub fn with_config(config: WarningBufferConfig) -> Self {
        Self {
            config,
            count: 0,
            text: None,
            pending: 0,
            total_lines: 0,
            collecting: true,
        }
    }

    /// Add a line as context of the most recent warning, if one is still open
    pub fn add_context(&mut self, line: &str) {
        if self.pending == 0 {
            return;
        }

        let text = self.text.get_or_insert_with(String::new);
        text.push_str(line);
        text.push('\n');
        self.pending -= 1;
        self.total_lines += 1;

        if self.total_lines > self.config.max_total_lines {
            debug!(
                "Warning context exceeded {} lines, no longer collecting",
                self.config.max_total_lines
            );
            self.collecting = false;
            self.pending = 0;
            text.push_str(&format!(
                "No more warnings added because limit of {} lines exceeded",
                self.config.max_total_lines
            ));
        }
    }

    /// Record a warning line seen at `line_nr`
    pub fn start_warning(&mut self, line_nr: usize, time: Option<&str>, line: &str) {
        self.count += 1;
        if !self.collecting {
            trace!("Warning on line {} not collected", line_nr);
            return;
        }

        self.pending = self.config.lines_per_warning;
        if let Some(text) = self.text.as_mut() {
            text.push_str(&"-".repeat(40));
            text.push('\n');
        }
        let text = self.text.get_or_insert_with(String::new);

        text.push_str(&format!("Warning found by PyFoam on line {} ", line_nr));
        match time {
            Some(t) => text.push_str(&format!("at time {}\n", t)),
            None => text.push_str("before time started\n"),
        }
        text.push('\n');
        text.push_str(line);
        text.push('\n');
    }

    /// Number of warnings seen
    pub fn count(&self) -> usize {
        self.count
    }

    /// The collected text, `None` when no warning was seen
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Whether further warnings still get context
    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Total context lines collected
    pub fn total_lines(&self) -> usize {
        self.total_lines
    }
}

/// Keeps the last `limit` lines of output
///
/// Lines are buffered up to ten times the limit before the buffer is cut back,
/// so truncation happens rarely. The owner is told when a cut happened and
/// can rewrite the tail file.
#[derive(Debug)]
pub struct TailBuffer {
    limit: usize,
    lines: VecDeque<String>,
}

impl TailBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            lines: VecDeque::new(),
        }
    }

    /// Append a line, returns `true` when the buffer was truncated first
    pub fn push(&mut self, line: &str) -> bool {
        let truncated = self.lines.len() > 10 * self.limit;
        if truncated {
            let excess = self.lines.len() - self.limit;
            self.lines.drain(..excess);
            trace!("Tail buffer truncated by {} lines", excess);
        }
        self.lines.push_back(line.to_string());
        truncated
    }

    /// The retained tail, at most `limit` lines
    pub fn tail(&self) -> impl Iterator<Item = &str> {
        let skip = self.lines.len().saturating_sub(self.limit);
        self.lines.iter().skip(skip).map(String::as_str)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_header_and_context() {
        let mut buffer = WarningBuffer::new();
        buffer.start_warning(3, None, "--> FOAM Warning : something");
        buffer.add_context("    From function foo");
        buffer.start_warning(10, Some("0.5"), "--> FOAM Warning : again");

        let text = buffer.text().unwrap();
        assert!(text.starts_with("Warning found by PyFoam on line 3 before time started\n"));
        assert!(text.contains("    From function foo\n"));
        assert!(text.contains(&format!("{}\nWarning found by PyFoam on line 10 at time 0.5\n", "-".repeat(40))));
        assert_eq!(buffer.count(), 2);
    }

    #[test]
    fn test_context_limited_per_warning() {
        let mut buffer = WarningBuffer::new();
        buffer.start_warning(1, None, "FOAM Warning");
        for i in 0..30 {
            buffer.add_context(&format!("context {}", i));
        }
        assert_eq!(buffer.total_lines(), 20);
        assert!(buffer.text().unwrap().contains("context 19\n"));
        assert!(!buffer.text().unwrap().contains("context 20"));
    }

    #[test]
    fn test_global_cap_stops_collection() {
        let mut buffer = WarningBuffer::new();
        for w in 0..30 {
            buffer.start_warning(w * 21, Some("1"), "FOAM Warning");
            for i in 0..20 {
                buffer.add_context(&format!("line {} {}", w, i));
            }
        }

        assert_eq!(buffer.count(), 30);
        assert!(!buffer.is_collecting());
        assert_eq!(buffer.total_lines(), 501);
        let text = buffer.text().unwrap();
        assert!(text.ends_with("No more warnings added because limit of 500 lines exceeded"));
        assert_eq!(text.matches("Warning found by PyFoam").count(), 26);
    }

    #[test]
    fn test_no_context_without_warning() {
        let mut buffer = WarningBuffer::new();
        buffer.add_context("plain line");
        assert!(buffer.text().is_none());
        assert_eq!(buffer.count(), 0);
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        let mut tail = TailBuffer::new(3);
        let mut truncations = 0;
        for i in 0..50 {
            if tail.push(&i.to_string()) {
                truncations += 1;
            }
        }

        let lines: Vec<&str> = tail.tail().collect();
        assert_eq!(lines, vec!["47", "48", "49"]);
        assert!(truncations > 0);
        assert!(tail.len() <= 31);
    }
}
