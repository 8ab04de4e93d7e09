use regex::Regex;
use std::any::Any;

use super::{AnalysisContext, DataSnapshot, LineAnalyzer, LineOutcome, parse_number};
use crate::error::Result;

/// Default expression for lines announcing a new time
pub const DEFAULT_TIME_REGEXP: &str = "^(Time =|Iteration:) (.+)$";

/// Recognises the lines that announce a new simulation time
///
/// The time value is taken from the second capture group.
#[derive(Debug, Clone)]
pub struct TimeAnalyzer {
    regex: Regex,
    time: Option<f64>,
}

impl TimeAnalyzer {
    pub fn new() -> Self {
        Self {
            regex: Regex::new(DEFAULT_TIME_REGEXP).expect("default time regexp is valid"),
            time: None,
        }
    }

    pub fn with_regexp(expr: &str) -> Result<Self> {
        Ok(Self {
            regex: Regex::new(expr)?,
            time: None,
        })
    }

    /// Time announced by `line`, if any
    pub fn parse_time(&self, line: &str) -> Option<f64> {
        let caps = self.regex.captures(line)?;
        caps.get(2).and_then(|m| parse_number(m.as_str()))
    }

    /// Last time seen
    pub fn time(&self) -> Option<f64> {
        self.time
    }
}

impl Default for TimeAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineAnalyzer for TimeAnalyzer {
    fn do_analysis(&mut self, line: &str, _ctx: &AnalysisContext) -> LineOutcome {
        match self.parse_time(line) {
            Some(t) => {
                self.time = Some(t);
                LineOutcome::NewTime(t)
            }
            None => LineOutcome::Ignored,
        }
    }

    fn current_data(&self) -> DataSnapshot {
        self.time.map(|t| ("time".to_string(), t)).into_iter().collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_and_iteration_lines() {
        let mut analyzer = TimeAnalyzer::new();
        let ctx = AnalysisContext::default();

        assert_eq!(analyzer.do_analysis("Time = 0.005", &ctx), LineOutcome::NewTime(0.005));
        assert_eq!(analyzer.do_analysis("Iteration: 12", &ctx), LineOutcome::NewTime(12.0));
        assert_eq!(analyzer.do_analysis("ExecutionTime = 1 s", &ctx), LineOutcome::Ignored);
        assert_eq!(analyzer.do_analysis("Time = abc", &ctx), LineOutcome::Ignored);
        assert_eq!(analyzer.time(), Some(12.0));
    }

    #[test]
    fn test_custom_regexp() {
        let analyzer = TimeAnalyzer::with_regexp("^(t) = (.+)$").unwrap();
        assert_eq!(analyzer.parse_time("t = 3"), Some(3.0));
        assert!(TimeAnalyzer::with_regexp("(").is_err());
    }
}
