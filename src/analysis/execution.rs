use regex::Regex;
use std::any::Any;

use super::{Accumulation, AnalysisContext, DataSnapshot, LineAnalyzer, LineOutcome, TimeLines, parse_number};

pub const EXECUTION_REGEXP: &str = r"^ExecutionTime = (.+) s\s+ClockTime = (.+) s$";

/// Tracks the CPU and wall clock time the solver reports per step
#[derive(Debug, Clone)]
pub struct ExecutionTimeAnalyzer {
    regex: Regex,
    last_cpu: f64,
    last_clock: f64,
    lines: TimeLines,
}

impl ExecutionTimeAnalyzer {
    pub fn new() -> Self {
        Self {
            regex: Regex::new(EXECUTION_REGEXP).expect("execution time regexp is valid"),
            last_cpu: 0.0,
            last_clock: 0.0,
            lines: TimeLines::new(),
        }
    }

    /// CPU seconds reported by the last execution time line
    pub fn total_cpu(&self) -> f64 {
        self.last_cpu
    }

    /// Wall clock seconds reported by the last execution time line
    pub fn total_clock(&self) -> f64 {
        self.last_clock
    }
}

impl Default for ExecutionTimeAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineAnalyzer for ExecutionTimeAnalyzer {
    fn do_analysis(&mut self, line: &str, _ctx: &AnalysisContext) -> LineOutcome {
        let Some(caps) = self.regex.captures(line) else {
            return LineOutcome::Ignored;
        };
        let (Some(cpu), Some(clock)) = (parse_number(&caps[1]), parse_number(&caps[2])) else {
            return LineOutcome::Ignored;
        };

        self.lines.set_value_with("cpu", cpu - self.last_cpu, Accumulation::Sum);
        self.lines.set_value_with("clock", clock - self.last_clock, Accumulation::Sum);
        self.last_cpu = cpu;
        self.last_clock = clock;

        LineOutcome::Matched
    }

    fn time_changed(&mut self, time: f64) {
        self.lines.set_time(time);
    }

    fn current_data(&self) -> DataSnapshot {
        let mut data = self.lines.latest();
        data.insert("cpuTotal".to_string(), self.last_cpu);
        data.insert("clockTotal".to_string(), self.last_clock);
        data
    }

    fn timelines(&self) -> Option<&TimeLines> {
        Some(&self.lines)
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
    fn test_step_deltas_and_totals() {
        let mut analyzer = ExecutionTimeAnalyzer::new();
        let ctx = AnalysisContext::default();

        analyzer.time_changed(1.0);
        assert_eq!(
            analyzer.do_analysis("ExecutionTime = 0.5 s  ClockTime = 1 s", &ctx),
            LineOutcome::Matched
        );
        analyzer.time_changed(2.0);
        analyzer.do_analysis("ExecutionTime = 1.25 s  ClockTime = 3 s", &ctx);

        let lines = analyzer.timelines().unwrap();
        assert_eq!(lines.values("cpu"), Some(&[(1.0, 0.5), (2.0, 0.75)][..]));
        assert_eq!(lines.last("clock"), Some(2.0));

        let data = analyzer.current_data();
        assert_eq!(data["cpuTotal"], 1.25);
        assert_eq!(data["clockTotal"], 3.0);
    }
}
