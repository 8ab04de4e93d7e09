//! Line-oriented analysis of solver output
//!
//! Every line the solver prints is offered to the analyzers of an
//! [`AnalyzerGroup`] in registration order. Analyzers extract quantities into
//! [`TimeLines`] keyed by the simulation time, which the group keeps current.

mod convergence;
mod execution;
mod group;
mod linear;
mod outfiles;
mod pattern;
mod regexp;
mod time;
mod timeline;

pub use convergence::SteadyConvergedAnalyzer;
pub use execution::ExecutionTimeAnalyzer;
pub use group::{AnalyzerGroup, TIME_ANALYZER};
pub use linear::LinearSolverAnalyzer;
pub use outfiles::DataFiles;
pub use pattern::NamedPatternAnalyzer;
pub use regexp::{RegExpAnalyzer, RegExpMatch};
pub use time::TimeAnalyzer;
pub use timeline::{Accumulation, TimeLines};

use std::any::Any;
use std::collections::BTreeMap;

use crate::config::FoamConfig;
use crate::error::Result;

/// Latest value of every quantity an analyzer tracks
pub type DataSnapshot = BTreeMap<String, f64>;

/// Regular expression for a floating point number, substituted for `%f%`
pub const FLOAT_REGEXP: &str = r"[-+]?[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?";

/// State of the group an analyzer sees while it looks at a line
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisContext {
    /// Current simulation time, `None` before the first time line
    pub time: Option<f64>,

    /// 1-based number of the line being analyzed
    pub line_nr: usize,
}

/// Result of offering a line to an analyzer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineOutcome {
    /// The line is not for this analyzer
    Ignored,
    /// The line was recognised and its data recorded
    Matched,
    /// The line announces a simulation time
    NewTime(f64),
}

/// An analyzer for lines of solver output
pub trait LineAnalyzer: Send + Any {
    /// Look at one line
    fn do_analysis(&mut self, line: &str, ctx: &AnalysisContext) -> LineOutcome;

    /// Called once on every analyzer whenever the simulation time changes
    fn time_changed(&mut self, time: f64) {
        let _ = time;
    }

    /// Whether the run should continue as far as this analyzer is concerned
    fn go_on(&self) -> bool {
        true
    }

    /// Latest values, keyed by quantity
    fn current_data(&self) -> DataSnapshot {
        self.timelines().map(TimeLines::latest).unwrap_or_default()
    }

    /// Collected time series, if the analyzer keeps any
    fn timelines(&self) -> Option<&TimeLines> {
        None
    }

    /// Forget per-file state when output starts over in a new log
    fn reset_file(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Parse a number printed by the solver
///
/// Trailing commas and surrounding whitespace are tolerated.
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    text.trim().trim_end_matches(',').parse().ok()
}

/// Replace every `%f%` with [`FLOAT_REGEXP`]
pub fn expand_float_placeholder(expr: &str) -> String {
    expr.replace("%f%", FLOAT_REGEXP)
}

/// A group holding the analyzers every analyzed run uses
///
/// Linear solver residuals, execution time, bounding, Courant number,
/// continuity errors, time step and the enabled custom expressions of the
/// configuration, after the `Time` analyzer.
pub fn standard_group(config: &FoamConfig) -> Result<AnalyzerGroup> {
    let mut group = AnalyzerGroup::with_time_regexp(&config.solver_output.time_regexp)?;
    group.add_analyzer("Linear", LinearSolverAnalyzer::new())?;
    group.add_analyzer("Execution", ExecutionTimeAnalyzer::new())?;
    group.add_analyzer("Bounding", NamedPatternAnalyzer::bounding())?;
    group.add_analyzer("Courant", NamedPatternAnalyzer::courant())?;
    group.add_analyzer("Continuity", NamedPatternAnalyzer::continuity())?;
    group.add_analyzer("DeltaT", NamedPatternAnalyzer::delta_t())?;

    for custom in config.custom.iter().filter(|c| c.enabled) {
        group.add_analyzer(&format!("Custom_{}", custom.name), RegExpAnalyzer::from_expression(custom)?)?;
    }

    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_float_placeholder() {
        let re = Regex::new(&format!("^x = ({})$", FLOAT_REGEXP)).unwrap();
        for value in ["1", "-1.5", "+.5", "3e-05", "2.5E+10"] {
            assert!(re.is_match(&format!("x = {}", value)), "{}", value);
        }
        assert!(expand_float_placeholder("a (%f%) b (%f%)").matches(FLOAT_REGEXP).count() == 2);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 0.25,"), Some(0.25));
        assert_eq!(parse_number("1e-3"), Some(0.001));
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn test_standard_group_order() {
        let group = standard_group(&FoamConfig::default()).unwrap();
        let names = group.names();
        assert_eq!(names[0], TIME_ANALYZER);
        assert!(group.has("Linear"));
        assert!(group.has("DeltaT"));
    }
}
