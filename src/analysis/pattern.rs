use regex::Regex;
use std::any::Any;
use std::collections::HashMap;

use super::{
    Accumulation, AnalysisContext, FLOAT_REGEXP, LineAnalyzer, LineOutcome, TimeLines,
    expand_float_placeholder, parse_number,
};
use crate::error::Result;

/// Name of the capture group that selects the entity a line belongs to
pub const KEY_GROUP: &str = "key";

/// Extracts every named capture of a regular expression as a quantity
///
/// Series are named `<prefix>_<key>_<capture>`, leaving out the parts that
/// are not present. Captures that do not parse as numbers are skipped.
#[derive(Debug, Clone)]
pub struct NamedPatternAnalyzer {
    regex: Regex,
    prefix: Option<String>,
    accumulations: HashMap<String, Accumulation>,
    lines: TimeLines,
}

impl NamedPatternAnalyzer {
    /// Create an analyzer; `%f%` in `expr` stands for a floating point number
    pub fn new(expr: &str) -> Result<Self> {
        Ok(Self {
            regex: Regex::new(&expand_float_placeholder(expr))?,
            prefix: None,
            accumulations: HashMap::new(),
            lines: TimeLines::new(),
        })
    }

    /// Prefix every series name
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set how repeated values of one capture combine within a step
    pub fn with_accumulation(mut self, capture: &str, accumulation: Accumulation) -> Self {
        self.accumulations.insert(capture.to_string(), accumulation);
        self
    }

    fn preset(expr: &str) -> Self {
        Self {
            regex: Regex::new(&expand_float_placeholder(expr)).expect("preset regexp is valid"),
            prefix: None,
            accumulations: HashMap::new(),
            lines: TimeLines::new(),
        }
    }

    /// `bounding k, min: -1e-05 max: 2.1 average: 0.3`
    pub fn bounding() -> Self {
        Self::preset(r"^bounding (?P<key>\S+), min: (?P<min>%f%) max: (?P<max>%f%) average: (?P<average>%f%)")
            .with_accumulation("min", Accumulation::Min)
            .with_accumulation("max", Accumulation::Max)
            .with_accumulation("average", Accumulation::Last)
    }

    /// `Courant Number mean: 0.01 max: 0.4`
    pub fn courant() -> Self {
        Self::preset(r"^Courant Number mean: (?P<mean>%f%) max: (?P<max>%f%)")
            .with_prefix("courant")
            .with_accumulation("mean", Accumulation::Last)
            .with_accumulation("max", Accumulation::Max)
    }

    /// `time step continuity errors : sum local = 1e-08, global = 1e-19, cumulative = 1e-18`
    pub fn continuity() -> Self {
        Self::preset(
            r"^time step continuity errors : sum local = (?P<local>%f%), global = (?P<global>%f%), cumulative = (?P<cumulative>%f%)",
        )
        .with_prefix("continuity")
        .with_accumulation("local", Accumulation::Last)
        .with_accumulation("global", Accumulation::Last)
        .with_accumulation("cumulative", Accumulation::Last)
    }

    /// `deltaT = 0.001`
    pub fn delta_t() -> Self {
        Self::preset(&format!(r"^deltaT = (?P<deltaT>{})", FLOAT_REGEXP))
            .with_accumulation("deltaT", Accumulation::Last)
    }

    fn series_name(&self, key: Option<&str>, capture: &str) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3);
        if let Some(prefix) = self.prefix.as_deref() {
            parts.push(prefix);
        }
        if let Some(key) = key {
            parts.push(key);
        }
        parts.push(capture);
        parts.join("_")
    }
}

impl LineAnalyzer for NamedPatternAnalyzer {
    fn do_analysis(&mut self, line: &str, _ctx: &AnalysisContext) -> LineOutcome {
        let Some(caps) = self.regex.captures(line) else {
            return LineOutcome::Ignored;
        };

        let key = caps.name(KEY_GROUP).map(|m| m.as_str().to_string());
        for capture in self.regex.capture_names().flatten() {
            if capture == KEY_GROUP {
                continue;
            }
            let Some(value) = caps.name(capture).and_then(|m| parse_number(m.as_str())) else {
                continue;
            };
            let name = self.series_name(key.as_deref(), capture);
            let accumulation = self.accumulations.get(capture).copied().unwrap_or_default();
            self.lines.set_value_with(&name, value, accumulation);
        }

        LineOutcome::Matched
    }

    fn time_changed(&mut self, time: f64) {
        self.lines.set_time(time);
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

    fn feed(analyzer: &mut NamedPatternAnalyzer, lines: &[&str]) {
        analyzer.time_changed(1.0);
        for line in lines {
            analyzer.do_analysis(line, &AnalysisContext::default());
        }
    }

    #[test]
    fn test_bounding_per_field() {
        let mut analyzer = NamedPatternAnalyzer::bounding();
        feed(
            &mut analyzer,
            &[
                "bounding k, min: -1e-05 max: 2.5 average: 0.3",
                "bounding k, min: -2e-05 max: 1.5 average: 0.4",
                "bounding epsilon, min: 0 max: 10 average: 1",
            ],
        );

        let lines = analyzer.timelines().unwrap();
        assert_eq!(lines.last("k_min"), Some(-2e-05));
        assert_eq!(lines.last("k_max"), Some(2.5));
        assert_eq!(lines.last("k_average"), Some(0.4));
        assert_eq!(lines.last("epsilon_max"), Some(10.0));
    }

    #[test]
    fn test_courant_and_continuity() {
        let mut courant = NamedPatternAnalyzer::courant();
        feed(&mut courant, &["Courant Number mean: 0.012 max: 0.45"]);
        assert_eq!(courant.timelines().unwrap().last("courant_max"), Some(0.45));

        let mut continuity = NamedPatternAnalyzer::continuity();
        feed(
            &mut continuity,
            &["time step continuity errors : sum local = 1.2e-08, global = -3e-19, cumulative = 4e-18"],
        );
        let lines = continuity.timelines().unwrap();
        assert_eq!(lines.last("continuity_local"), Some(1.2e-08));
        assert_eq!(lines.last("continuity_cumulative"), Some(4e-18));
    }

    #[test]
    fn test_delta_t_and_custom() {
        let mut delta = NamedPatternAnalyzer::delta_t();
        feed(&mut delta, &["deltaT = 0.002", "deltaT = 0.004"]);
        assert_eq!(delta.timelines().unwrap().last("deltaT"), Some(0.004));

        let mut custom = NamedPatternAnalyzer::new(r"^probe (?P<key>\w+) (?P<value>%f%)$").unwrap();
        feed(&mut custom, &["probe a 1.5", "probe b 2"]);
        let lines = custom.timelines().unwrap();
        assert_eq!(lines.last("a_value"), Some(1.5));
        assert_eq!(lines.last("b_value"), Some(2.0));
    }
}
