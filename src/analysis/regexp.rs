use regex::Regex;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;

use super::{
    Accumulation, AnalysisContext, LineAnalyzer, LineOutcome, TimeLines, expand_float_placeholder,
    parse_number,
};
use crate::config::CustomExpression;
use crate::error::{FoamError, Result};

/// One line matched by a [`RegExpAnalyzer`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegExpMatch {
    /// Simulation time of the match, `None` before any time was seen
    pub time: Option<f64>,
    /// Values of the non-id capture groups, NaN where a group is not numeric
    pub values: Vec<f64>,
}

/// Generic extractor driven by a user supplied regular expression
///
/// Capture groups listed in the id groups (1-based) are joined with `_` to
/// form the identifier a match is stored under. All other groups are values.
/// Every match is kept, so utilities without a notion of time can be queried
/// as well as solvers.
#[derive(Debug, Clone)]
pub struct RegExpAnalyzer {
    name: String,
    regex: Regex,
    id_groups: Vec<usize>,
    titles: Vec<String>,
    accumulation: Accumulation,
    data: BTreeMap<String, Vec<RegExpMatch>>,
    lines: TimeLines,
}

impl RegExpAnalyzer {
    /// Create an analyzer; `%f%` in `expr` stands for a floating point number
    pub fn new(name: impl Into<String>, expr: &str) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            regex: Regex::new(&expand_float_placeholder(expr))?,
            id_groups: Vec::new(),
            titles: Vec::new(),
            accumulation: Accumulation::default(),
            data: BTreeMap::new(),
            lines: TimeLines::new(),
        })
    }

    /// Build an analyzer from a configured custom expression
    pub fn from_expression(custom: &CustomExpression) -> Result<Self> {
        Self::new(&custom.name, &custom.expr)?
            .with_id_groups(custom.id_groups.clone())
            .map(|a| a.with_titles(custom.titles.clone()).with_accumulation(custom.accumulation))
    }

    /// Use the given 1-based capture groups as identifier
    pub fn with_id_groups(mut self, groups: Vec<usize>) -> Result<Self> {
        let available = self.regex.captures_len() - 1;
        if let Some(bad) = groups.iter().find(|g| **g == 0 || **g > available) {
            return Err(FoamError::Config(format!(
                "Expression '{}' has {} groups, id group {} is out of range",
                self.name, available, bad
            )));
        }
        self.id_groups = groups;
        Ok(self)
    }

    pub fn with_titles(mut self, titles: Vec<String>) -> Self {
        self.titles = titles;
        self
    }

    pub fn with_accumulation(mut self, accumulation: Accumulation) -> Self {
        self.accumulation = accumulation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All matches stored under `id`; the id is empty without id groups
    pub fn get(&self, id: &str) -> Option<&[RegExpMatch]> {
        self.data.get(id).map(Vec::as_slice)
    }

    /// Identifiers seen so far
    pub fn ids(&self) -> Vec<&str> {
        self.data.keys().map(String::as_str).collect()
    }

    /// Times of the matches stored under `id`
    pub fn times(&self, id: &str) -> Vec<f64> {
        self.data
            .get(id)
            .map(|matches| matches.iter().filter_map(|m| m.time).collect())
            .unwrap_or_default()
    }

    /// Most recent match stored under `id`
    pub fn last(&self, id: &str) -> Option<&RegExpMatch> {
        self.data.get(id).and_then(|matches| matches.last())
    }

    /// All matches, keyed by id
    pub fn matches(&self) -> &BTreeMap<String, Vec<RegExpMatch>> {
        &self.data
    }

    fn title(&self, index: usize) -> String {
        self.titles
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("{}_{}", self.name, index))
    }
}

impl LineAnalyzer for RegExpAnalyzer {
    fn do_analysis(&mut self, line: &str, ctx: &AnalysisContext) -> LineOutcome {
        let Some(caps) = self.regex.captures(line) else {
            return LineOutcome::Ignored;
        };

        let id = self
            .id_groups
            .iter()
            .map(|g| caps.get(*g).map_or("", |m| m.as_str()))
            .collect::<Vec<_>>()
            .join("_");

        let values: Vec<f64> = (1..caps.len())
            .filter(|g| !self.id_groups.contains(g))
            .map(|g| {
                caps.get(g)
                    .and_then(|m| parse_number(m.as_str()))
                    .unwrap_or(f64::NAN)
            })
            .collect();

        for (i, value) in values.iter().enumerate() {
            if value.is_nan() {
                continue;
            }
            let title = self.title(i);
            let series = if id.is_empty() { title } else { format!("{}_{}", id, title) };
            self.lines.set_value_with(&series, *value, self.accumulation);
        }

        self.data.entry(id).or_default().push(RegExpMatch {
            time: ctx.time,
            values,
        });

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
