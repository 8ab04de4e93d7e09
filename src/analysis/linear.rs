use regex::{Captures, Regex};
use std::any::Any;

use super::{Accumulation, AnalysisContext, LineAnalyzer, LineOutcome, TimeLines, parse_number};

/// Expression for the summary line a linear solver prints
pub const LINEAR_REGEXP: &str = r"^(.+):\s+Solving for (.+), Initial residual = (.+), Final residual = (.+), No Iterations ([0-9]+).*$";

/// A parsed linear solver line
#[derive(Debug, Clone, PartialEq)]
pub struct SolverBlock {
    pub solver: String,
    pub field: String,
    /// One entry for scalar fields, one per component for coupled solvers
    pub initial: Vec<f64>,
    pub final_residual: Vec<f64>,
    pub iterations: u64,
}

/// Parse a linear solver summary line
pub fn parse_solver_block(regex: &Regex, line: &str) -> Option<SolverBlock> {
    let caps: Captures = regex.captures(line)?;
    let initial = parse_residuals(&caps[3])?;
    let final_residual = parse_residuals(&caps[4])?;
    let iterations = caps[5].parse().ok()?;

    Some(SolverBlock {
        solver: caps[1].trim().to_string(),
        field: caps[2].trim().to_string(),
        initial,
        final_residual,
        iterations,
    })
}

/// Residuals are a single number or `(a b c)` for coupled solvers
fn parse_residuals(text: &str) -> Option<Vec<f64>> {
    let text = text.trim();
    match text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => inner.split_whitespace().map(parse_number).collect(),
        None => parse_number(text).map(|v| vec![v]),
    }
}

pub(crate) fn linear_regex() -> Regex {
    Regex::new(LINEAR_REGEXP).expect("linear solver regexp is valid")
}

/// Collects initial and final residuals and iteration counts per field
///
/// For every field three series are kept: `<field>` with the first initial
/// residual of the step, `<field>_final` with the last final residual, and
/// `<field>_iterations` with the iterations summed over the step. Coupled
/// solvers produce `<field>[i]` per component.
#[derive(Debug, Clone)]
pub struct LinearSolverAnalyzer {
    regex: Regex,
    iterations_only: bool,
    lines: TimeLines,
}

impl LinearSolverAnalyzer {
    pub fn new() -> Self {
        Self {
            regex: linear_regex(),
            iterations_only: false,
            lines: TimeLines::new(),
        }
    }

    /// Only record the summed iterations, under the field name
    pub fn iterations_only() -> Self {
        Self {
            iterations_only: true,
            ..Self::new()
        }
    }

    fn record(&mut self, block: &SolverBlock) {
        if self.iterations_only {
            self.lines
                .set_value_with(&block.field, block.iterations as f64, Accumulation::Sum);
            return;
        }

        let coupled = block.initial.len() > 1;
        for (i, initial) in block.initial.iter().enumerate() {
            let name = if coupled {
                format!("{}[{}]", block.field, i)
            } else {
                block.field.clone()
            };
            self.lines.set_value_with(&name, *initial, Accumulation::First);
            if let Some(final_residual) = block.final_residual.get(i) {
                self.lines
                    .set_value_with(&format!("{}_final", name), *final_residual, Accumulation::Last);
            }
        }
        self.lines.set_value_with(
            &format!("{}_iterations", block.field),
            block.iterations as f64,
            Accumulation::Sum,
        );
    }
}

impl Default for LinearSolverAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineAnalyzer for LinearSolverAnalyzer {
    fn do_analysis(&mut self, line: &str, _ctx: &AnalysisContext) -> LineOutcome {
        match parse_solver_block(&self.regex, line) {
            Some(block) => {
                self.record(&block);
                LineOutcome::Matched
            }
            None => LineOutcome::Ignored,
        }
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
