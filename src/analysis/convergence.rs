use log::info;
use regex::Regex;
use std::any::Any;

use super::linear::{linear_regex, parse_solver_block};
use super::{AnalysisContext, DataSnapshot, LineAnalyzer, LineOutcome};

/// Decides when a steady-state run has converged
///
/// A steady solver stops iterating its linear solvers once the residuals fall
/// below their tolerances. When a complete time step had solver output but no
/// solver needed an iteration, the run is converged and [`go_on`] turns false
/// for good.
///
/// [`go_on`]: LineAnalyzer::go_on
#[derive(Debug, Clone)]
pub struct SteadyConvergedAnalyzer {
    regex: Regex,
    /// Solver blocks seen in the current step
    blocks: usize,
    /// Blocks of the current step that needed iterations
    iterating: usize,
    converged: bool,
    converged_at: Option<f64>,
}

impl SteadyConvergedAnalyzer {
    pub fn new() -> Self {
        Self {
            regex: linear_regex(),
            blocks: 0,
            iterating: 0,
            converged: false,
            converged_at: None,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Time at which convergence was detected
    pub fn converged_at(&self) -> Option<f64> {
        self.converged_at
    }
}

impl Default for SteadyConvergedAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineAnalyzer for SteadyConvergedAnalyzer {
    fn do_analysis(&mut self, line: &str, _ctx: &AnalysisContext) -> LineOutcome {
        match parse_solver_block(&self.regex, line) {
            Some(block) => {
                self.blocks += 1;
                if block.iterations > 0 {
                    self.iterating += 1;
                }
                LineOutcome::Matched
            }
            None => LineOutcome::Ignored,
        }
    }

    fn time_changed(&mut self, time: f64) {
        if !self.converged && self.blocks > 0 && self.iterating == 0 {
            info!("Solution converged before time {}", time);
            self.converged = true;
            self.converged_at = Some(time);
        }
        self.blocks = 0;
        self.iterating = 0;
    }

    fn go_on(&self) -> bool {
        !self.converged
    }

    fn current_data(&self) -> DataSnapshot {
        DataSnapshot::from([("converged".to_string(), if self.converged { 1.0 } else { 0.0 })])
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

    fn solve(iterations: u32) -> String {
        format!(
            "GAMG:  Solving for p, Initial residual = 1e-07, Final residual = 1e-07, No Iterations {}",
            iterations
        )
    }

    #[test]
    fn test_converges_after_step_without_iterations() {
        let mut analyzer = SteadyConvergedAnalyzer::new();
        let ctx = AnalysisContext::default();

        analyzer.time_changed(1.0);
        analyzer.do_analysis(&solve(5), &ctx);
        analyzer.time_changed(2.0);
        assert!(analyzer.go_on());

        analyzer.do_analysis(&solve(0), &ctx);
        analyzer.do_analysis(&solve(0), &ctx);
        assert!(analyzer.go_on());
        analyzer.time_changed(3.0);
        assert!(!analyzer.go_on());
        assert_eq!(analyzer.converged_at(), Some(3.0));

        // stays converged
        analyzer.do_analysis(&solve(4), &ctx);
        analyzer.time_changed(4.0);
        assert!(!analyzer.go_on());
    }

    #[test]
    fn test_step_without_solver_output_is_not_convergence() {
        let mut analyzer = SteadyConvergedAnalyzer::new();
        analyzer.time_changed(1.0);
        analyzer.time_changed(2.0);
        assert!(analyzer.go_on());
    }
}
