//! What a supervisor does with the lines beyond logging them
//!
//! The supervisor owns one [`RunHandler`]. [`Plain`] does nothing,
//! [`Analyzed`] feeds an [`AnalyzerGroup`] and keeps its data on disk,
//! [`Convergence`] stops a steady run once it has converged, and
//! [`Utility`] collects matches of user expressions for later queries.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::control::RunControl;
use super::data::RunData;
use crate::analysis::{AnalyzerGroup, DataSnapshot, RegExpAnalyzer, RegExpMatch, SteadyConvergedAnalyzer};
use crate::error::Result;

/// Name of the convergence analyzer in a [`Convergence`] group
pub const CONVERGENCE_ANALYZER: &str = "SteadyConverged";

/// What a handler may look at while the run goes on
pub struct RunEnv<'a> {
    pub case_dir: &'a Path,
    pub log_name: &'a str,
    pub control: &'a RunControl,
    pub data: &'a RunData,
}

impl RunEnv<'_> {
    /// Directory for the analysis results of this run
    pub fn analyzed_dir(&self) -> PathBuf {
        self.case_dir.join(format!("{}.analyzed", self.log_name))
    }
}

/// Hooks called by the supervisor
pub trait RunHandler: Send {
    /// Before the process starts
    fn start_handle(&mut self, env: &RunEnv<'_>) -> Result<()> {
        let _ = env;
        Ok(())
    }

    /// For every line, after the supervisor's own checks
    fn line_handle(&mut self, line: &str, env: &RunEnv<'_>) -> Result<()>;

    /// After the process ended, before the controlDict is restored
    fn stop_handle(&mut self, env: &RunEnv<'_>) -> Result<()> {
        let _ = env;
        Ok(())
    }

    /// Latest analysis data, recorded in the run data at the end
    fn analyzed_data(&self) -> Option<BTreeMap<String, DataSnapshot>> {
        None
    }

    /// The analyzers of this handler, if it has any
    fn group(&self) -> Option<&AnalyzerGroup> {
        None
    }
}

/// Logging only
#[derive(Debug, Default)]
pub struct Plain;

impl RunHandler for Plain {
    fn line_handle(&mut self, _line: &str, _env: &RunEnv<'_>) -> Result<()> {
        Ok(())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Runs every line through an analyzer group
///
/// Results go to `<case>/<logname>.analyzed/`: `startData.json` when the
/// run starts, `unfinishedData.json` on time changes at most every
/// `smallest_freq`, and `data.json` at the end.
pub struct Analyzed {
    group: AnalyzerGroup,
    dir: Option<PathBuf>,
    data_files: bool,
    smallest_freq: Duration,
    last_snapshot: Option<Instant>,
}

impl Analyzed {
    pub fn new(group: AnalyzerGroup) -> Self {
        Self {
            group,
            dir: None,
            data_files: false,
            smallest_freq: Duration::from_secs(10),
            last_snapshot: None,
        }
    }

    /// Also write one data file per analyzed quantity
    pub fn with_data_files(mut self, enabled: bool) -> Self {
        self.data_files = enabled;
        self
    }

    /// Minimum time between two `unfinishedData.json` snapshots
    pub fn with_smallest_freq(mut self, freq: Duration) -> Self {
        self.smallest_freq = freq;
        self
    }

    pub fn analyzers(&self) -> &AnalyzerGroup {
        &self.group
    }

    pub fn analyzers_mut(&mut self) -> &mut AnalyzerGroup {
        &mut self.group
    }

    /// Where the results go, known once the run started
    pub fn analyzed_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn snapshot(&mut self, env: &RunEnv<'_>) -> Result<()> {
        let Some(dir) = self.dir.as_ref() else {
            return Ok(());
        };
        if self.last_snapshot.is_some_and(|at| at.elapsed() < self.smallest_freq) {
            return Ok(());
        }
        let mut data = env.data.clone();
        data.analyzed = Some(self.group.collect_data());
        write_json(&dir.join("unfinishedData.json"), &data)?;
        self.last_snapshot = Some(Instant::now());
        Ok(())
    }
}

impl RunHandler for Analyzed {
    fn start_handle(&mut self, env: &RunEnv<'_>) -> Result<()> {
        let dir = env.analyzed_dir();
        if dir.exists() {
            debug!("Removing old analysis in {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        write_json(&dir.join("startData.json"), env.data)?;

        if self.data_files {
            self.group.set_output_dir(&dir)?;
        }
        self.dir = Some(dir);
        Ok(())
    }

    fn line_handle(&mut self, line: &str, env: &RunEnv<'_>) -> Result<()> {
        if self.group.analyze_line(line) {
            if let Err(e) = self.snapshot(env) {
                warn!("Could not write analysis snapshot: {}", e);
            }
        }
        Ok(())
    }

    fn stop_handle(&mut self, env: &RunEnv<'_>) -> Result<()> {
        self.group.finish();
        if let Some(dir) = self.dir.as_ref() {
            write_json(&dir.join("data.json"), env.data)?;
        }
        Ok(())
    }

    fn analyzed_data(&self) -> Option<BTreeMap<String, DataSnapshot>> {
        Some(self.group.collect_data())
    }

    fn group(&self) -> Option<&AnalyzerGroup> {
        Some(&self.group)
    }
}

/// Stops a steady run once the linear solvers no longer iterate
///
/// After every line the group is asked whether to go on; the first `false`
/// asks the solver to write and stop. That request is made once.
pub struct Convergence {
    analyzed: Analyzed,
    stop_requested: bool,
}

impl Convergence {
    pub fn new(mut group: AnalyzerGroup) -> Result<Self> {
        group.add_analyzer(CONVERGENCE_ANALYZER, SteadyConvergedAnalyzer::new())?;
        Ok(Self {
            analyzed: Analyzed::new(group),
            stop_requested: false,
        })
    }

    pub fn with_data_files(mut self, enabled: bool) -> Self {
        self.analyzed = self.analyzed.with_data_files(enabled);
        self
    }

    pub fn analyzers(&self) -> &AnalyzerGroup {
        self.analyzed.analyzers()
    }

    pub fn analyzers_mut(&mut self) -> &mut AnalyzerGroup {
        self.analyzed.analyzers_mut()
    }

    pub fn is_converged(&self) -> bool {
        self.analyzers()
            .get_as::<SteadyConvergedAnalyzer>(CONVERGENCE_ANALYZER)
            .is_some_and(SteadyConvergedAnalyzer::is_converged)
    }

    /// Whether the stop has been asked for
    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }
}

impl RunHandler for Convergence {
    fn start_handle(&mut self, env: &RunEnv<'_>) -> Result<()> {
        self.analyzed.start_handle(env)
    }

    fn line_handle(&mut self, line: &str, env: &RunEnv<'_>) -> Result<()> {
        self.analyzed.line_handle(line, env)?;
        if !self.stop_requested && !self.analyzed.group.go_on() {
            info!(
                "Run converged at time {:?}, stopping",
                self.analyzed.group.time()
            );
            env.control.stop_gracefully()?;
            self.stop_requested = true;
        }
        Ok(())
    }

    fn stop_handle(&mut self, env: &RunEnv<'_>) -> Result<()> {
        self.analyzed.stop_handle(env)
    }

    fn analyzed_data(&self) -> Option<BTreeMap<String, DataSnapshot>> {
        self.analyzed.analyzed_data()
    }

    fn group(&self) -> Option<&AnalyzerGroup> {
        self.analyzed.group()
    }
}

/// Collects what user expressions match in the output of a utility
#[derive(Default)]
pub struct Utility {
    group: AnalyzerGroup,
}

impl Utility {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an expression under its own name
    pub fn add(&mut self, analyzer: RegExpAnalyzer) -> Result<()> {
        let name = analyzer.name().to_string();
        self.group.add_analyzer(&name, analyzer)
    }

    /// Register `expr`, `%f%` standing for a number
    pub fn add_expression(&mut self, name: &str, expr: &str) -> Result<()> {
        self.add(RegExpAnalyzer::new(name, expr)?)
    }

    pub fn analyzer(&self, name: &str) -> Option<&RegExpAnalyzer> {
        self.group.get_as::<RegExpAnalyzer>(name)
    }

    /// Identifiers seen by an expression
    pub fn ids(&self, name: &str) -> Vec<&str> {
        self.analyzer(name).map(RegExpAnalyzer::ids).unwrap_or_default()
    }

    /// All matches of an expression for one identifier
    pub fn get(&self, name: &str, id: &str) -> Option<&[RegExpMatch]> {
        self.analyzer(name)?.get(id)
    }

    pub fn times(&self, name: &str, id: &str) -> Vec<f64> {
        self.analyzer(name).map(|a| a.times(id)).unwrap_or_default()
    }

    pub fn last(&self, name: &str, id: &str) -> Option<&RegExpMatch> {
        self.analyzer(name)?.last(id)
    }
}

impl RunHandler for Utility {
    fn line_handle(&mut self, line: &str, _env: &RunEnv<'_>) -> Result<()> {
        self.group.analyze_line(line);
        Ok(())
    }

    fn analyzed_data(&self) -> Option<BTreeMap<String, DataSnapshot>> {
        Some(self.group.collect_data())
    }

    fn group(&self) -> Option<&AnalyzerGroup> {
        Some(&self.group)
    }
}
