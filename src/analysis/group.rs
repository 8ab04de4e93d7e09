use log::{debug, trace, warn};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use super::{AnalysisContext, DataFiles, DataSnapshot, LineAnalyzer, LineOutcome, TimeAnalyzer};
use crate::error::{FoamError, Result};

/// Name the time analyzer is registered under
pub const TIME_ANALYZER: &str = "Time";

type TriggerFn = Box<dyn FnMut(f64) + Send>;

/// Callback fired once when the simulation time first reaches a threshold
struct TimeTrigger {
    threshold: f64,
    action: TriggerFn,
    fired: bool,
}

/// An ordered set of named analyzers sharing one simulation time
///
/// The `Time` analyzer is always registered first. When any analyzer
/// reports a new time, every analyzer is told about it before the analyzers
/// after the reporting one see the line.
pub struct AnalyzerGroup {
    analyzers: Vec<(String, Box<dyn LineAnalyzer>)>,
    time: Option<f64>,
    line_nr: usize,
    triggers: Vec<TimeTrigger>,
    listeners: Vec<TriggerFn>,
    files: Option<DataFiles>,
}

impl AnalyzerGroup {
    /// Create a group with the default time analyzer
    pub fn new() -> Self {
        Self::from_time_analyzer(TimeAnalyzer::new())
    }

    /// Create a group recognising time lines with `expr`
    pub fn with_time_regexp(expr: &str) -> Result<Self> {
        Ok(Self::from_time_analyzer(TimeAnalyzer::with_regexp(expr)?))
    }

    fn from_time_analyzer(time: TimeAnalyzer) -> Self {
        Self {
            analyzers: vec![(TIME_ANALYZER.to_string(), Box::new(time) as Box<dyn LineAnalyzer>)],
            time: None,
            line_nr: 0,
            triggers: Vec::new(),
            listeners: Vec::new(),
            files: None,
        }
    }

    /// Register an analyzer after the existing ones
    pub fn add_analyzer<A: LineAnalyzer>(&mut self, name: &str, analyzer: A) -> Result<()> {
        self.add_boxed(name, Box::new(analyzer))
    }

    pub fn add_boxed(&mut self, name: &str, analyzer: Box<dyn LineAnalyzer>) -> Result<()> {
        if self.has(name) {
            return Err(FoamError::DuplicateAnalyzer(name.to_string()));
        }
        debug!("Adding analyzer {}", name);
        self.analyzers.push((name.to_string(), analyzer));
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.analyzers.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn LineAnalyzer> {
        self.analyzers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a.as_ref())
    }

    /// Look up an analyzer with its concrete type
    pub fn get_as<T: LineAnalyzer>(&self, name: &str) -> Option<&T> {
        self.get(name).and_then(|a| a.as_any().downcast_ref::<T>())
    }

    pub fn get_as_mut<T: LineAnalyzer>(&mut self, name: &str) -> Option<&mut T> {
        self.analyzers
            .iter_mut()
            .find(|(n, _)| n == name)
            .and_then(|(_, a)| a.as_any_mut().downcast_mut::<T>())
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.analyzers.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Current simulation time
    pub fn time(&self) -> Option<f64> {
        self.time
    }

    /// Lines analyzed so far
    pub fn line_count(&self) -> usize {
        self.line_nr
    }

    /// Offer a line to all analyzers, returns whether the time changed
    pub fn analyze_line(&mut self, line: &str) -> bool {
        self.line_nr += 1;
        let mut changed = false;

        for i in 0..self.analyzers.len() {
            let ctx = AnalysisContext {
                time: self.time,
                line_nr: self.line_nr,
            };
            if let LineOutcome::NewTime(t) = self.analyzers[i].1.do_analysis(line, &ctx) {
                if self.time != Some(t) {
                    self.set_time(t);
                    changed = true;
                }
            }
        }

        changed
    }

    fn set_time(&mut self, time: f64) {
        trace!("Time changed to {}", time);
        self.flush_files();
        self.time = Some(time);

        for (_, analyzer) in self.analyzers.iter_mut() {
            analyzer.time_changed(time);
        }

        for trigger in self.triggers.iter_mut().filter(|t| !t.fired && time >= t.threshold) {
            debug!("Firing trigger for time {}", trigger.threshold);
            trigger.fired = true;
            (trigger.action)(time);
        }

        for listener in self.listeners.iter_mut() {
            listener(time);
        }
    }

    /// Whether every analyzer wants the run to continue
    pub fn go_on(&self) -> bool {
        self.analyzers.iter().all(|(_, a)| a.go_on())
    }

    /// Run `action` once, when the time first reaches `threshold`
    pub fn add_trigger<F>(&mut self, threshold: f64, action: F)
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.triggers.push(TimeTrigger {
            threshold,
            action: Box::new(action),
            fired: false,
        });
    }

    /// Run `listener` on every time change
    pub fn add_time_listener<F>(&mut self, listener: F)
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Latest data of all analyzers, keyed by analyzer name
    pub fn collect_data(&self) -> BTreeMap<String, DataSnapshot> {
        self.analyzers
            .iter()
            .map(|(name, a)| (name.clone(), a.current_data()))
            .filter(|(_, data)| !data.is_empty())
            .collect()
    }

    /// Human readable overview of the latest values
    pub fn summarize(&self) -> String {
        let mut out = String::new();
        match self.time {
            Some(t) => {
                let _ = writeln!(out, "Time: {}", t);
            }
            None => out.push_str("Time: not started\n"),
        }
        for (name, data) in self.collect_data() {
            if name == TIME_ANALYZER {
                continue;
            }
            let values: Vec<String> = data.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            let _ = writeln!(out, "{}: {}", name, values.join(" "));
        }
        out
    }

    /// Write per-quantity data files into `dir` from now on
    pub fn set_output_dir(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        self.files = Some(DataFiles::new(dir)?);
        Ok(())
    }

    /// Start over with new files, e.g. after a restart log was opened
    pub fn reset_file(&mut self) {
        if let Some(files) = self.files.as_mut() {
            files.reset();
        }
        for (_, analyzer) in self.analyzers.iter_mut() {
            analyzer.reset_file();
        }
    }

    /// Write all remaining points to the data files
    pub fn finish(&mut self) {
        self.flush_files();
    }

    fn flush_files(&mut self) {
        let Some(files) = self.files.as_mut() else {
            return;
        };
        for (name, analyzer) in &self.analyzers {
            if let Some(lines) = analyzer.timelines() {
                if let Err(e) = files.flush(name, lines) {
                    warn!("Could not write data of analyzer {}: {}", name, e);
                }
            }
        }
    }
}

impl Default for AnalyzerGroup {
    fn default() -> Self {
        Self::new()
    }
}
