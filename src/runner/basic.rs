use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant as TokioInstant;

use super::check::RunnerCheck;
use super::control::RunControl;
use super::data::RunData;
use super::handlers::{Analyzed, Convergence, Plain, RunEnv, RunHandler, Utility};
use super::logfile::{self, LogMode, LogWriter};
use super::sink::{LineSink, Progress, StdoutEcho};
use super::state::{RunState, StateFiles, asctime};
use crate::analysis::AnalyzerGroup;
use crate::buffer::WarningBuffer;
use crate::config::FoamConfig;
use crate::error::{FoamError, Result};
use crate::parallel::MpiLauncher;
use crate::process::{FoamCommand, FoamWorker, ResourceUsage, WorkerOptions};

/// Markers of a fatal error in the solver output
const FATAL_MARKERS: [&str; 2] = ["FOAM FATAL ERROR", "FOAM FATAL IO ERROR"];
const FPE_MARKER: &str = "Foam::sigFpe::sigFpeHandler";
const STACKDUMP_MARKER: &str = "Foam::error::printStack";
const WARNING_MARKER: &str = "FOAM Warning";

/// A run that analyzes its output
pub type AnalyzedRunner = BasicRunner<Analyzed>;

/// A steady run stopped once converged
pub type ConvergenceRunner = BasicRunner<Convergence>;

/// A utility whose output is matched against expressions
pub type UtilityRunner = BasicRunner<Utility>;

type EndTrigger = Box<dyn FnOnce(&RunData) + Send>;

/// Times the way they appear in the state and warning texts
fn format_time(time: f64) -> String {
    if time.is_finite() && time.fract() == 0.0 && time.abs() < 1e16 {
        format!("{:.1}", time)
    } else {
        time.to_string()
    }
}

/// The value following `-case` in a command line
fn case_from_argv(argv: &[String]) -> Option<PathBuf> {
    argv.iter()
        .position(|a| a == "-case")
        .and_then(|i| argv.get(i + 1))
        .map(PathBuf::from)
}

/// Options for a [`BasicRunner`]
pub struct RunnerBuilder {
    argv: Vec<String>,
    case_dir: Option<PathBuf>,
    log_name: Option<String>,
    compress: bool,
    no_log: bool,
    log_tail: Option<usize>,
    silent: bool,
    progress: Option<bool>,
    restart: bool,
    end_time: Option<f64>,
    remark: Option<String>,
    job_id: Option<String>,
    parameters: BTreeMap<String, String>,
    write_state: bool,
    echo_command_line: Option<String>,
    launcher: Option<MpiLauncher>,
    config: FoamConfig,
    worker_options: Option<WorkerOptions>,
    sinks: Vec<Box<dyn LineSink>>,
}

impl RunnerBuilder {
    /// Run the command line `argv`
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            case_dir: None,
            log_name: None,
            compress: false,
            no_log: false,
            log_tail: None,
            silent: false,
            progress: None,
            restart: false,
            end_time: None,
            remark: None,
            job_id: None,
            parameters: BTreeMap::new(),
            write_state: true,
            echo_command_line: None,
            launcher: None,
            config: FoamConfig::default(),
            worker_options: None,
            sinks: Vec::new(),
        }
    }

    /// Change `endTime` in the controlDict for the duration of the run
    pub fn end_time(mut self, end_time: f64) -> Self {
        self.end_time = Some(end_time);
        self
    }

    /// Case directory; defaults to `-case` in the command line, else `.`
    pub fn case_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.case_dir = Some(dir.into());
        self
    }

    /// Base name of the log file instead of `PyFoam.<program>`
    pub fn log_name(mut self, name: impl Into<String>) -> Self {
        self.log_name = Some(name.into());
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn no_log(mut self, no_log: bool) -> Self {
        self.no_log = no_log;
        self
    }

    /// Only keep the last `lines` lines in the log file
    pub fn log_tail(mut self, lines: usize) -> Self {
        self.log_tail = Some(lines);
        self
    }

    /// Do not echo the output
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Print the simulation time instead of the output
    pub fn progress(mut self, long: bool) -> Self {
        self.progress = Some(long);
        self
    }

    /// Continue from the latest time of the case
    pub fn restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    pub fn remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn job_id(mut self, id: impl Into<String>) -> Self {
        self.job_id = Some(id.into());
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Write the `PyFoamState.*` files
    pub fn write_state(mut self, enabled: bool) -> Self {
        self.write_state = enabled;
        self
    }

    /// Print `prefix` and the command line before starting
    pub fn echo_command_line(mut self, prefix: impl Into<String>) -> Self {
        self.echo_command_line = Some(prefix.into());
        self
    }

    /// Run in parallel through an MPI launcher
    pub fn launcher(mut self, launcher: MpiLauncher) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn config(mut self, config: FoamConfig) -> Self {
        self.config = config;
        self
    }

    /// Worker settings instead of the ones from the configuration
    pub fn worker_options(mut self, options: WorkerOptions) -> Self {
        self.worker_options = Some(options);
        self
    }

    /// Send every line to `sink` as well
    pub fn sink(mut self, sink: impl LineSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// A runner without analysis
    pub fn build(self) -> Result<BasicRunner<Plain>> {
        self.build_with(Plain)
    }

    /// A runner analyzing the output with `group`
    pub fn build_analyzed(self, group: AnalyzerGroup) -> Result<AnalyzedRunner> {
        self.build_with(Analyzed::new(group))
    }

    /// A runner stopping the solver once the residuals converged
    pub fn build_convergence(self, group: AnalyzerGroup) -> Result<ConvergenceRunner> {
        self.build_with(Convergence::new(group)?)
    }

    pub fn build_utility(self, utility: Utility) -> Result<UtilityRunner> {
        self.build_with(utility)
    }

    /// A runner with its own handler
    pub fn build_with<H: RunHandler>(mut self, handler: H) -> Result<BasicRunner<H>> {
        if self.argv.is_empty() {
            return Err(FoamError::Other("Empty command line".to_string()));
        }

        let case_dir = self
            .case_dir
            .take()
            .or_else(|| case_from_argv(&self.argv))
            .unwrap_or_else(|| PathBuf::from("."));
        if !case_dir.is_dir() {
            return Err(FoamError::CaseNotFound(case_dir));
        }

        let log_name = self
            .log_name
            .take()
            .unwrap_or_else(|| logfile::log_name(&self.argv));
        let mut data = RunData::new(&self.argv);

        let argv = match self.launcher.as_ref() {
            Some(launcher) => launcher.build_mpirun(&self.argv),
            None => self.argv.clone(),
        };

        let mut log_file = case_dir.join(format!("{}.logfile", log_name));
        let control_dict = case_dir.join("system").join("controlDict");
        match logfile::find_restart(&log_file, &control_dict) {
            Some(restart) => log_file = restart.log_file,
            None => {
                logfile::remove_stale_restarts(&log_file)?;
            }
        }

        let log_mode = match (self.log_tail, self.no_log, self.compress) {
            (Some(lines), no_log, _) => {
                if no_log {
                    warn!("Keeping the last {} lines although no log was asked for", lines);
                }
                LogMode::Tail(lines)
            }
            (None, true, _) => LogMode::Disabled,
            (None, false, true) => LogMode::Compressed,
            (None, false, false) => LogMode::Full,
        };
        let log_file = log_mode.path_for(&log_file);

        let full_case = case_dir.canonicalize().unwrap_or_else(|_| case_dir.clone());
        data.logfile = log_file.display().to_string();
        data.casefullname = full_case.display().to_string();
        data.casename = full_case
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        data.command_line = argv.join(" ");
        data.job_id = self.job_id.take();
        data.parameters = std::mem::take(&mut self.parameters);
        if let Some(remark) = self.remark.take() {
            data.remark = remark;
        }

        let state = if self.write_state {
            StateFiles::new(&case_dir, self.config.execution.state_write_interval())
        } else {
            StateFiles::disabled(&case_dir)
        };

        let mut sinks = std::mem::take(&mut self.sinks);
        match self.progress {
            Some(long) => sinks.insert(0, Box::new(Progress::new(long))),
            None if !self.silent => sinks.insert(0, Box::new(StdoutEcho)),
            None => {}
        }

        let mut worker_options = self
            .worker_options
            .take()
            .unwrap_or_else(|| WorkerOptions::from_config(&self.config.execution));
        worker_options.strip_spaces |= self.config.solver_output.strip_spaces;

        Ok(BasicRunner {
            argv,
            control: RunControl::new(&case_dir, self.config.execution.control_dict_restore_wait()),
            check: RunnerCheck::new(&self.config.solver_output.time_regexp)?,
            case_dir,
            log_name,
            log_file,
            log_mode,
            restart: self.restart,
            end_time: self.end_time,
            echo_command_line: self.echo_command_line,
            state,
            warnings: WarningBuffer::new(),
            data,
            run_state: RunState::Created,
            handler,
            sinks,
            end_triggers: Vec::new(),
            log: None,
            worker_options,
            now_time: None,
            started: false,
            pipe_broken: false,
        })
    }
}

/// Supervises one run of a solver or utility
///
/// Starts the process, looks at every line of its output, keeps the log and
/// the state files, and hands the lines to its [`RunHandler`]. The run data
/// is returned when the process is done.
pub struct BasicRunner<H: RunHandler = Plain> {
    argv: Vec<String>,
    case_dir: PathBuf,
    log_name: String,
    log_file: PathBuf,
    log_mode: LogMode,
    restart: bool,
    end_time: Option<f64>,
    echo_command_line: Option<String>,
    control: RunControl,
    check: RunnerCheck,
    state: StateFiles,
    warnings: WarningBuffer,
    data: RunData,
    run_state: RunState,
    handler: H,
    sinks: Vec<Box<dyn LineSink>>,
    end_triggers: Vec<EndTrigger>,
    log: Option<LogWriter>,
    worker_options: WorkerOptions,
    now_time: Option<f64>,
    started: bool,
    pipe_broken: bool,
}

impl<H: RunHandler> BasicRunner<H> {
    /// The command line actually run, including any MPI launcher
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn case_dir(&self) -> &Path {
        &self.case_dir
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    pub fn data(&self) -> &RunData {
        &self.data
    }

    pub fn state(&self) -> RunState {
        self.run_state
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Run `trigger` once the process is over, in registration order
    pub fn add_end_trigger<F>(&mut self, trigger: F)
    where
        F: FnOnce(&RunData) + Send + 'static,
    {
        self.end_triggers.push(Box::new(trigger));
    }

    /// Started and no fatal error, floating point exception or stack dump
    pub fn run_ok(&self) -> bool {
        self.started && self.data.is_clean()
    }

    /// Simulation time of the last time line
    pub fn time(&self) -> Option<f64> {
        self.now_time
    }

    /// Look at one line of output
    ///
    /// Called by [`start`](Self::start) for every line; exposed so that
    /// output recorded elsewhere can be replayed through the same checks.
    pub fn process_line(&mut self, line: &str) -> Result<()> {
        if let Some(text) = self.data.error_text.as_mut() {
            text.push_str(line);
            text.push('\n');
        }
        self.warnings.add_context(line);

        self.data.lines += 1;
        self.state.write_last_seen();

        let time = self.check.get_time(line);
        if self.check.control_dict_read(line) {
            self.control.control_dict_reread()?;
        }
        if let Some(t) = time {
            self.data.time = Some(t);
            self.now_time = Some(t);
            self.state.write_state(RunState::Running, false);
            self.state.write_now_time(Some(t), false);
            if self.data.create_time.is_none() {
                self.data.create_time = Some(t);
            }
            self.data.step_nr += 1;
            self.data.lasttimesteptime = Some(asctime());
        }
        if let Some(t) = self.check.get_create_time(line) {
            self.data.create_time = Some(t);
        }
        self.data.end_seen = self.check.end_seen();

        self.echo(line, time);

        if FATAL_MARKERS.iter().any(|m| line.contains(m)) {
            self.data.fatal_error = true;
            let when = match self.data.time {
                Some(t) => format!("at time {}", format_time(t)),
                None => "before time started".to_string(),
            };
            self.data.error_text = Some(format!("PyFoam found a Fatal Error {}\n\n{}\n", when, line));
        }
        if line.contains(FPE_MARKER) {
            self.data.fatal_fpe = true;
        }
        if line.contains(STACKDUMP_MARKER) {
            self.data.fatal_stackdump = true;
        }
        if self.data.fatal_error && !line.is_empty() {
            error!("{}", line);
        }

        if line.contains(WARNING_MARKER) {
            let time = self.data.time.map(format_time);
            self.warnings.start_warning(self.data.lines, time.as_deref(), line);
        }
        self.data.warnings = self.warnings.count();
        self.data.warning_text = self.warnings.text().map(str::to_string);

        let env = RunEnv {
            case_dir: &self.case_dir,
            log_name: &self.log_name,
            control: &self.control,
            data: &self.data,
        };
        self.handler.line_handle(line, &env)?;

        if let Some(log) = self.log.as_mut() {
            log.write_line(line)?;
        }
        Ok(())
    }

    fn echo(&mut self, line: &str, time: Option<f64>) {
        for sink in self.sinks.iter_mut() {
            let mut result = sink.line(line);
            if let (Ok(()), Some(t)) = (&result, time) {
                result = sink.time_changed(t);
            }
            match result {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    if !self.pipe_broken {
                        warn!("Output pipe closed, stopping the run");
                    }
                    self.pipe_broken = true;
                }
                Err(e) => debug!("Could not pass on line: {}", e),
            }
        }
    }

    /// Run the process to its end
    ///
    /// Setup failures and controlDict patch failures are returned as errors.
    /// What happens inside the solver is recorded in the returned data.
    pub async fn start(&mut self) -> Result<RunData> {
        if self.started {
            return Err(FoamError::Other("Run already started".to_string()));
        }

        let mut worker = match self.launch().await {
            Ok(worker) => worker,
            Err(e) => {
                self.abort(None).await;
                return Err(e);
            }
        };
        self.started = true;
        info!("Running {} in {}", self.argv.join(" "), self.case_dir.display());

        let result = self.supervise(&mut worker).await;
        match result {
            Ok(interrupted) => {
                self.data.keyboard_interrupt = worker.is_interrupted();
                self.finish(interrupted, &worker.usage(), worker.return_code())
            }
            Err(e) => {
                error!("Run aborted: {}", e);
                self.abort(Some(&mut worker)).await;
                Err(e)
            }
        }
    }

    /// Everything up to a running process; the caller cleans up on error
    async fn launch(&mut self) -> Result<FoamWorker> {
        if self.restart {
            self.control.set_start_from_latest()?;
        }
        if let Some(end_time) = self.end_time {
            self.control.set_end_time(end_time)?;
        }
        self.log = Some(LogWriter::open(&self.log_file, self.log_mode)?);
        let env = RunEnv {
            case_dir: &self.case_dir,
            log_name: &self.log_name,
            control: &self.control,
            data: &self.data,
        };
        self.handler.start_handle(&env)?;

        self.state.write_started_at();
        self.run_state = RunState::Running;
        self.state.write_state(RunState::Running, true);

        if let Some(prefix) = self.echo_command_line.as_deref() {
            println!("{} {}", prefix, self.argv.join(" "));
        }

        let mut options = self.worker_options.clone();
        options.stop_files = Some((self.case_dir.clone(), Arc::new(self.control.clone())));
        let mut worker = FoamWorker::new(FoamCommand::from_argv(self.argv.iter())?, options);
        worker.start().await?;
        Ok(worker)
    }

    /// Leave the case as it was after a failed start or a broken read loop
    ///
    /// A running process is killed and its remaining output discarded.
    async fn abort(&mut self, worker: Option<&mut FoamWorker>) {
        if let Some(worker) = worker {
            worker.interrupt();
            loop {
                match worker.read().await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        debug!("Reading after the abort failed: {}", e);
                        break;
                    }
                }
            }
            self.data.keyboard_interrupt = worker.is_interrupted();
            self.data.set_usage(&worker.usage());
            self.data.return_code = worker.return_code();
        }

        if let Err(e) = self.control.restore() {
            error!("Could not restore the controlDict: {}", e);
        }
        if self.run_state == RunState::Running {
            self.run_state = RunState::Interrupted;
            self.state.write_state(RunState::Interrupted, true);
        }

        if self.started {
            self.data.ok = false;
            self.data.endtime = Some(asctime());
            for trigger in self.end_triggers.drain(..) {
                trigger(&self.data);
            }
        }

        self.close_outputs();
    }

    /// The read loop, returns whether the run was interrupted from the keyboard
    async fn supervise(&mut self, worker: &mut FoamWorker) -> Result<bool> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut interrupted = false;

        loop {
            if self.pipe_broken && !worker.is_interrupted() {
                worker.interrupt();
            }

            let deadline = self.control.restore_deadline();
            let restore_at = deadline
                .map(TokioInstant::from_std)
                .unwrap_or_else(TokioInstant::now);

            tokio::select! {
                read = worker.read() => {
                    if !read? {
                        break;
                    }
                    let line = worker.get_line();
                    self.process_line(&line)?;
                }
                _ = &mut ctrl_c, if !interrupted => {
                    warn!("Keyboard interrupt");
                    interrupted = true;
                    worker.interrupt();
                    self.run_state = RunState::Interrupted;
                    self.state.write_state(RunState::Interrupted, true);
                }
                _ = tokio::time::sleep_until(restore_at), if deadline.is_some() => {
                    self.control.tick()?;
                }
            }
        }

        Ok(interrupted)
    }

    fn finish(&mut self, interrupted: bool, usage: &ResourceUsage, return_code: Option<i32>) -> Result<RunData> {
        self.data.interrupted = interrupted;
        self.data.ok = self.run_ok();
        self.data.end_seen = self.check.end_seen();
        self.data.set_usage(usage);
        self.data.return_code = return_code;
        self.data.endtime = Some(asctime());
        self.data.analyzed = self.handler.analyzed_data();

        self.state.write_now_time(self.now_time, true);

        let env = RunEnv {
            case_dir: &self.case_dir,
            log_name: &self.log_name,
            control: &self.control,
            data: &self.data,
        };
        let stopped = self.handler.stop_handle(&env);
        let restored = self.control.restore();

        if !interrupted {
            self.run_state = if self.data.end_seen {
                RunState::FinishedEnded
            } else {
                RunState::Finished
            };
            self.state.write_state(self.run_state, true);
        }

        for trigger in self.end_triggers.drain(..) {
            trigger(&self.data);
        }

        self.close_outputs();

        info!(
            "Finished {} after {} lines: {} (return code {:?})",
            self.data.solver,
            self.data.lines,
            self.run_state,
            return_code
        );

        stopped?;
        restored?;
        Ok(self.data.clone())
    }

    fn close_outputs(&mut self) {
        if let Some(log) = self.log.take() {
            if let Err(e) = log.close() {
                warn!("Could not close log {}: {}", self.log_file.display(), e);
            }
        }
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.close() {
                debug!("Could not close sink: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::sink::Collect;
    use std::fs;
    use tempfile::TempDir;

    fn runner(dir: &Path) -> BasicRunner<Plain> {
        RunnerBuilder::new(["simpleFoam"])
            .case_dir(dir)
            .silent(true)
            .write_state(false)
            .build()
            .unwrap()
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(1.0), "1.0");
        assert_eq!(format_time(0.25), "0.25");
        assert_eq!(format_time(1e-5), "0.00001");
    }

    #[test]
    fn test_case_from_argv() {
        let argv: Vec<String> = ["icoFoam", "-case", "cavity"].iter().map(|s| s.to_string()).collect();
        assert_eq!(case_from_argv(&argv), Some(PathBuf::from("cavity")));
        assert_eq!(case_from_argv(&argv[..1]), None);
    }

    #[test]
    fn test_missing_case() {
        let result = RunnerBuilder::new(["icoFoam", "-case", "/no/such/case"]).build();
        assert!(matches!(result, Err(FoamError::CaseNotFound(_))));
        assert!(RunnerBuilder::new(Vec::<String>::new()).build().is_err());
    }

    #[test]
    fn test_log_file_names() {
        let dir = TempDir::new().unwrap();
        let plain = runner(dir.path());
        assert_eq!(plain.log_name(), "PyFoam.simpleFoam");
        assert!(plain.log_file().ends_with("PyFoam.simpleFoam.logfile"));

        let gz = RunnerBuilder::new(["simpleFoam"])
            .case_dir(dir.path())
            .log_name("mine")
            .compress(true)
            .build()
            .unwrap();
        assert!(gz.log_file().ends_with("mine.logfile.gz"));
    }

    #[test]
    fn test_time_and_end_tracking() {
        let dir = TempDir::new().unwrap();
        let mut runner = runner(dir.path());

        for line in ["Create mesh for time = 0", "Time = 0.5", "Time = 1", "End"] {
            runner.process_line(line).unwrap();
        }
        let data = runner.data();
        assert_eq!(data.lines, 4);
        assert_eq!(data.step_nr, 2);
        assert_eq!(data.time, Some(1.0));
        assert_eq!(data.create_time, Some(0.0));
        assert!(data.end_seen);
        assert!(data.lasttimesteptime.is_some());

        runner.process_line("Time = 1.5").unwrap();
        assert!(!runner.data().end_seen);
    }

    #[test]
    fn test_fatal_error_is_sticky() {
        let dir = TempDir::new().unwrap();
        let mut runner = runner(dir.path());

        runner.process_line("Time = 2").unwrap();
        runner.process_line("--> FOAM FATAL ERROR:").unwrap();
        runner.process_line("    cannot find file").unwrap();
        runner.process_line("Foam::error::printStack(Foam::Ostream&)").unwrap();
        runner.process_line("all quiet now").unwrap();

        let data = runner.data();
        assert!(data.fatal_error);
        assert!(data.fatal_stackdump);
        assert!(!data.fatal_fpe);
        let text = data.error_text.as_deref().unwrap();
        assert!(text.starts_with("PyFoam found a Fatal Error at time 2.0\n\n--> FOAM FATAL ERROR:\n"));
        assert!(text.ends_with("    cannot find file\nFoam::error::printStack(Foam::Ostream&)\nall quiet now\n"));
        assert!(!runner.run_ok());
    }

    #[test]
    fn test_warnings_counted() {
        let dir = TempDir::new().unwrap();
        let mut runner = runner(dir.path());

        runner.process_line("--> FOAM Warning : early").unwrap();
        runner.process_line("Time = 0.1").unwrap();
        runner.process_line("--> FOAM Warning : late").unwrap();

        let data = runner.data();
        assert_eq!(data.warnings, 2);
        let text = data.warning_text.as_deref().unwrap();
        assert!(text.starts_with("Warning found by PyFoam on line 1 before time started\n"));
        assert!(text.contains("Warning found by PyFoam on line 3 at time 0.1\n"));
    }

    #[test]
    fn test_sinks_and_state_files() {
        let dir = TempDir::new().unwrap();
        let collect = Collect::new();
        let mut runner = RunnerBuilder::new(["simpleFoam"])
            .case_dir(dir.path())
            .silent(true)
            .sink(collect.clone())
            .build()
            .unwrap();

        runner.process_line("Time = 3").unwrap();
        runner.process_line("smoothSolver: Solving for Ux").unwrap();
        assert_eq!(collect.lines(), vec!["Time = 3", "smoothSolver: Solving for Ux"]);
        assert_eq!(
            fs::read_to_string(dir.path().join("PyFoamState.CurrentTime")).unwrap(),
            "3\n"
        );
        assert!(dir.path().join("PyFoamState.LastOutputSeen").exists());
    }
}
