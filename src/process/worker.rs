use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::process::ChildStdout;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::resources::ResourceUsage;
use super::stream::LineReader;
use super::{FoamCommand, ProcessError, ProcessResult};
use crate::config::ExecutionConfig;
use crate::timers::{MemorySampler, RunRequests, StopFilePoller, TimerSet};

/// Options for running a process under a [`FoamWorker`]
#[derive(Clone)]
pub struct WorkerOptions {
    /// Strip leading and trailing whitespace of every line
    pub strip_spaces: bool,

    /// Case directory polled for sentinel files and who handles them
    pub stop_files: Option<(PathBuf, Arc<dyn RunRequests>)>,

    pub stop_file_interval: Duration,

    /// Follow memory and CPU usage of the child
    pub sample_resources: bool,

    pub memory_interval: Duration,

    /// Random delay added to every timer tick
    pub jitter: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from_config(&ExecutionConfig::default())
    }
}

impl WorkerOptions {
    /// Timer settings from the configuration
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            strip_spaces: false,
            stop_files: None,
            stop_file_interval: config.stop_file_interval(),
            sample_resources: cfg!(target_os = "linux"),
            memory_interval: config.memory_interval(),
            jitter: config.timer_jitter(),
        }
    }
}

/// Runs one process and hands out its output line by line
///
/// The child's stdout and stderr arrive as one stream. Beside the process
/// two timers run: one polls the case for sentinel files, the other samples
/// resource usage.
pub struct FoamWorker {
    command: FoamCommand,
    options: WorkerOptions,
    reader: Option<LineReader<ChildStdout>>,
    line: Mutex<String>,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    waiter: Option<JoinHandle<ProcessResult<ExitStatus>>>,
    status: Option<ExitStatus>,
    usage: Arc<Mutex<ResourceUsage>>,
    timers: TimerSet,
    started: Option<Instant>,
    interrupted: bool,
    eof: bool,
    finished: bool,
}

impl FoamWorker {
    pub fn new(command: FoamCommand, options: WorkerOptions) -> Self {
        let timers = TimerSet::new().with_jitter(options.jitter);
        Self {
            command,
            options,
            reader: None,
            line: Mutex::new(String::new()),
            pid: None,
            kill_tx: None,
            waiter: None,
            status: None,
            usage: Arc::new(Mutex::new(ResourceUsage::default())),
            timers,
            started: None,
            interrupted: false,
            eof: false,
            finished: false,
        }
    }

    pub fn command(&self) -> &FoamCommand {
        &self.command
    }

    /// Spawn the process and start the timers
    pub async fn start(&mut self) -> ProcessResult<()> {
        if self.started.is_some() {
            return Err(ProcessError::AlreadyStarted);
        }

        let mut child = self.command.spawn()?;
        self.started = Some(Instant::now());
        let pid = child.id();
        self.pid = pid;
        info!("Started {} with pid {:?}", self.command.program(), pid);

        let stdout = child.stdout.take().ok_or(ProcessError::NoOutput)?;
        self.reader = Some(LineReader::new(stdout, self.options.strip_spaces));

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        self.kill_tx = Some(kill_tx);
        self.waiter = Some(tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => status.map_err(ProcessError::Wait),
                _ = kill_rx => {
                    if let Err(e) = child.start_kill() {
                        warn!("Could not kill child: {}", e);
                    }
                    child.wait().await.map_err(ProcessError::Wait)
                }
            }
        }));

        if let Some((case_dir, requests)) = self.options.stop_files.clone() {
            self.timers.add_task(StopFilePoller::new(
                case_dir,
                requests,
                self.options.stop_file_interval,
            ));
        }
        if let (true, Some(pid)) = (self.options.sample_resources, pid) {
            self.timers.add_task(MemorySampler::new(
                pid,
                Arc::clone(&self.usage),
                self.options.memory_interval,
            ));
        }
        if !self.timers.is_empty() {
            self.timers
                .start()
                .await
                .map_err(|e| ProcessError::Task(e.to_string()))?;
        }

        Ok(())
    }

    /// Wait for the next line, `false` once the output is exhausted
    ///
    /// Reading goes on after an interrupt so buffered output is not lost.
    /// Cancel safe, so it can race other events in a `select!`.
    pub async fn read(&mut self) -> ProcessResult<bool> {
        if self.eof {
            self.finish().await?;
            return Ok(false);
        }

        let reader = self.reader.as_mut().ok_or(ProcessError::NotStarted)?;
        match reader.next_line().await? {
            Some(line) => {
                if let Ok(mut current) = self.line.lock() {
                    *current = line;
                }
                Ok(true)
            }
            None => {
                self.eof = true;
                self.finish().await?;
                Ok(false)
            }
        }
    }

    /// The line read last
    pub fn get_line(&self) -> String {
        self.line.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Whether more output is expected and nobody asked to stop
    pub fn check(&self) -> bool {
        self.started.is_some() && !self.eof && !self.interrupted
    }

    /// Kill the child if it is still running
    pub fn interrupt(&mut self) {
        if self.interrupted {
            return;
        }
        self.interrupted = true;
        if let Some(tx) = self.kill_tx.take() {
            warn!("Killing {} (pid {:?})", self.command.program(), self.pid);
            let _ = tx.send(());
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    async fn finish(&mut self) -> ProcessResult<()> {
        if self.finished {
            return Ok(());
        }
        self.reader = None;

        if let Some(waiter) = self.waiter.as_mut() {
            let joined = waiter.await;
            self.waiter = None;
            let status = joined??;
            debug!("{} exited with {}", self.command.program(), status);
            self.status = Some(status);
        }
        self.kill_tx = None;
        self.timers.stop().await;

        if let (Ok(mut usage), Some(started)) = (self.usage.lock(), self.started) {
            usage.wall_time = started.elapsed().as_secs_f64();
        }
        self.finished = true;
        Ok(())
    }

    /// Exit code; killed processes report the negative signal number
    pub fn return_code(&self) -> Option<i32> {
        use std::os::unix::process::ExitStatusExt;

        let status = self.status?;
        status.code().or_else(|| status.signal().map(|s| -s))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Resource usage so far, final once the output is exhausted
    pub fn usage(&self) -> ResourceUsage {
        let mut usage = self.usage.lock().map(|u| *u).unwrap_or_default();
        if !self.finished {
            if let Some(started) = self.started {
                usage.wall_time = started.elapsed().as_secs_f64();
            }
        }
        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> FoamWorker {
        let command = FoamCommand::new("sh").arg("-c").arg(script);
        let options = WorkerOptions {
            sample_resources: false,
            ..WorkerOptions::default()
        };
        FoamWorker::new(command, options)
    }

    #[tokio::test]
    async fn test_reads_lines_in_order() {
        let mut worker = sh("echo 'Time = 1'; echo oops >&2; echo End; exit 3");
        assert!(!worker.check());
        worker.start().await.unwrap();
        assert!(worker.check());

        let mut lines = Vec::new();
        while worker.read().await.unwrap() {
            lines.push(worker.get_line());
        }

        assert_eq!(lines, vec!["Time = 1", "oops", "End"]);
        assert!(!worker.check());
        assert_eq!(worker.return_code(), Some(3));
        assert!(worker.usage().wall_time > 0.0);
    }

    #[tokio::test]
    async fn test_strip_spaces() {
        let mut worker = sh("echo '   padded   '");
        worker.options.strip_spaces = true;
        worker.start().await.unwrap();
        assert!(worker.read().await.unwrap());
        assert_eq!(worker.get_line(), "padded");
        assert!(!worker.read().await.unwrap());
    }

    #[tokio::test]
    async fn test_interrupt_kills_child() {
        let mut worker = sh("echo started; exec sleep 30");
        worker.start().await.unwrap();
        assert!(worker.read().await.unwrap());

        worker.interrupt();
        assert!(!worker.check());
        assert!(worker.is_interrupted());

        let drain = tokio::time::timeout(Duration::from_secs(10), async {
            while worker.read().await.unwrap() {}
        });
        drain.await.unwrap();
        assert_eq!(worker.return_code(), Some(-9));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let mut worker = FoamWorker::new(FoamCommand::new("no-such-solver-xyz"), WorkerOptions::default());
        assert!(matches!(worker.start().await, Err(ProcessError::Spawn { .. })));
        assert!(!worker.check());
    }

    #[tokio::test]
    async fn test_read_before_start() {
        let mut worker = sh("true");
        assert!(matches!(worker.read().await, Err(ProcessError::NotStarted)));
    }
}
