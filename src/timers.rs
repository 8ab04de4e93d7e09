//! Periodic background tasks that run beside a supervised process
//!
//! A [`TimerSet`] owns its tasks and stops them together. Two tasks exist:
//! [`StopFilePoller`] turns sentinel files in the case directory into run
//! control requests, [`MemorySampler`] follows the resource usage of the
//! child.

use log::{debug, error, info, trace};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{FoamError, Result};
use crate::process::resources::{self, ResourceUsage};

/// Shortest tick period, a zero interval from the configuration ends up here
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A task run at a fixed interval
#[async_trait::async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    /// Called once before the first tick
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Do one round of work
    async fn tick(&self) -> Result<()>;

    /// Get the tick interval
    fn interval(&self) -> Duration;

    /// Get the task name
    fn name(&self) -> &str;

    /// Called once after the last tick
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Requests that can be made to a running solver
///
/// Implemented by the run control of a supervisor; the stop-file poller
/// forwards the sentinel files it finds to it.
pub trait RunRequests: Send + Sync + 'static {
    fn stop_gracefully(&self) -> Result<()>;
    fn stop_at_next_write(&self) -> Result<()>;
    fn stop_without_write(&self) -> Result<()>;
    fn write_results(&self) -> Result<()>;
}

/// A set of periodic tasks started and stopped together
pub struct TimerSet {
    tasks: Vec<Arc<dyn PeriodicTask>>,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    jitter: Duration,
    handles: Vec<JoinHandle<()>>,
}

impl TimerSet {
    /// Create an empty timer set
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            jitter: Duration::ZERO,
            handles: Vec::new(),
        }
    }

    /// Delay every tick by a random amount up to `jitter`
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Add a task
    pub fn add_task<T: PeriodicTask>(&mut self, task: T) -> &mut Self {
        self.tasks.push(Arc::new(task));
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start all tasks
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(FoamError::Other("Timers already running".to_string()));
        }
        self.running.store(true, Ordering::SeqCst);

        for task in &self.tasks {
            task.initialize().await?;

            let task = Arc::clone(task);
            let running = Arc::clone(&self.running);
            let wake = Arc::clone(&self.wake);
            let jitter_ms = self.jitter.as_millis() as u64;

            self.handles.push(tokio::spawn(async move {
                let mut interval_timer = tokio::time::interval(task.interval().max(MIN_PERIOD));
                interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                debug!("Starting timer: {}", task.name());

                while running.load(Ordering::SeqCst) {
                    tokio::select! {
                        _ = interval_timer.tick() => {}
                        _ = wake.notified() => continue,
                    }
                    if jitter_ms > 0 {
                        let delay = rand::random_range(0..=jitter_ms);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }

                    if let Err(e) = task.tick().await {
                        error!("Error in timer {}: {}", task.name(), e);
                    }
                }

                if let Err(e) = task.shutdown().await {
                    error!("Error shutting down timer {}: {}", task.name(), e);
                }
                trace!("Timer {} stopped", task.name());
            }));
        }

        Ok(())
    }

    /// Stop all tasks and wait for them to finish
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_waiters();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Timer task failed: {}", e);
            }
        }
    }
}

impl Default for TimerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_waiters();
    }
}

/// Sentinel file names and what they request
pub const STOP_FILE: &str = "stop";
pub const WRITE_FILE: &str = "write";
pub const STOP_WRITE_FILE: &str = "stopWrite";
pub const KILL_FILE: &str = "kill";

/// Watches the case directory for sentinel files
///
/// A file is removed as soon as it is seen. `stop` ends the check for that
/// tick, the others are all looked at.
pub struct StopFilePoller {
    case_dir: PathBuf,
    requests: Arc<dyn RunRequests>,
    interval: Duration,
}

impl StopFilePoller {
    pub fn new(case_dir: impl Into<PathBuf>, requests: Arc<dyn RunRequests>, interval: Duration) -> Self {
        Self {
            case_dir: case_dir.into(),
            requests,
            interval,
        }
    }

    /// Remove the file if it exists, returns whether it was there
    fn take(&self, name: &str) -> bool {
        let path = self.case_dir.join(name);
        if !path.exists() {
            return false;
        }
        info!("Found sentinel file {}", path.display());
        if let Err(e) = std::fs::remove_file(&path) {
            error!("Could not remove {}: {}", path.display(), e);
        }
        true
    }

    /// Check all sentinel files once
    pub fn check(&self) -> Result<()> {
        if self.take(STOP_FILE) {
            return self.requests.stop_gracefully();
        }
        if self.take(WRITE_FILE) {
            self.requests.write_results()?;
        }
        if self.take(STOP_WRITE_FILE) {
            self.requests.stop_at_next_write()?;
        }
        if self.take(KILL_FILE) {
            self.requests.stop_without_write()?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PeriodicTask for StopFilePoller {
    async fn tick(&self) -> Result<()> {
        self.check()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &str {
        "stop-file-poller"
    }
}

/// Samples the memory and CPU usage of the child process tree
pub struct MemorySampler {
    pid: u32,
    usage: Arc<Mutex<ResourceUsage>>,
    interval: Duration,
}

impl MemorySampler {
    pub fn new(pid: u32, usage: Arc<Mutex<ResourceUsage>>, interval: Duration) -> Self {
        Self { pid, usage, interval }
    }

    /// Take one sample, returns `false` when the process is gone
    pub fn sample(&self) -> bool {
        match resources::sample(self.pid) {
            Some(sample) => {
                if let Ok(mut usage) = self.usage.lock() {
                    usage.update(&sample);
                }
                true
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl PeriodicTask for MemorySampler {
    async fn initialize(&self) -> Result<()> {
        self.sample();
        Ok(())
    }

    async fn tick(&self) -> Result<()> {
        if !self.sample() {
            trace!("Process {} no longer sampled", self.pid);
        }
        Ok(())
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &str {
        "memory-sampler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorded {
        calls: Mutex<Vec<&'static str>>,
    }

    impl RunRequests for Recorded {
        fn stop_gracefully(&self) -> Result<()> {
            self.calls.lock().unwrap().push("stop");
            Ok(())
        }
        fn stop_at_next_write(&self) -> Result<()> {
            self.calls.lock().unwrap().push("stopWrite");
            Ok(())
        }
        fn stop_without_write(&self) -> Result<()> {
            self.calls.lock().unwrap().push("kill");
            Ok(())
        }
        fn write_results(&self) -> Result<()> {
            self.calls.lock().unwrap().push("write");
            Ok(())
        }
    }

    #[test]
    fn test_sentinel_files_are_consumed() {
        let dir = TempDir::new().unwrap();
        let requests = Arc::new(Recorded::default());
        let poller = StopFilePoller::new(dir.path(), requests.clone(), Duration::from_millis(10));

        std::fs::write(dir.path().join("write"), "").unwrap();
        std::fs::write(dir.path().join("kill"), "").unwrap();
        poller.check().unwrap();
        assert_eq!(*requests.calls.lock().unwrap(), vec!["write", "kill"]);
        assert!(!dir.path().join("write").exists());
        assert!(!dir.path().join("kill").exists());

        // stop short-circuits the remaining files for this round
        std::fs::write(dir.path().join("stop"), "").unwrap();
        std::fs::write(dir.path().join("stopWrite"), "").unwrap();
        poller.check().unwrap();
        assert_eq!(requests.calls.lock().unwrap().last(), Some(&"stop"));
        assert!(dir.path().join("stopWrite").exists());
        poller.check().unwrap();
        assert_eq!(requests.calls.lock().unwrap().last(), Some(&"stopWrite"));
    }

    struct Counter {
        ticks: Arc<AtomicUsize>,
        shutdowns: Arc<AtomicUsize>,
        interval: Duration,
    }

    #[async_trait::async_trait]
    impl PeriodicTask for Counter {
        async fn tick(&self) -> Result<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn interval(&self) -> Duration {
            self.interval
        }

        fn name(&self) -> &str {
            "counter"
        }

        async fn shutdown(&self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_timer_set_runs_and_stops() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let mut timers = TimerSet::new().with_jitter(Duration::from_millis(1));
        timers.add_task(Counter {
            ticks: Arc::clone(&ticks),
            shutdowns: Arc::clone(&shutdowns),
            interval: Duration::from_millis(5),
        });

        timers.start().await.unwrap();
        assert!(timers.start().await.is_err());
        tokio::time::sleep(Duration::from_millis(60)).await;
        timers.stop().await;

        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 2, "only {} ticks", seen);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_zero_interval_still_ticks() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let mut timers = TimerSet::new();
        timers.add_task(Counter {
            ticks: Arc::clone(&ticks),
            shutdowns: Arc::clone(&shutdowns),
            interval: Duration::ZERO,
        });

        timers.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        timers.stop().await;

        assert!(ticks.load(Ordering::SeqCst) >= 2);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }
}
