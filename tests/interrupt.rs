//! Ctrl-C goes to the whole test process, so this runs in its own binary

use std::fs;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use foamrun::process::WorkerOptions;
use foamrun::runner::{Collect, RunState, RunnerBuilder};

#[tokio::test]
async fn test_keyboard_interrupt() {
    let case = TempDir::new().unwrap();
    fs::create_dir(case.path().join("system")).unwrap();
    fs::write(case.path().join("system/controlDict"), "stopAt endTime;\n").unwrap();

    // the pause lets the supervisor wait on the signal before it arrives
    let script = "echo 'Time = 1'; sleep 0.5; kill -INT $PPID; echo 'Time = 2'; exec sleep 5";
    let collect = Collect::new();
    let mut runner = RunnerBuilder::new(["sh", "-c", script])
        .case_dir(case.path())
        .silent(true)
        .restart(true)
        .sink(collect.clone())
        .worker_options(WorkerOptions {
            sample_resources: false,
            ..WorkerOptions::default()
        })
        .build()
        .unwrap();
    let fired = std::sync::Arc::new(std::sync::Mutex::new(false));
    let seen = fired.clone();
    runner.add_end_trigger(move |_| *seen.lock().unwrap() = true);

    let begin = Instant::now();
    let data = runner.start().await.unwrap();
    assert!(begin.elapsed() < Duration::from_secs(4));

    assert!(data.interrupted);
    assert!(data.keyboard_interrupt);
    assert!(data.ok);
    assert_eq!(runner.state(), RunState::Interrupted);
    assert_eq!(
        fs::read_to_string(case.path().join("PyFoamState.TheState")).unwrap(),
        "Interrupted\n"
    );
    assert!(*fired.lock().unwrap());

    // whatever arrived before the kill went through the usual checks
    let lines = collect.lines();
    assert_eq!(lines[0], "Time = 1");
    assert_eq!(data.lines, lines.len());
    assert_eq!(data.step_nr, lines.len());
    let log = fs::read_to_string(runner.log_file()).unwrap();
    assert_eq!(log.lines().count(), lines.len());

    assert_eq!(
        fs::read_to_string(case.path().join("system/controlDict")).unwrap(),
        "stopAt endTime;\n"
    );
}
