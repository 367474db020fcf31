mod common;

use pretty_assertions::assert_eq;

use runcell_core::ProcessRunner;
use runcell_core::RunnerEvent;

use common::python_bin;

fn write_program(dir: &tempfile::TempDir, source: &str) -> std::path::PathBuf {
    let path = dir.path().join("program.py");
    std::fs::write(&path, source).expect("write program");
    path
}

async fn drain(mut events: tokio::sync::mpsc::Receiver<RunnerEvent>) -> Vec<RunnerEvent> {
    let mut collected = Vec::new();
    while let Some(event) = tokio::time::timeout(std::time::Duration::from_secs(10), events.recv())
        .await
        .expect("timed out draining runner events")
    {
        let done = matches!(event, RunnerEvent::Exited(_));
        collected.push(event);
        if done {
            break;
        }
    }
    collected
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn streams_are_captured_independently_and_exit_is_last() {
    let Some(python) = python_bin() else {
        eprintln!("skipping: no python interpreter on PATH");
        return;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let program = write_program(&dir, "import sys\nprint('out')\nsys.stderr.write('err\\n')\n");

    let (runner, events) = ProcessRunner::spawn(&python, &program).expect("spawn");
    let events = drain(events).await;

    let stdout: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            RunnerEvent::Stdout(chunk) => Some(chunk.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    let stderr: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            RunnerEvent::Stderr(chunk) => Some(chunk.clone()),
            _ => None,
        })
        .flatten()
        .collect();

    assert_eq!(String::from_utf8_lossy(&stdout), "out\n");
    assert_eq!(String::from_utf8_lossy(&stderr), "err\n");
    assert!(matches!(events.last(), Some(RunnerEvent::Exited(0))));
    assert!(runner.has_exited());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stdin_writes_reach_the_process() {
    let Some(python) = python_bin() else {
        eprintln!("skipping: no python interpreter on PATH");
        return;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let program = write_program(&dir, "print(input())\n");

    let (runner, events) = ProcessRunner::spawn(&python, &program).expect("spawn");
    runner
        .write_stdin(b"hello\n".to_vec())
        .await
        .expect("write stdin");

    let events = drain(events).await;
    let stdout: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            RunnerEvent::Stdout(chunk) => Some(chunk.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(String::from_utf8_lossy(&stdout), "hello\n");
    assert!(matches!(events.last(), Some(RunnerEvent::Exited(0))));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn terminate_is_idempotent() {
    let Some(python) = python_bin() else {
        eprintln!("skipping: no python interpreter on PATH");
        return;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let program = write_program(&dir, "import time\ntime.sleep(30)\n");

    let (runner, events) = ProcessRunner::spawn(&python, &program).expect("spawn");
    runner.terminate();
    runner.terminate();

    let events = drain(events).await;
    match events.last() {
        Some(RunnerEvent::Exited(code)) => assert_ne!(*code, 0),
        other => panic!("expected exit event, got {other:?}"),
    }

    // Safe on an already-exited process too.
    runner.terminate();
    assert!(runner.has_exited());
}
