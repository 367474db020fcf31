#![allow(dead_code)]

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use runcell_core::ExecConfig;
use runcell_core::SessionHandle;
use runcell_protocol::ConnectionId;
use runcell_protocol::SessionEventMsg;

const EVENT_WAIT: Duration = Duration::from_secs(10);

/// First Python interpreter found on PATH, if any. Tests that need one skip
/// themselves when this returns `None`.
pub fn python_bin() -> Option<PathBuf> {
    ["python3", "python"].iter().find_map(|candidate| {
        std::process::Command::new(candidate)
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
            .then(|| PathBuf::from(candidate))
    })
}

pub struct TestSession {
    pub scratch: tempfile::TempDir,
    pub handle: SessionHandle,
    pub events: mpsc::Receiver<SessionEventMsg>,
}

/// Spawns a session against a fresh scratch directory so artifact cleanup can
/// be asserted by counting files.
pub fn connect(interpreter: PathBuf) -> TestSession {
    let scratch = tempfile::tempdir().expect("tempdir");
    let config = ExecConfig {
        interpreter,
        scratch_dir: scratch.path().to_path_buf(),
        ..Default::default()
    };
    let (events_tx, events) = mpsc::channel(256);
    let handle = SessionHandle::spawn(ConnectionId::new(), config, events_tx);
    TestSession {
        scratch,
        handle,
        events,
    }
}

pub async fn next_event(rx: &mut mpsc::Receiver<SessionEventMsg>) -> SessionEventMsg {
    timeout(EVENT_WAIT, rx.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed")
}

/// Drains events until the run's `execution_complete`, inclusive.
pub async fn collect_until_complete(
    rx: &mut mpsc::Receiver<SessionEventMsg>,
) -> Vec<SessionEventMsg> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = matches!(event, SessionEventMsg::ExecutionComplete { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}

pub fn joined_output(events: &[SessionEventMsg]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEventMsg::Output { data } => Some(data.as_str()),
            _ => None,
        })
        .collect()
}

pub fn artifact_count(scratch: &Path) -> usize {
    std::fs::read_dir(scratch)
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[cfg(unix)]
pub fn process_alive(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Polls until `predicate` holds, failing the test after a few seconds.
pub async fn wait_until(what: &str, mut predicate: impl FnMut() -> bool) {
    for _ in 0..100 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting until {what}");
}
