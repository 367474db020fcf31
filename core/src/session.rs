use std::pin::Pin;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Sleep;

use runcell_protocol::ClientOp;
use runcell_protocol::ConnectionId;
use runcell_protocol::SessionEventMsg;

use crate::config::ExecConfig;
use crate::error::ExecError;
use crate::instrument::CodeArtifact;
use crate::marker::MarkerScanner;
use crate::marker::ScanItem;
use crate::runner::ProcessRunner;
use crate::runner::RunnerEvent;

const OPS_CHANNEL_CAPACITY: usize = 32;

const TIMEOUT_MESSAGE: &str = "Timeout: code took too long to execute";

/// Lifecycle of one session. Terminal states converge back to `Idle` before
/// the session accepts another execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    AwaitingInput,
    Completed,
    Cancelled,
    Failed,
}

/// Client-side handle to one session task.
///
/// Dropping the handle (the disconnect path) closes the op channel, which
/// makes the task terminate its process, delete its artifact, and exit.
#[derive(Debug)]
pub struct SessionHandle {
    id: ConnectionId,
    pub(crate) ops_tx: mpsc::Sender<ClientOp>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Starts a dedicated session task. Outbound events are delivered on
    /// `events_tx` in the order the subprocess produced them.
    pub fn spawn(
        id: ConnectionId,
        config: ExecConfig,
        events_tx: mpsc::Sender<SessionEventMsg>,
    ) -> Self {
        let (ops_tx, ops_rx) = mpsc::channel(OPS_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let task = SessionTask {
            id,
            config,
            events_tx,
            state_tx,
            run: None,
        };
        tokio::spawn(task.run(ops_rx));
        Self {
            id,
            ops_tx,
            state_rx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Delivers one client operation; `false` once the session task is gone.
    pub async fn send(&self, op: ClientOp) -> bool {
        self.ops_tx.send(op).await.is_ok()
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn state_stream(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }
}

/// Everything tied to the lifetime of one run. Dropping it disarms the
/// deadline; the runner's background tasks detach and finish on their own
/// once the process exits.
struct ActiveRun {
    runner: ProcessRunner,
    events: mpsc::Receiver<RunnerEvent>,
    scanner: MarkerScanner,
    artifact: Option<CodeArtifact>,
    started_at: Instant,
    deadline: Pin<Box<Sleep>>,
    timed_out: bool,
}

enum Step {
    Op(Option<ClientOp>),
    Runner(Option<RunnerEvent>),
    Deadline,
}

struct SessionTask {
    id: ConnectionId,
    config: ExecConfig,
    events_tx: mpsc::Sender<SessionEventMsg>,
    state_tx: watch::Sender<SessionState>,
    run: Option<ActiveRun>,
}

impl SessionTask {
    async fn run(mut self, mut ops_rx: mpsc::Receiver<ClientOp>) {
        loop {
            let step = match self.run.as_mut() {
                None => Step::Op(ops_rx.recv().await),
                Some(run) => {
                    tokio::select! {
                        op = ops_rx.recv() => Step::Op(op),
                        event = run.events.recv() => Step::Runner(event),
                        _ = run.deadline.as_mut(), if !run.timed_out => Step::Deadline,
                    }
                }
            };
            match step {
                Step::Op(None) => {
                    // Transport gone. The client cannot receive events any
                    // more, but cleanup is unconditional.
                    self.abort_run().await;
                    break;
                }
                Step::Op(Some(op)) => self.handle_op(op).await,
                Step::Runner(Some(event)) => self.handle_runner_event(event).await,
                Step::Runner(None) => {
                    // Event channel closed without an exit notification;
                    // recover as an abnormal exit.
                    self.finish_run(-1).await;
                }
                Step::Deadline => self.handle_timeout().await,
            }
        }
        tracing::debug!(id = %self.id, "session task finished");
    }

    async fn handle_op(&mut self, op: ClientOp) {
        match op {
            ClientOp::Execute { code, timeout } => {
                // A new execute while busy force-stops the previous run
                // first; a session never holds two concurrent runs.
                self.abort_run().await;
                self.start_run(code, timeout).await;
            }
            ClientOp::UserInput { value } => self.relay_input(value).await,
            ClientOp::Cancel => self.abort_run().await,
        }
    }

    async fn start_run(&mut self, code: String, timeout: Option<u64>) {
        if code.trim().is_empty() {
            self.emit(SessionEventMsg::error(ExecError::EmptyCode.to_string()))
                .await;
            return;
        }
        let timeout = match self.config.resolve_timeout(timeout) {
            Ok(timeout) => timeout,
            Err(err) => {
                self.emit(SessionEventMsg::error(err.to_string())).await;
                return;
            }
        };

        let artifact = match CodeArtifact::write(&self.config.scratch_dir, &code).await {
            Ok(artifact) => artifact,
            Err(err) => {
                self.fail_spawn(err, None).await;
                return;
            }
        };

        match ProcessRunner::spawn(&self.config.interpreter, artifact.path()) {
            Ok((runner, events)) => {
                self.set_state(SessionState::Running);
                self.run = Some(ActiveRun {
                    runner,
                    events,
                    scanner: MarkerScanner::new(self.config.marker_budget_bytes),
                    artifact: Some(artifact),
                    started_at: Instant::now(),
                    deadline: Box::pin(tokio::time::sleep(timeout)),
                    timed_out: false,
                });
            }
            Err(err) => self.fail_spawn(err, Some(artifact)).await,
        }
    }

    async fn fail_spawn(&mut self, err: ExecError, artifact: Option<CodeArtifact>) {
        if let Some(artifact) = artifact {
            artifact.remove().await;
        }
        self.emit(SessionEventMsg::error(err.to_string())).await;
        self.set_state(SessionState::Failed);
        self.set_state(SessionState::Idle);
    }

    async fn relay_input(&mut self, value: String) {
        // Writes go through whenever a process is alive, not only while a
        // prompt is pending; only the prompt state itself is cleared.
        let write_result = match self.run.as_ref() {
            None => return,
            Some(run) => {
                let mut bytes = value.clone().into_bytes();
                bytes.push(b'\n');
                run.runner.write_stdin(bytes).await
            }
        };
        match write_result {
            Ok(()) => {
                // Echo the submitted value so the client transcript shows it.
                self.emit(SessionEventMsg::output(format!("{value}\n")))
                    .await;
                if self.state() == SessionState::AwaitingInput {
                    self.set_state(SessionState::Running);
                }
            }
            Err(err) => self.emit(SessionEventMsg::error(err.to_string())).await,
        }
    }

    async fn handle_runner_event(&mut self, event: RunnerEvent) {
        match event {
            RunnerEvent::Stdout(chunk) => {
                let items = match self.run.as_mut() {
                    Some(run) => run.scanner.feed(&chunk),
                    None => return,
                };
                self.emit_scan_items(items).await;
            }
            RunnerEvent::Stderr(chunk) => {
                // Stderr is never marker-scanned; it goes out verbatim.
                self.emit(SessionEventMsg::error(String::from_utf8_lossy(&chunk)))
                    .await;
            }
            RunnerEvent::Exited(exit_code) => self.finish_run(exit_code).await,
        }
    }

    async fn emit_scan_items(&mut self, items: Vec<ScanItem>) {
        for item in items {
            match item {
                ScanItem::Output(bytes) => {
                    self.emit(SessionEventMsg::output(String::from_utf8_lossy(&bytes)))
                        .await;
                }
                ScanItem::InputRequest(prompt) => {
                    self.emit(SessionEventMsg::input_request(prompt)).await;
                    self.set_state(SessionState::AwaitingInput);
                }
            }
        }
    }

    async fn handle_timeout(&mut self) {
        // A hung prompt counts against the deadline too: this fires from
        // `AwaitingInput` exactly as it does from `Running`.
        if let Some(run) = self.run.as_mut() {
            run.timed_out = true;
            run.runner.terminate();
        }
        self.emit(SessionEventMsg::error(TIMEOUT_MESSAGE)).await;
        // The completion event follows once the process's exit is reported.
    }

    async fn finish_run(&mut self, exit_code: i32) {
        let Some(mut run) = self.run.take() else {
            return;
        };
        if let Some(rest) = run.scanner.finish() {
            self.emit(SessionEventMsg::output(String::from_utf8_lossy(&rest)))
                .await;
        }
        if let Some(artifact) = run.artifact.take() {
            artifact.remove().await;
        }
        let execution_time_ms = run.started_at.elapsed().as_millis() as u64;
        let success = !run.timed_out && exit_code == 0;
        self.set_state(if run.timed_out {
            SessionState::Failed
        } else {
            SessionState::Completed
        });
        self.emit(SessionEventMsg::ExecutionComplete {
            exit_code,
            success,
            execution_time_ms,
        })
        .await;
        self.set_state(SessionState::Idle);
    }

    /// Stops the current run without reporting a completion: terminate the
    /// process, disarm the deadline, delete the artifact.
    async fn abort_run(&mut self) {
        let Some(mut run) = self.run.take() else {
            return;
        };
        run.runner.terminate();
        if let Some(artifact) = run.artifact.take() {
            artifact.remove().await;
        }
        self.set_state(SessionState::Cancelled);
        self.set_state(SessionState::Idle);
    }

    async fn emit(&self, event: SessionEventMsg) {
        if self.events_tx.send(event).await.is_err() {
            tracing::debug!(id = %self.id, "dropping event for closed transport");
        }
    }

    fn set_state(&self, state: SessionState) {
        let _ = self.state_tx.send(state);
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }
}
