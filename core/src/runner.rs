use std::path::Path;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::ExecError;

const READ_CHUNK_SIZE: usize = 8192;
const EVENT_CHANNEL_CAPACITY: usize = 256;
const STDIN_CHANNEL_CAPACITY: usize = 128;

// Conventional shell encoding for signal deaths: 128 + signal.
#[cfg(unix)]
const EXIT_CODE_SIGNAL_BASE: i32 = 128;

/// What one subprocess produced, in per-stream emission order. `Exited` is
/// always the final event on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Exited(i32),
}

/// Owns one interpreter subprocess: write-to-stdin, terminate, and a single
/// exit notification delivered through the event channel.
///
/// Nothing here blocks the caller while the subprocess lives; the only
/// suspension points are the explicit channel sends and receives.
#[derive(Debug)]
pub struct ProcessRunner {
    pid: Option<u32>,
    stdin_tx: mpsc::Sender<Vec<u8>>,
    terminated: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
}

impl ProcessRunner {
    /// Spawns `<program> -u <artifact>` with stdin, stdout, and stderr each
    /// captured as independent byte streams.
    pub fn spawn(
        program: &Path,
        artifact: &Path,
    ) -> Result<(Self, mpsc::Receiver<RunnerEvent>), ExecError> {
        let mut child = Command::new(program)
            .arg("-u")
            .arg(artifact)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::spawn(program.display().to_string(), source))?;

        let pid = child.id();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<Vec<u8>>(STDIN_CHANNEL_CAPACITY);

        let missing = |stream: &str| {
            ExecError::spawn(
                program.display().to_string(),
                std::io::Error::other(format!("{stream} pipe was unexpectedly not available")),
            )
        };
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;
        let mut stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;

        let stdout_task = tokio::spawn(read_stream(stdout, event_tx.clone(), false));
        let stderr_task = tokio::spawn(read_stream(stderr, event_tx.clone(), true));

        // The writer task owns the stdin handle; it closes (sending EOF) once
        // the runner is dropped and the channel drains.
        tokio::spawn(async move {
            while let Some(bytes) = stdin_rx.recv().await {
                if stdin.write_all(&bytes).await.is_err() || stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        let exited = Arc::new(AtomicBool::new(false));
        let exited_flag = Arc::clone(&exited);
        tokio::spawn(async move {
            let status = child.wait().await;
            // Drain both readers first so `Exited` is the last event observed.
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            exited_flag.store(true, Ordering::SeqCst);
            let code = status.map(exit_code_from_status).unwrap_or(-1);
            let _ = event_tx.send(RunnerEvent::Exited(code)).await;
        });

        Ok((
            Self {
                pid,
                stdin_tx,
                terminated: Arc::new(AtomicBool::new(false)),
                exited,
            },
            event_rx,
        ))
    }

    /// OS process id, present until the process has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Queues bytes for the subprocess's stdin.
    pub async fn write_stdin(&self, bytes: Vec<u8>) -> Result<(), ExecError> {
        self.stdin_tx
            .send(bytes)
            .await
            .map_err(|_| ExecError::WriteToStdin)
    }

    /// Sends exactly one SIGTERM. Idempotent: repeat calls and calls after
    /// exit are no-ops. There is no escalation to a stronger signal; the
    /// runner waits for whatever exit the OS eventually reports.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) || self.has_exited() {
            return;
        }
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
        // Non-unix builds have no SIGTERM to deliver; `kill_on_drop` still
        // reclaims the process when the runner goes away.
    }
}

async fn read_stream<R>(mut reader: R, tx: mpsc::Sender<RunnerEvent>, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = buf[..n].to_vec();
                let event = if is_stderr {
                    RunnerEvent::Stderr(chunk)
                } else {
                    RunnerEvent::Stdout(chunk)
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(unix)]
pub(crate) fn exit_code_from_status(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| EXIT_CODE_SIGNAL_BASE + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
pub(crate) fn exit_code_from_status(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
