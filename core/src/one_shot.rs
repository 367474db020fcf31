use std::process::Stdio;
use std::time::Duration;
use std::time::Instant;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use runcell_protocol::OneShotResponse;

use crate::config::ExecConfig;
use crate::config::MAX_TIMEOUT_SECS;
use crate::config::MIN_TIMEOUT_SECS;
use crate::config::ONE_SHOT_DEFAULT_TIMEOUT_SECS;
use crate::error::ExecError;
use crate::runner::exit_code_from_status;

const TIMEOUT_MESSAGE: &str = "Timeout: code took too long to execute";

/// Non-interactive fallback: run the code once with no input channel and
/// return the aggregated result. Used when a duplex transport is unavailable.
///
/// The code is passed to the interpreter directly (`-c`); there is nothing to
/// instrument because no input can ever be relayed.
pub async fn run_one_shot(
    config: &ExecConfig,
    code: &str,
    timeout_secs: Option<u64>,
) -> Result<OneShotResponse, ExecError> {
    if code.trim().is_empty() {
        return Err(ExecError::EmptyCode);
    }
    let timeout = match timeout_secs {
        None => Duration::from_secs(ONE_SHOT_DEFAULT_TIMEOUT_SECS),
        Some(secs) if (MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&secs) => {
            Duration::from_secs(secs)
        }
        Some(secs) => return Err(ExecError::TimeoutOutOfRange { requested: secs }),
    };

    let start = Instant::now();
    let mut child = Command::new(&config.interpreter)
        .arg("-c")
        .arg(code)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecError::spawn(config.interpreter.display().to_string(), source))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_task = tokio::spawn(read_to_end(stdout));
    let stderr_task = tokio::spawn(read_to_end(stderr));

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => (exit_code_from_status(status), false),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "failed to await one-shot interpreter");
            (-1, false)
        }
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            (-1, true)
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    let success = !timed_out && exit_code == 0;
    let error = if timed_out {
        TIMEOUT_MESSAGE.to_string()
    } else if success {
        String::new()
    } else {
        String::from_utf8_lossy(&stderr).into_owned()
    };

    Ok(OneShotResponse {
        success,
        output: String::from_utf8_lossy(&stdout).into_owned(),
        error,
        execution_time_ms: start.elapsed().as_millis() as u64,
    })
}

async fn read_to_end<R>(reader: Option<R>) -> Vec<u8>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buf).await;
    }
    buf
}
