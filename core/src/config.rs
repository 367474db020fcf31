use std::path::PathBuf;
use std::time::Duration;

use crate::error::ExecError;

pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// The one-shot endpoint historically defaulted lower than the session path.
pub const ONE_SHOT_DEFAULT_TIMEOUT_SECS: u64 = 10;

const DEFAULT_MARKER_BUDGET_BYTES: usize = 64 * 1024;

/// Settings shared by every session and one-shot run.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Interpreter binary invoked as `<interpreter> -u <artifact>`.
    pub interpreter: PathBuf,
    /// Directory receiving the per-run instrumented source artifacts.
    pub scratch_dir: PathBuf,
    /// Applied when an execute request carries no timeout.
    pub default_timeout: Duration,
    /// Bytes of unterminated marker the scanner buffers before giving up and
    /// forwarding them verbatim.
    pub marker_budget_bytes: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            scratch_dir: std::env::temp_dir(),
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            marker_budget_bytes: DEFAULT_MARKER_BUDGET_BYTES,
        }
    }
}

impl ExecConfig {
    /// Validates a requested timeout in seconds against the 1-60 range,
    /// falling back to the configured default when absent.
    pub fn resolve_timeout(&self, requested: Option<u64>) -> Result<Duration, ExecError> {
        match requested {
            None => Ok(self.default_timeout),
            Some(secs) if (MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&secs) => {
                Ok(Duration::from_secs(secs))
            }
            Some(secs) => Err(ExecError::TimeoutOutOfRange { requested: secs }),
        }
    }
}
