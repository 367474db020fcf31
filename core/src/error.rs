use thiserror::Error;

use crate::config::MAX_TIMEOUT_SECS;
use crate::config::MIN_TIMEOUT_SECS;

/// Failures surfaced by the execution core. Validation variants are rejected
/// before any process exists; the rest map to `error` events on the wire.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("No code to execute")]
    EmptyCode,

    #[error(
        "Timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds (requested {requested})"
    )]
    TimeoutOutOfRange { requested: u64 },

    #[error("Failed to write instrumented source: {source}")]
    WriteArtifact {
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to stdin")]
    WriteToStdin,
}

impl ExecError {
    pub(crate) fn write_artifact(source: std::io::Error) -> Self {
        Self::WriteArtifact { source }
    }

    pub(crate) fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// True for errors rejected before a process or artifact exists.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyCode | Self::TimeoutOutOfRange { .. })
    }
}
