//! Wire types shared by the session core and the transport adapter.
//!
//! Field casing on outbound payloads (`exitCode`, `executionTime`) is part of
//! the client contract and must not change.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Identifies one client connection for the lifetime of that connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inbound client operation, one per transport message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientOp {
    Execute {
        code: String,
        /// Seconds; validated against the configured 1-60 range.
        #[serde(default)]
        timeout: Option<u64>,
    },
    UserInput {
        value: String,
    },
    Cancel,
}

/// Outbound session event, one per transport message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEventMsg {
    Output {
        data: String,
    },
    Error {
        message: String,
    },
    InputRequest {
        prompt: String,
    },
    ExecutionComplete {
        #[serde(rename = "exitCode")]
        exit_code: i32,
        success: bool,
        #[serde(rename = "executionTime")]
        execution_time_ms: u64,
    },
}

impl SessionEventMsg {
    pub fn output(data: impl Into<String>) -> Self {
        Self::Output { data: data.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn input_request(prompt: impl Into<String>) -> Self {
        Self::InputRequest {
            prompt: prompt.into(),
        }
    }

    pub fn complete(exit_code: i32, execution_time_ms: u64) -> Self {
        Self::ExecutionComplete {
            exit_code,
            success: exit_code == 0,
            execution_time_ms,
        }
    }
}

/// Request body of the non-interactive fallback endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneShotRequest {
    pub code: String,
    /// Seconds; the fallback defaults to 10 when omitted.
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Response body of the non-interactive fallback endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneShotResponse {
    pub success: bool,
    pub output: String,
    pub error: String,
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
}
