//! Interactive execution session core.
//!
//! One interpreter subprocess per run, its stdio relayed as typed events,
//! pending `input()` prompts detected through out-of-band markers, timeouts
//! enforced per run, and cleanup (process termination, artifact removal)
//! guaranteed on every exit path: completion, timeout, cancel, disconnect.

mod config;
mod error;
mod instrument;
mod marker;
mod one_shot;
mod registry;
mod runner;
mod session;

pub use config::DEFAULT_TIMEOUT_SECS;
pub use config::ExecConfig;
pub use config::MAX_TIMEOUT_SECS;
pub use config::MIN_TIMEOUT_SECS;
pub use config::ONE_SHOT_DEFAULT_TIMEOUT_SECS;
pub use error::ExecError;
pub use instrument::CodeArtifact;
pub use marker::INPUT_REQUEST_DELIMITER;
pub use marker::MarkerScanner;
pub use marker::ScanItem;
pub use one_shot::run_one_shot;
pub use registry::SessionRegistry;
pub use runner::ProcessRunner;
pub use runner::RunnerEvent;
pub use session::SessionHandle;
pub use session::SessionState;
