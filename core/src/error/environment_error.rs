// core/src/error/environment_error.rs
use thiserror::Error;

use super::ProcessError;

/// Failures while querying the interpreter about formats, versions or
/// bundled resources.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("query exited with code {code}: {stderr}")]
    QueryFailed { code: i32, stderr: String },

    #[error("query timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("unexpected query output")]
    Decode(#[source] serde_json::Error),
}
