//! Error types for the runner crate.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while preparing or inspecting.
///
/// A test run that times out or crashes is not an error here: it yields an
/// [`ExecutionReport`](qa_core::ExecutionReport) with outcome `error`.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("Page inspection failed: {0}")]
    Inspection(String),

    #[error("Page inspection timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
