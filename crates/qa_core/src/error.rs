//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A phase operation was invoked before its inputs exist.
    #[error("{message}")]
    Precondition {
        operation: &'static str,
        message: &'static str,
    },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn no_page_model(operation: &'static str) -> Self {
        Self::Precondition {
            operation,
            message: "Please explore a URL first",
        }
    }

    pub fn no_test_cases(operation: &'static str) -> Self {
        Self::Precondition {
            operation,
            message: "Please design test cases first",
        }
    }

    pub fn no_artifact(operation: &'static str) -> Self {
        Self::Precondition {
            operation,
            message: "Please implement tests first",
        }
    }

    pub fn no_report(operation: &'static str) -> Self {
        Self::Precondition {
            operation,
            message: "Please run verification first",
        }
    }

    /// Whether this error is caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Precondition { .. } | Self::SessionNotFound(_))
    }
}
