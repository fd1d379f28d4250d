//! Error types for the pipeline.

use thiserror::Error;

use qa_core::CoreError;
use qa_llm::LlmError;
use qa_runner::RunnerError;

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors surfaced by a phase operation.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The caller supplied missing or malformed input.
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("{0}")]
    Llm(#[from] LlmError),

    #[error("{0}")]
    Runner(#[from] RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Whether the caller, not a collaborator, caused this error.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidInput(_) => true,
            Self::Core(err) => err.is_client_error(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(PipelineError::invalid_input("URL is required").is_client_error());
        assert!(PipelineError::from(CoreError::no_page_model("design")).is_client_error());
        assert!(!PipelineError::from(LlmError::EmptyResponse).is_client_error());
        assert!(!PipelineError::from(RunnerError::Timeout(5)).is_client_error());
    }

    #[test]
    fn test_precondition_message_passes_through() {
        let err = PipelineError::from(CoreError::no_test_cases("implement"));
        assert_eq!(err.to_string(), "Please design test cases first");
    }
}
