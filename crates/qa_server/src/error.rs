//! Error types for the HTTP surface.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use qa_llm::LlmError;
use qa_pipeline::PipelineError;

/// Result type alias for server setup.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised while loading configuration or building the app.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("LLM configuration error: {0}")]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A failed route, rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        if err.is_client_error() {
            Self::bad_request(err.to_string())
        } else {
            error!(error = %err, "Operation failed");
            Self::internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_core::CoreError;

    #[test]
    fn test_pipeline_errors_map_to_status() {
        let err: ApiError = PipelineError::invalid_input("URL is required").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = PipelineError::from(CoreError::no_artifact("verify")).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Please implement tests first");

        let err: ApiError = PipelineError::from(LlmError::EmptyResponse).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
