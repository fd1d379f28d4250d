//! Error types for the language-model collaborator.

use thiserror::Error;

/// Result type alias for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM not configured. Set {0}")]
    NotConfigured(String),

    #[error("Invalid LLM configuration: {field} {message}")]
    InvalidConfig { field: &'static str, message: String },

    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Empty response from LLM")]
    EmptyResponse,

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LlmError {
    pub fn invalid_config(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }
}
