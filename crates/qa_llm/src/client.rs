//! The language-model seam used by every pipeline phase.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmResult;

/// A single prompt sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub prompt: String,
    /// Optional system message placed before the prompt.
    pub system: Option<String>,
    /// Request a JSON object response.
    pub json_mode: bool,
}

impl LlmRequest {
    /// Plain text request.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            json_mode: false,
        }
    }

    /// Request that expects a JSON object back.
    pub fn json(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            json_mode: true,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// The model's reply plus call metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    /// Wall-clock seconds spent on the call, retries included.
    pub response_time: f64,
    pub tokens_used: u64,
    pub model: String,
}

/// Anything that can turn a prompt into text.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> LlmResult<Completion>;

    fn model(&self) -> &str;
}

/// Rough token count used when the provider reports no usage.
pub fn estimate_tokens(prompt: &str, text: &str) -> u64 {
    (prompt.split_whitespace().count() + text.split_whitespace().count()) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_counts_words() {
        assert_eq!(estimate_tokens("one two three", "four five"), 5);
        assert_eq!(estimate_tokens("", ""), 0);
    }

    #[test]
    fn test_request_builders() {
        let req = LlmRequest::json("explore").with_system("be terse");
        assert!(req.json_mode);
        assert_eq!(req.system.as_deref(), Some("be terse"));
        assert!(!LlmRequest::text("hi").json_mode);
    }
}
