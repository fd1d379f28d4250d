//! Scripted language model for testing.
//!
//! Replies are returned in order; once the script is exhausted the last
//! reply repeats. Every request is captured for later inspection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::client::{estimate_tokens, Completion, LlmClient, LlmRequest};
use crate::error::{LlmError, LlmResult};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// Fail the call with [`LlmError::Request`].
    Error(String),
}

#[derive(Clone)]
pub struct ScriptedLlm {
    model: String,
    replies: Arc<RwLock<Vec<ScriptedReply>>>,
    cursor: Arc<AtomicUsize>,
    captured: Arc<RwLock<Vec<LlmRequest>>>,
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            model: "scripted-model".to_string(),
            replies: Arc::new(RwLock::new(Vec::new())),
            cursor: Arc::new(AtomicUsize::new(0)),
            captured: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Script from a list of text replies.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let llm = Self::new();
        *llm.replies.write() = replies
            .into_iter()
            .map(|r| ScriptedReply::Text(r.into()))
            .collect();
        llm
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies.write().push(ScriptedReply::Text(text.into()));
        self
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.replies.write().push(ScriptedReply::Error(message.into()));
        self
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.captured.read().iter().map(|r| r.prompt.clone()).collect()
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.captured.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured.read().len()
    }

    fn next_reply(&self) -> Option<ScriptedReply> {
        let replies = self.replies.read();
        if replies.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        replies.get(index.min(replies.len() - 1)).cloned()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: LlmRequest) -> LlmResult<Completion> {
        self.captured.write().push(request.clone());
        match self.next_reply() {
            Some(ScriptedReply::Text(text)) => Ok(Completion {
                tokens_used: estimate_tokens(&request.prompt, &text),
                text,
                response_time: 0.01,
                model: self.model.clone(),
            }),
            Some(ScriptedReply::Error(message)) => Err(LlmError::Request(message)),
            None => Err(LlmError::EmptyResponse),
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_then_repeat_last() {
        let llm = ScriptedLlm::with_replies(["first", "second"]);
        let a = llm.complete(LlmRequest::text("1")).await.unwrap();
        let b = llm.complete(LlmRequest::text("2")).await.unwrap();
        let c = llm.complete(LlmRequest::text("3")).await.unwrap();
        assert_eq!(a.text, "first");
        assert_eq!(b.text, "second");
        assert_eq!(c.text, "second");
        assert_eq!(llm.prompts(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let llm = ScriptedLlm::new().reply("ok").fail("boom");
        assert!(llm.complete(LlmRequest::text("a")).await.is_ok());
        let err = llm.complete(LlmRequest::text("b")).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_script_is_empty_response() {
        let llm = ScriptedLlm::new();
        assert!(matches!(
            llm.complete(LlmRequest::text("a")).await,
            Err(LlmError::EmptyResponse)
        ));
    }
}
