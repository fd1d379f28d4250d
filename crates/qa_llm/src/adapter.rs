//! HTTP adapter for OpenAI-compatible chat-completion APIs.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::{estimate_tokens, Completion, LlmClient, LlmRequest};
use crate::config::LlmConfig;
use crate::error::{LlmError, LlmResult};

/// Chat-completion client for Groq, OpenAI and Ollama.
pub struct LlmAdapter {
    config: LlmConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl LlmAdapter {
    /// Create an adapter, reading the provider's API key from the environment.
    pub fn new(config: LlmConfig) -> LlmResult<Self> {
        let api_key = match config.provider.api_key_env() {
            Some(var) => match std::env::var(var) {
                Ok(key) if !key.trim().is_empty() => Some(key),
                _ => return Err(LlmError::NotConfigured(var.to_string())),
            },
            None => None,
        };
        Self::with_api_key(config, api_key)
    }

    /// Create an adapter with an explicit key (or none for keyless providers).
    pub fn with_api_key(config: LlmConfig, api_key: Option<String>) -> LlmResult<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn build_request(&self, request: &LlmRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: self.config.max_tokens,
            reasoning_effort: self.config.reasoning_effort.clone(),
            response_format: (request.json_mode && self.config.json_mode).then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
        }
    }
}

#[async_trait]
impl LlmClient for LlmAdapter {
    async fn complete(&self, request: LlmRequest) -> LlmResult<Completion> {
        let url = self.config.endpoint();
        let body = self.build_request(&request);
        let max_retries = self.config.max_retries.max(1);
        let started = Instant::now();
        let mut last_error = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << attempt);
                debug!(attempt, delay_secs = delay.as_secs(), "Retrying LLM request");
                tokio::time::sleep(delay).await;
            }

            let mut builder = self.client.post(&url).json(&body);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }

            let response = match builder.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "LLM network error");
                    last_error = Some(LlmError::Request(format!("Network error: {}", e)));
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() || status.as_u16() == 429 {
                let text = response.text().await.unwrap_or_default();
                warn!(
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    max_retries,
                    "LLM API transient error"
                );
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    body: text,
                });
                continue;
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    body: text,
                });
            }

            let result: ChatResponse = response
                .json()
                .await
                .map_err(|e| LlmError::Request(format!("Failed to parse response: {}", e)))?;

            let text = result
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .filter(|t| !t.trim().is_empty())
                .ok_or(LlmError::EmptyResponse)?;

            let tokens_used = result
                .usage
                .and_then(|u| u.total_tokens)
                .unwrap_or_else(|| estimate_tokens(&request.prompt, &text));
            let response_time = started.elapsed().as_secs_f64();

            debug!(
                model = %self.config.model,
                tokens_used,
                response_time,
                "LLM completion received"
            );

            return Ok(Completion {
                text,
                response_time,
                tokens_used,
                model: result.model.unwrap_or_else(|| self.config.model.clone()),
            });
        }

        Err(last_error.unwrap_or_else(|| LlmError::Request("Max retries exceeded".to_string())))
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16384];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn local_config(base_url: String) -> LlmConfig {
        let mut config = LlmConfig::new()
            .provider(LlmProvider::Ollama)
            .base_url(base_url);
        config.max_retries = 1;
        config
    }

    #[test]
    fn test_missing_key_is_not_configured() {
        std::env::remove_var("OPENAI_API_KEY");
        let err = LlmAdapter::new(LlmConfig::new().provider(LlmProvider::OpenAi))
            .err()
            .unwrap();
        assert!(matches!(err, LlmError::NotConfigured(ref v) if v == "OPENAI_API_KEY"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LlmConfig::new().provider(LlmProvider::Ollama).temperature(5.0);
        assert!(LlmAdapter::with_api_key(config, None).is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let adapter =
            LlmAdapter::with_api_key(LlmConfig::new(), Some("key".to_string())).unwrap();
        let body = adapter.build_request(&LlmRequest::json("hello").with_system("sys"));
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hello");
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["reasoning_effort"], "medium");
        assert_eq!(value["max_tokens"], 5000);

        let plain = adapter.build_request(&LlmRequest::text("hello"));
        let value = serde_json::to_value(&plain).unwrap();
        assert!(value.get("response_format").is_none());
    }

    #[tokio::test]
    async fn test_complete_parses_response() {
        let body = serde_json::json!({
            "model": "llama3.1",
            "choices": [{"message": {"role": "assistant", "content": "{\"ok\": true}"}}],
            "usage": {"total_tokens": 42}
        })
        .to_string();
        let base = serve_once("200 OK", body).await;
        let adapter = LlmAdapter::with_api_key(local_config(base), None).unwrap();

        let completion = adapter.complete(LlmRequest::json("ping")).await.unwrap();
        assert_eq!(completion.text, "{\"ok\": true}");
        assert_eq!(completion.tokens_used, 42);
        assert_eq!(completion.model, "llama3.1");
        assert!(completion.response_time >= 0.0);
    }

    #[tokio::test]
    async fn test_complete_estimates_tokens_without_usage() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "three word reply"}}]
        })
        .to_string();
        let base = serve_once("200 OK", body).await;
        let adapter = LlmAdapter::with_api_key(local_config(base), None).unwrap();

        let completion = adapter.complete(LlmRequest::text("two words")).await.unwrap();
        assert_eq!(completion.tokens_used, 5);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let base = serve_once("401 Unauthorized", "{\"error\":\"bad key\"}".to_string()).await;
        let adapter = LlmAdapter::with_api_key(local_config(base), None).unwrap();

        let err = adapter.complete(LlmRequest::text("ping")).await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_empty_content_is_error() {
        let body = serde_json::json!({"choices": [{"message": {"content": ""}}]}).to_string();
        let base = serve_once("200 OK", body).await;
        let adapter = LlmAdapter::with_api_key(local_config(base), None).unwrap();

        let err = adapter.complete(LlmRequest::text("ping")).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }
}
