//! Language-model configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LlmError, LlmResult};

/// OpenAI-compatible chat-completion providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Groq,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl Default for LlmProvider {
    fn default() -> Self {
        Self::Groq
    }
}

impl LlmProvider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    /// Environment variable holding the API key, if the provider needs one.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Groq => Some("GROQ_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Ollama => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Groq => "openai/gpt-oss-120b",
            Self::OpenAi => "gpt-4o-mini",
            Self::Ollama => "llama3.1",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Groq => write!(f, "groq"),
            Self::OpenAi => write!(f, "openai"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(LlmError::invalid_config(
                "provider",
                format!("unknown provider '{}'", other),
            )),
        }
    }
}

/// Sampling and transport settings for the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Overrides the provider's default endpoint.
    pub base_url: Option<String>,
    pub model: String,
    /// Randomness, 0.0 (deterministic) to 2.0.
    pub temperature: f32,
    /// Nucleus sampling cutoff, 0.0 to 1.0.
    pub top_p: f32,
    pub max_tokens: u32,
    /// `low`, `medium` or `high` for reasoning models.
    pub reasoning_effort: Option<String>,
    /// Ask for a JSON object response where a phase expects one.
    pub json_mode: bool,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Groq,
            base_url: None,
            model: LlmProvider::Groq.default_model().to_string(),
            temperature: 1.0,
            top_p: 1.0,
            max_tokens: 5000,
            reasoning_effort: Some("medium".to_string()),
            json_mode: true,
            timeout_seconds: 120,
            max_retries: 3,
        }
    }
}

impl LlmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch provider, resetting the model to that provider's default.
    pub fn provider(mut self, provider: LlmProvider) -> Self {
        self.provider = provider;
        self.model = provider.default_model().to_string();
        if provider == LlmProvider::Ollama {
            self.reasoning_effort = None;
        }
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn reasoning_effort(mut self, effort: Option<String>) -> Self {
        self.reasoning_effort = effort;
        self
    }

    pub fn json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    /// Chat-completions endpoint for the configured provider.
    pub fn endpoint(&self) -> String {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url());
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> LlmResult<()> {
        if self.model.trim().is_empty() {
            return Err(LlmError::invalid_config("model", "must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(LlmError::invalid_config(
                "temperature",
                format!("must be within [0, 2], got {}", self.temperature),
            ));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(LlmError::invalid_config(
                "top_p",
                format!("must be within [0, 1], got {}", self.top_p),
            ));
        }
        if self.max_tokens == 0 {
            return Err(LlmError::invalid_config("max_tokens", "must be greater than 0"));
        }
        if let Some(effort) = &self.reasoning_effort {
            if !matches!(effort.as_str(), "low" | "medium" | "high") {
                return Err(LlmError::invalid_config(
                    "reasoning_effort",
                    format!("must be low, medium or high, got '{}'", effort),
                ));
            }
        }
        Ok(())
    }

    /// Build a configuration from `QA_LLM_*` environment variables.
    ///
    /// Recognized: `QA_LLM_PROVIDER`, `QA_LLM_MODEL`, `QA_LLM_BASE_URL`,
    /// `QA_LLM_TEMPERATURE`, `QA_LLM_TOP_P`, `QA_LLM_MAX_TOKENS`,
    /// `QA_LLM_REASONING_EFFORT`.
    pub fn from_env() -> LlmResult<Self> {
        let mut config = Self::default();
        if let Some(provider) = env_var("QA_LLM_PROVIDER") {
            config = config.provider(provider.parse()?);
        }
        if let Some(model) = env_var("QA_LLM_MODEL") {
            config.model = model;
        }
        if let Some(url) = env_var("QA_LLM_BASE_URL") {
            config.base_url = Some(url);
        }
        if let Some(value) = env_var("QA_LLM_TEMPERATURE") {
            config.temperature = parse_field("temperature", &value)?;
        }
        if let Some(value) = env_var("QA_LLM_TOP_P") {
            config.top_p = parse_field("top_p", &value)?;
        }
        if let Some(value) = env_var("QA_LLM_MAX_TOKENS") {
            config.max_tokens = parse_field("max_tokens", &value)?;
        }
        if let Some(value) = env_var("QA_LLM_REASONING_EFFORT") {
            config.reasoning_effort = match value.as_str() {
                "none" | "off" => None,
                _ => Some(value),
            };
        }
        config.validate()?;
        Ok(config)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_field<T: FromStr>(field: &'static str, value: &str) -> LlmResult<T> {
    value
        .parse()
        .map_err(|_| LlmError::invalid_config(field, format!("cannot parse '{}'", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LlmConfig::default();
        assert_eq!(config.provider, LlmProvider::Groq);
        assert_eq!(config.model, "openai/gpt-oss-120b");
        assert_eq!(config.max_tokens, 5000);
        assert_eq!(config.reasoning_effort.as_deref(), Some("medium"));
        assert!(config.validate().is_ok());
        assert_eq!(
            config.endpoint(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_validation_ranges() {
        assert!(LlmConfig::new().temperature(2.0).validate().is_ok());
        assert!(LlmConfig::new().temperature(2.1).validate().is_err());
        assert!(LlmConfig::new().temperature(-0.1).validate().is_err());
        assert!(LlmConfig::new().top_p(0.0).validate().is_ok());
        assert!(LlmConfig::new().top_p(1.5).validate().is_err());
        assert!(LlmConfig::new().max_tokens(0).validate().is_err());
        assert!(LlmConfig::new()
            .reasoning_effort(Some("extreme".into()))
            .validate()
            .is_err());
    }

    #[test]
    fn test_validation_names_field() {
        let err = LlmConfig::new().top_p(3.0).validate().unwrap_err();
        assert!(err.to_string().contains("top_p"));
    }

    #[test]
    fn test_provider_switch() {
        let config = LlmConfig::new().provider(LlmProvider::Ollama);
        assert_eq!(config.model, "llama3.1");
        assert!(config.reasoning_effort.is_none());
        assert_eq!(config.endpoint(), "http://localhost:11434/v1/chat/completions");

        let custom = LlmConfig::new().base_url("http://proxy.local/v1/");
        assert_eq!(custom.endpoint(), "http://proxy.local/v1/chat/completions");
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert!("bard".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_config_deserializes_partial() {
        let config: LlmConfig = serde_json::from_str(r#"{"temperature": 0.2}"#).unwrap();
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.max_tokens, 5000);
    }
}
