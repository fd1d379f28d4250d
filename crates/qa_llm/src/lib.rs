//! # qa_llm
//!
//! Language-model collaborator for qa-agent.
//!
//! - [`LlmClient`]: the async seam every pipeline phase calls through
//! - [`LlmAdapter`]: OpenAI-compatible HTTP client (Groq, OpenAI, Ollama)
//! - [`LlmConfig`]: validated sampling and transport settings
//! - [`ScriptedLlm`]: deterministic replies for tests

pub mod adapter;
pub mod client;
pub mod config;
pub mod error;
pub mod mock;

pub use adapter::LlmAdapter;
pub use client::{estimate_tokens, Completion, LlmClient, LlmRequest};
pub use config::{LlmConfig, LlmProvider};
pub use error::{LlmError, LlmResult};
pub use mock::{ScriptedLlm, ScriptedReply};
