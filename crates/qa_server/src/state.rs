//! Shared application state.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use qa_core::ArtifactStore;
use qa_llm::{Completion, LlmAdapter, LlmClient, LlmError, LlmRequest, LlmResult};
use qa_pipeline::Pipeline;
use qa_runner::{PlaywrightInspector, PytestRunner};

use crate::config::ServerConfig;
use crate::error::ServerResult;

/// State handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    /// Whether a usable model client was configured at startup.
    pub llm_available: bool,
}

impl AppState {
    pub fn new(pipeline: Pipeline, llm_available: bool) -> Arc<Self> {
        Arc::new(Self {
            pipeline,
            llm_available,
        })
    }

    /// Wire the real collaborators described by `config`.
    ///
    /// A missing API key is not fatal: the server starts and every
    /// model-backed route reports the missing key.
    pub fn from_config(config: &ServerConfig) -> ServerResult<Arc<Self>> {
        let llm_config = config.llm_config()?;
        let model = llm_config.model.clone();
        let (llm, available): (Arc<dyn LlmClient>, bool) = match LlmAdapter::new(llm_config) {
            Ok(adapter) => {
                info!(model = %model, "LLM client ready");
                (Arc::new(adapter), true)
            }
            Err(LlmError::NotConfigured(var)) => {
                warn!(variable = %var, "LLM API key missing, model-backed routes will fail");
                (Arc::new(UnconfiguredLlm { model, variable: var }), false)
            }
            Err(e) => return Err(e.into()),
        };

        let runner = PytestRunner::new(config.runner_config());
        let inspector = PlaywrightInspector::new(config.python.clone())
            .headless(config.headless);
        let pipeline = Pipeline::new(
            llm,
            Arc::new(runner),
            Arc::new(inspector),
            ArtifactStore::new(&config.workspace),
        )
        .with_max_attempts(config.max_attempts);
        Ok(Self::new(pipeline, available))
    }
}

/// Stand-in client used when no API key is set.
struct UnconfiguredLlm {
    model: String,
    variable: String,
}

#[async_trait]
impl LlmClient for UnconfiguredLlm {
    async fn complete(&self, _request: LlmRequest) -> LlmResult<Completion> {
        Err(LlmError::NotConfigured(self.variable.clone()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
