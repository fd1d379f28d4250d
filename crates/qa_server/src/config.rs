//! Server configuration.
//!
//! Values come from an optional YAML file; command-line flags and their
//! environment variables are applied on top by the binary.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use qa_llm::LlmConfig;
use qa_pipeline::DEFAULT_MAX_ATTEMPTS;
use qa_runner::RunnerConfig;

use crate::error::{ServerError, ServerResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Root holding `output/`, `tests/` and `evidence/`.
    pub workspace: PathBuf,
    pub max_attempts: usize,
    pub headless: bool,
    /// Interpreter for pytest and page inspection.
    pub python: String,
    pub run_timeout_seconds: u64,
    /// When absent the model settings come from `QA_LLM_*` variables.
    pub llm: Option<LlmConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            workspace: PathBuf::from("."),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            headless: true,
            python: "python".to_string(),
            run_timeout_seconds: RunnerConfig::DEFAULT_TIMEOUT_SECS,
            llm: None,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> ServerResult<Self> {
        if !path.exists() {
            return Err(ServerError::ConfigNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded server configuration");
        Ok(config)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.max_attempts == 0 {
            return Err(ServerError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.run_timeout_seconds == 0 {
            return Err(ServerError::InvalidConfig(
                "run_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if let Some(llm) = &self.llm {
            llm.validate()?;
        }
        Ok(())
    }

    /// Model settings from the file, or from the environment.
    pub fn llm_config(&self) -> ServerResult<LlmConfig> {
        match &self.llm {
            Some(llm) => Ok(llm.clone()),
            None => Ok(LlmConfig::from_env()?),
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::for_workspace(&self.workspace)
            .python(self.python.clone())
            .timeout(self.run_timeout_seconds)
            .headless(self.headless)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind.to_string(), "127.0.0.1:5000");
        assert_eq!(config.max_attempts, 3);
        assert!(config.headless);
    }

    #[test]
    fn test_load_partial_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("qa-agent.yaml");
        fs::write(
            &path,
            "bind: 0.0.0.0:8080\nheadless: false\nllm:\n  provider: ollama\n  model: llama3\n",
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert!(!config.headless);
        assert_eq!(config.max_attempts, 3);
        let llm = config.llm_config().unwrap();
        assert_eq!(llm.model, "llama3");

        let runner = config.runner_config();
        assert!(!runner.headless);
        assert_eq!(runner.tests_dir, PathBuf::from("./tests"));
    }

    #[test]
    fn test_load_rejects_bad_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yaml");
        fs::write(&path, "max_attempts: 0\n").unwrap();
        assert!(matches!(
            ServerConfig::load(&path),
            Err(ServerError::InvalidConfig(_))
        ));

        fs::write(&path, "llm:\n  temperature: 3.5\n").unwrap();
        assert!(matches!(ServerConfig::load(&path), Err(ServerError::Llm(_))));

        assert!(matches!(
            ServerConfig::load(&temp.path().join("missing.yaml")),
            Err(ServerError::ConfigNotFound(_))
        ));
    }
}
