//! # qa_pipeline
//!
//! Phase orchestration for qa-agent.
//!
//! The [`Pipeline`] drives a session through exploration, design,
//! implementation and verification, and offers critique, refinement and chat
//! on top. Each phase builds a prompt, asks the language model, extracts a
//! structured result from the free-form reply and records it on the
//! session's workflow.
//!
//! # Architecture
//!
//! - **Prompts**: one template per phase, sharing a locator strategy
//! - **Extraction**: tolerant JSON and code recovery with logged fallbacks
//! - **Validation**: syntax and structure checks on generated test code
//! - **Correction**: a bounded validate-and-repair loop
//! - **Critique**: one regeneration round from user feedback, then a re-run
//! - **Refinement**: add, modify or remove edits applied to a test plan
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use qa_core::ArtifactStore;
//! use qa_llm::{LlmAdapter, LlmConfig};
//! use qa_pipeline::Pipeline;
//! use qa_runner::{PlaywrightInspector, PytestRunner, RunnerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let llm = LlmAdapter::new(LlmConfig::from_env()?)?;
//!     let runner = PytestRunner::new(RunnerConfig::for_workspace("."));
//!     let pipeline = Pipeline::new(
//!         Arc::new(llm),
//!         Arc::new(runner),
//!         Arc::new(PlaywrightInspector::new("python3")),
//!         ArtifactStore::new("."),
//!     );
//!
//!     pipeline.explore("default", "https://example.com").await?;
//!     pipeline.design("default", None).await?;
//!     let implemented = pipeline.implement("default").await?;
//!     println!("{}", implemented.file_path.display());
//!     Ok(())
//! }
//! ```

pub mod correction;
pub mod critique;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod prompts;
pub mod refine;
pub mod report;
pub mod usage;
pub mod validate;

pub use correction::{CorrectionOutcome, SelfCorrectionLoop, DEFAULT_MAX_ATTEMPTS};
pub use critique::{CritiqueLoop, CritiqueOutcome, Improvement};
pub use error::{PipelineError, PipelineResult};
pub use extract::{Extracted, ResponseExtractor};
pub use pipeline::{
    validate_url, ChatResult, CodeView, CritiqueResult, DesignResult, ExploreResult,
    ImplementResult, Pipeline, RefineResult, VerifyResult,
};
pub use prompts::PromptBuilder;
pub use refine::{apply_refinement, RefineOutcome};
pub use report::VerificationReport;
pub use usage::Usage;
pub use validate::{StructureIssue, SyntaxIssue, Validation, Validator};
