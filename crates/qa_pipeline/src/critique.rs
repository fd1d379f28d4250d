//! Single-shot regeneration of a test artifact from user feedback.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use qa_core::{ArtifactStore, ExecutionReport, TestArtifact};
use qa_llm::{LlmClient, LlmRequest};
use qa_runner::TestRunner;

use crate::error::PipelineResult;
use crate::extract::ResponseExtractor;
use crate::prompts::PromptBuilder;
use crate::usage::Usage;

/// Passing-test counts before and after a critique round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Improvement {
    pub original_passed: usize,
    pub new_passed: usize,
}

#[derive(Debug, Clone)]
pub struct CritiqueOutcome {
    pub artifact: TestArtifact,
    /// Report from re-running the revised artifact.
    pub report: ExecutionReport,
    pub improvement: Improvement,
    pub usage: Usage,
}

pub struct CritiqueLoop {
    llm: Arc<dyn LlmClient>,
    runner: Arc<dyn TestRunner>,
    store: ArtifactStore,
}

impl CritiqueLoop {
    pub fn new(llm: Arc<dyn LlmClient>, runner: Arc<dyn TestRunner>, store: ArtifactStore) -> Self {
        Self { llm, runner, store }
    }

    /// Ask for one revision of `artifact`, save it beside the original and
    /// run it. The pass count after is taken from that fresh run.
    pub async fn run(
        &self,
        critique: &str,
        artifact: &TestArtifact,
        last_report: &ExecutionReport,
    ) -> PipelineResult<CritiqueOutcome> {
        info!(critique = %critique, artifact = %artifact.name, "Handling user critique");
        let prompt = PromptBuilder::critique(&artifact.code, last_report, critique);
        let completion = self.llm.complete(LlmRequest::text(prompt)).await?;

        let code = clean_refactored(&completion.text);
        info!(chars = code.len(), "Refactored code received");
        let path = self.store.save_refactored(&code, &artifact.path)?;
        let revised = artifact.revise(path, code);

        info!(path = %revised.path.display(), "Re-running tests on refactored code");
        let report = self.runner.run(&revised.path).await?;

        let improvement = Improvement {
            original_passed: last_report.passed_records(),
            new_passed: report.passed_records(),
        };
        info!(
            before = improvement.original_passed,
            after = improvement.new_passed,
            "Critique round complete"
        );
        Ok(CritiqueOutcome {
            artifact: revised,
            report,
            improvement,
            usage: Usage::of(&completion),
        })
    }
}

/// Fence markers removed, trailing Markdown sections cut.
fn clean_refactored(text: &str) -> String {
    let stripped = ResponseExtractor::strip_fences(text);
    let kept: Vec<&str> = stripped
        .lines()
        .take_while(|line| {
            let trimmed = line.trim();
            !(trimmed.starts_with("**") || trimmed.starts_with("##"))
        })
        .collect();
    kept.join("\n").trim().to_string()
}
