//! The phase orchestrator.
//!
//! Every operation locks its session's workflow for its whole duration, so
//! calls against one session run one at a time. Preconditions are checked
//! against the workflow before any collaborator is called, and the workflow
//! only advances once the operation has succeeded.

use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use qa_core::{
    ArtifactStore, CoreResult, DomSnapshot, ExecutionReport, Metrics, PageModel, RawDom,
    SessionRegistry, SharedWorkflow, TestArtifact, TestSuite, TestSummary, Workflow,
    WorkflowStatus,
};
use qa_llm::{LlmClient, LlmRequest};
use qa_runner::{list_evidence, EvidenceListing, PageInspector, RunEvent, TestRunner};

use crate::correction::{CorrectionOutcome, SelfCorrectionLoop, DEFAULT_MAX_ATTEMPTS};
use crate::critique::{CritiqueLoop, Improvement};
use crate::error::{PipelineError, PipelineResult};
use crate::extract::ResponseExtractor;
use crate::prompts::PromptBuilder;
use crate::refine::apply_refinement;
use crate::report::{ExecutionDetails, ReportEvidence, VerificationReport};
use crate::usage::Usage;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://\S+$").expect("valid regex"));

#[derive(Debug, Clone, Serialize)]
pub struct ExploreResult {
    pub success: bool,
    pub page_data: PageModel,
    pub page_model_path: PathBuf,
    #[serde(flatten)]
    pub usage: Usage,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct DesignResult {
    pub success: bool,
    pub test_cases: TestSuite,
    pub test_cases_path: PathBuf,
    pub summary: TestSummary,
    /// Set when the model's plan could not be parsed and the default case was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub usage: Usage,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImplementResult {
    pub success: bool,
    pub code: String,
    pub file_path: PathBuf,
    pub self_correction: CorrectionOutcome,
    #[serde(flatten)]
    pub usage: Usage,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyResult {
    pub success: bool,
    pub report: VerificationReport,
    pub evidence: ReportEvidence,
    pub execution_details: ExecutionDetails,
    #[serde(flatten)]
    pub usage: Usage,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct CritiqueExecution {
    pub success: bool,
    pub passed: usize,
    pub duration: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CritiqueEvidence {
    pub video_files: Vec<PathBuf>,
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CritiqueResult {
    pub success: bool,
    pub message: String,
    pub refactored_code: String,
    pub new_file_path: PathBuf,
    pub execution_result: CritiqueExecution,
    pub evidence: CritiqueEvidence,
    pub improvement: Improvement,
    #[serde(flatten)]
    pub usage: Usage,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefineResult {
    pub success: bool,
    pub response: String,
    pub test_cases: TestSuite,
    pub changed: bool,
    #[serde(flatten)]
    pub usage: Usage,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResult {
    pub success: bool,
    pub response: String,
    #[serde(flatten)]
    pub usage: Usage,
    pub metrics: Metrics,
}

/// The current artifact's source, if any.
#[derive(Debug, Clone, Serialize)]
pub struct CodeView {
    pub code: String,
    pub has_code: bool,
    pub path: Option<PathBuf>,
}

impl CodeView {
    fn empty() -> Self {
        Self {
            code: String::new(),
            has_code: false,
            path: None,
        }
    }
}

/// Coordinates phases across sessions and collaborators.
#[derive(Clone)]
pub struct Pipeline {
    llm: Arc<dyn LlmClient>,
    runner: Arc<dyn TestRunner>,
    inspector: Arc<dyn PageInspector>,
    store: ArtifactStore,
    sessions: SessionRegistry,
    max_attempts: usize,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        runner: Arc<dyn TestRunner>,
        inspector: Arc<dyn PageInspector>,
        store: ArtifactStore,
    ) -> Self {
        Self {
            llm,
            runner,
            inspector,
            store,
            sessions: SessionRegistry::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Model name reported by the language-model collaborator.
    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Inspect `url`, ask the model to interpret it, and store the page model.
    pub async fn explore(&self, session: &str, url: &str) -> PipelineResult<ExploreResult> {
        let url = validate_url(url)?;
        let workflow = self.sessions.get_or_create(session);
        let mut wf = workflow.lock().await;
        info!(session = %session, url = %url, "Starting exploration");

        let dom = match self.inspector.inspect(url).await {
            Ok(dom) => {
                info!(
                    elements = dom.elements.len(),
                    forms = dom.forms.len(),
                    title = %dom.title,
                    "DOM extraction successful"
                );
                dom
            }
            Err(e) => {
                warn!(error = %e, "DOM extraction failed, using empty fallback data");
                DomSnapshot::empty(url)
            }
        };

        let prompt = PromptBuilder::explore(url, &dom);
        debug!(chars = prompt.len(), "Exploration prompt built");
        let completion = self.llm.complete(LlmRequest::json(prompt)).await?;

        let mut page_model = ResponseExtractor::page_model(&completion.text, url).value;
        page_model.raw_dom = RawDom::from_snapshot(&dom);
        let path = self.store.save_page_model(&page_model)?;
        info!(
            elements = page_model.elements.len(),
            flows = page_model.user_flows.len(),
            path = %path.display(),
            "Exploration complete"
        );

        let usage = Usage::of(&completion);
        wf.record_exploration(page_model.clone(), path.clone());
        wf.record_call(usage.response_time, usage.tokens_used);
        Ok(ExploreResult {
            success: true,
            page_data: page_model,
            page_model_path: path,
            usage,
            metrics: *wf.metrics(),
        })
    }

    /// Design a test plan for the explored page, optionally guided by the user.
    pub async fn design(
        &self,
        session: &str,
        guidance: Option<&str>,
    ) -> PipelineResult<DesignResult> {
        let workflow = self.existing(session, |wf| wf.require_page_model("design").map(drop))?;
        let mut wf = workflow.lock().await;
        let page_model = wf.require_page_model("design")?.clone();
        info!(session = %session, elements = page_model.elements.len(), "Starting design");

        let prompt = PromptBuilder::design(&page_model, guidance);
        debug!(chars = prompt.len(), "Design prompt built");
        let completion = self.llm.complete(LlmRequest::text(prompt)).await?;

        let extracted = ResponseExtractor::test_cases(&completion.text);
        let message = extracted
            .fallback
            .then(|| "Could not parse the model's test plan; using the default test case".to_string());
        let suite = TestSuite::from_cases(extracted.value);
        let path = self.store.save_test_cases(&suite, &page_model)?;
        let summary = suite.summary();
        info!(
            total = suite.len(),
            high = summary.high_priority,
            medium = summary.medium_priority,
            low = summary.low_priority,
            "Design complete"
        );

        let usage = Usage::of(&completion);
        wf.record_design(suite.clone(), path.clone())?;
        wf.record_call(usage.response_time, usage.tokens_used);
        Ok(DesignResult {
            success: true,
            test_cases: suite,
            test_cases_path: path,
            summary,
            message,
            usage,
            metrics: *wf.metrics(),
        })
    }

    /// Generate test code for the designed cases and repair it until it validates.
    pub async fn implement(&self, session: &str) -> PipelineResult<ImplementResult> {
        let workflow = self.existing(session, |wf| wf.require_test_cases("implement").map(drop))?;
        let mut wf = workflow.lock().await;
        let cases = wf.require_test_cases("implement")?.clone();
        let page_model = wf.require_page_model("implement")?.clone();
        info!(session = %session, cases = cases.len(), "Starting implementation");

        let prompt = PromptBuilder::implement(cases.as_slice(), &page_model);
        let completion = self.llm.complete(LlmRequest::text(prompt)).await?;
        let mut code = ResponseExtractor::code(&completion.text);
        if !code.contains("import") {
            warn!("Generated code has no imports, using default template");
            code = PromptBuilder::fallback_code(&page_model, cases.as_slice());
        }

        let outcome = SelfCorrectionLoop::new(self.llm.clone())
            .with_max_attempts(self.max_attempts)
            .run(code)
            .await;
        let path = self.store.save_test_file(&outcome.code, &page_model)?;
        let mut artifact = TestArtifact::new(path.clone(), outcome.code.clone(), cases.ids());
        artifact.correction_attempts = outcome.attempts;

        let usage = Usage::of(&completion).merge(outcome.usage);
        wf.record_implementation(artifact)?;
        wf.record_call(usage.response_time, usage.tokens_used);
        info!(path = %path.display(), attempts = outcome.attempts, "Implementation complete");
        Ok(ImplementResult {
            success: true,
            code: outcome.code.clone(),
            file_path: path,
            self_correction: outcome,
            usage,
            metrics: *wf.metrics(),
        })
    }

    /// Run the current artifact to completion.
    pub async fn verify(&self, session: &str) -> PipelineResult<VerifyResult> {
        let workflow = self.existing(session, |wf| wf.require_artifact("verify").map(drop))?;
        let mut wf = workflow.lock().await;
        let test_file = wf.require_artifact("verify")?.path.clone();
        info!(session = %session, file = %test_file.display(), "Starting verification");

        let report = self.runner.run(&test_file).await?;
        self.persist_report(&report, wf.page_model())?;
        let view = VerificationReport::from_execution(&report);
        let usage = Usage {
            response_time: report.duration_secs,
            tokens_used: 0,
        };
        info!(summary = %report.summary(), "Verification complete");

        wf.record_verification(report)?;
        wf.record_call(usage.response_time, usage.tokens_used);
        Ok(VerifyResult {
            success: true,
            evidence: view.evidence.clone(),
            execution_details: view.execution_details.clone(),
            report: view,
            usage,
            metrics: *wf.metrics(),
        })
    }

    /// Run the current artifact, forwarding runner events to `events`.
    ///
    /// A failed precondition is reported as a single `error` event.
    pub async fn verify_stream(
        &self,
        session: &str,
        events: mpsc::Sender<RunEvent>,
    ) -> PipelineResult<ExecutionReport> {
        let workflow = match self.existing(session, |wf| wf.require_artifact("verify").map(drop)) {
            Ok(workflow) => workflow,
            Err(e) => {
                let _ = events.send(RunEvent::error(e.to_string())).await;
                return Err(e);
            }
        };
        let mut wf = workflow.lock().await;
        let test_file = match wf.require_artifact("verify") {
            Ok(artifact) => artifact.path.clone(),
            Err(e) => {
                let _ = events.send(RunEvent::error(e.to_string())).await;
                return Err(e.into());
            }
        };
        info!(session = %session, file = %test_file.display(), "Starting streaming verification");

        let report = self.runner.run_streaming(&test_file, events).await?;
        self.persist_report(&report, wf.page_model())?;
        wf.record_verification(report.clone())?;
        wf.record_call(report.duration_secs, 0);
        Ok(report)
    }

    /// Revise the current artifact from user feedback and re-run it.
    pub async fn critique(&self, session: &str, critique: &str) -> PipelineResult<CritiqueResult> {
        let critique = critique.trim();
        if critique.is_empty() {
            return Err(PipelineError::invalid_input("Critique message is required"));
        }
        let workflow = self.existing(session, |wf| wf.require_report("critique").map(drop))?;
        let mut wf = workflow.lock().await;
        let last_report = wf.require_report("critique")?.clone();
        let artifact = wf.require_artifact("critique")?.clone();

        let outcome = CritiqueLoop::new(self.llm.clone(), self.runner.clone(), self.store.clone())
            .run(critique, &artifact, &last_report)
            .await?;
        self.persist_report(&outcome.report, wf.page_model())?;

        let improvement = outcome.improvement;
        let usage = outcome.usage;
        let refactored_code = outcome.artifact.code.clone();
        let new_file_path = outcome.artifact.path.clone();
        let execution_result = CritiqueExecution {
            success: outcome.report.success(),
            passed: improvement.new_passed,
            duration: outcome.report.duration_secs,
        };
        let evidence = CritiqueEvidence {
            video_files: outcome.report.evidence.video_files.clone(),
            report_path: outcome.report.evidence.report_path.clone(),
        };

        wf.record_critique(outcome.artifact, outcome.report)?;
        wf.record_call(usage.response_time, usage.tokens_used);
        Ok(CritiqueResult {
            success: true,
            message: format!(
                "Tests refactored based on your critique. Results: {} tests passing (was {})",
                improvement.new_passed, improvement.original_passed
            ),
            refactored_code,
            new_file_path,
            execution_result,
            evidence,
            improvement,
            usage,
            metrics: *wf.metrics(),
        })
    }

    /// Add, modify or remove test cases as the user asks.
    pub async fn refine(&self, session: &str, feedback: &str) -> PipelineResult<RefineResult> {
        let feedback = feedback.trim();
        if feedback.is_empty() {
            return Err(PipelineError::invalid_input("Message is required"));
        }
        let workflow = self.existing(session, |wf| wf.require_page_model("refine").map(drop))?;
        let mut wf = workflow.lock().await;
        let page_model = wf.require_page_model("refine")?.clone();
        let current = wf.test_cases().clone();
        info!(session = %session, current = current.len(), "Refining test cases");

        let prompt = PromptBuilder::refine(&page_model, &current, feedback);
        let completion = self.llm.complete(LlmRequest::json(prompt)).await?;
        let outcome = apply_refinement(&current, &completion.text);

        if outcome.changed {
            let path = self.store.save_test_cases(&outcome.suite, &page_model)?;
            wf.record_design(outcome.suite.clone(), path)?;
        }
        let usage = Usage::of(&completion);
        wf.record_call(usage.response_time, usage.tokens_used);
        Ok(RefineResult {
            success: true,
            response: outcome.message,
            test_cases: outcome.suite,
            changed: outcome.changed,
            usage,
            metrics: *wf.metrics(),
        })
    }

    /// Answer a free-form question with the session's state as context.
    pub async fn chat(&self, session: &str, message: &str) -> PipelineResult<ChatResult> {
        let message = message.trim();
        if message.is_empty() {
            return Err(PipelineError::invalid_input("Message is required"));
        }
        let workflow = self.sessions.get_or_create(session);
        let mut wf = workflow.lock().await;
        let system = PromptBuilder::chat_system(wf.phase(), wf.page_model(), wf.test_cases());
        let completion = self
            .llm
            .complete(LlmRequest::text(message).with_system(system))
            .await?;

        let usage = Usage::of(&completion);
        wf.record_call(usage.response_time, usage.tokens_used);
        Ok(ChatResult {
            success: true,
            response: completion.text,
            usage,
            metrics: *wf.metrics(),
        })
    }

    pub async fn reset(&self, session: &str) {
        self.sessions.reset(session).await;
    }

    /// Status of `session`; an unknown session reads as a fresh idle one.
    pub async fn state(&self, session: &str) -> WorkflowStatus {
        match self.sessions.get(session) {
            Some(workflow) => workflow.lock().await.status(),
            None => Workflow::new(session).status(),
        }
    }

    pub async fn code(&self, session: &str) -> CodeView {
        let Some(workflow) = self.sessions.get(session) else {
            return CodeView::empty();
        };
        let wf = workflow.lock().await;
        match wf.artifact() {
            Some(artifact) => CodeView {
                code: artifact.code.clone(),
                has_code: true,
                path: Some(artifact.path.clone()),
            },
            None => CodeView::empty(),
        }
    }

    /// Recordings and reports under the runner's evidence directory.
    pub fn evidence(&self) -> EvidenceListing {
        list_evidence(self.runner.evidence_dir())
    }

    /// Workflow of a known session. For an unknown one, `check` runs against a
    /// fresh workflow first, so an operation that cannot succeed there fails
    /// without registering the session.
    fn existing(
        &self,
        session: &str,
        check: impl FnOnce(&Workflow) -> CoreResult<()>,
    ) -> PipelineResult<SharedWorkflow> {
        if let Some(workflow) = self.sessions.get(session) {
            return Ok(workflow);
        }
        check(&Workflow::new(session))?;
        Ok(self.sessions.get_or_create(session))
    }

    fn persist_report(
        &self,
        report: &ExecutionReport,
        page_model: Option<&PageModel>,
    ) -> PipelineResult<PathBuf> {
        let url = page_model.map(|m| m.url.as_str()).unwrap_or_default();
        Ok(self.store.save_execution_report(report, url)?)
    }
}

/// Trimmed `url`, or the input error the caller should see.
pub fn validate_url(url: &str) -> PipelineResult<&str> {
    let url = url.trim();
    if url.is_empty() {
        return Err(PipelineError::invalid_input("URL is required"));
    }
    if !URL_PATTERN.is_match(url) {
        return Err(PipelineError::invalid_input("Invalid URL format"));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert_eq!(validate_url(" https://example.com ").unwrap(), "https://example.com");
        assert!(validate_url("http://localhost:8080/login").is_ok());
        assert_eq!(validate_url("").unwrap_err().to_string(), "URL is required");
        assert_eq!(
            validate_url("example.com").unwrap_err().to_string(),
            "Invalid URL format"
        );
        assert!(validate_url("ftp://example.com").is_err());
    }
}
