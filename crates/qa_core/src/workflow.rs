//! Phase state machine for one test-generation session.
//!
//! A [`Workflow`] moves through `idle → explored → designed → implemented →
//! verified`. Transitions happen only through the `record_*` operations,
//! each of which checks that the artifact it builds on exists. Replacing an
//! upstream artifact clears everything derived from it.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::model::{ExecutionReport, PageModel, TestArtifact, TestSuite};

/// Pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Explored,
    Designed,
    Implemented,
    Verified,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Idle
    }
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Explored => "explored",
            Self::Designed => "designed",
            Self::Implemented => "implemented",
            Self::Verified => "verified",
        }
    }

    /// The next action a user is expected to take from this phase.
    pub fn suggestion(&self) -> Suggestion {
        let (action, message) = match self {
            Self::Idle => ("explore", "Enter a URL to start exploring"),
            Self::Explored => (
                "design",
                "Ready to design test cases. Say \"design tests\" or click Design.",
            ),
            Self::Designed => (
                "implement",
                "Test cases ready. Say \"implement\" to generate Playwright code.",
            ),
            Self::Implemented => ("verify", "Code generated. Say \"verify\" to validate the tests."),
            Self::Verified => (
                "complete",
                "Workflow complete! Download the code or start a new session.",
            ),
        };
        Suggestion {
            action: action.to_string(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub action: String,
    pub message: String,
}

/// Running statistics over model calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Metrics {
    /// Seconds, averaged over `iteration_count` calls.
    pub avg_response_time: f64,
    pub tokens_used: u64,
    pub iteration_count: u64,
}

impl Metrics {
    pub fn record(&mut self, response_time: f64, tokens: u64) {
        let n = self.iteration_count as f64;
        self.avg_response_time = if self.iteration_count == 0 {
            response_time
        } else {
            (self.avg_response_time * n + response_time) / (n + 1.0)
        };
        self.tokens_used += tokens;
        self.iteration_count += 1;
    }
}

/// Read-only view of a workflow for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
    pub phase: Phase,
    pub has_page_structure: bool,
    pub test_cases_count: usize,
    pub has_generated_code: bool,
    pub has_verification: bool,
    pub metrics: Metrics,
    pub suggested_action: String,
    pub suggestion_message: String,
}

/// The per-session aggregate of phase and artifacts.
#[derive(Debug, Clone)]
pub struct Workflow {
    id: String,
    phase: Phase,
    page_model: Option<PageModel>,
    page_model_path: Option<PathBuf>,
    test_cases: TestSuite,
    test_cases_path: Option<PathBuf>,
    artifact: Option<TestArtifact>,
    last_report: Option<ExecutionReport>,
    reports: Vec<ExecutionReport>,
    metrics: Metrics,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            phase: Phase::Idle,
            page_model: None,
            page_model_path: None,
            test_cases: TestSuite::new(),
            test_cases_path: None,
            artifact: None,
            last_report: None,
            reports: Vec::new(),
            metrics: Metrics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn page_model(&self) -> Option<&PageModel> {
        self.page_model.as_ref()
    }

    pub fn page_model_path(&self) -> Option<&PathBuf> {
        self.page_model_path.as_ref()
    }

    pub fn test_cases(&self) -> &TestSuite {
        &self.test_cases
    }

    pub fn test_cases_path(&self) -> Option<&PathBuf> {
        self.test_cases_path.as_ref()
    }

    pub fn artifact(&self) -> Option<&TestArtifact> {
        self.artifact.as_ref()
    }

    pub fn last_report(&self) -> Option<&ExecutionReport> {
        self.last_report.as_ref()
    }

    /// Every report produced in this session, oldest first.
    pub fn reports(&self) -> &[ExecutionReport] {
        &self.reports
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn require_page_model(&self, operation: &'static str) -> CoreResult<&PageModel> {
        self.page_model
            .as_ref()
            .ok_or_else(|| CoreError::no_page_model(operation))
    }

    pub fn require_test_cases(&self, operation: &'static str) -> CoreResult<&TestSuite> {
        if self.test_cases.is_empty() {
            return Err(CoreError::no_test_cases(operation));
        }
        Ok(&self.test_cases)
    }

    pub fn require_artifact(&self, operation: &'static str) -> CoreResult<&TestArtifact> {
        self.artifact
            .as_ref()
            .ok_or_else(|| CoreError::no_artifact(operation))
    }

    pub fn require_report(&self, operation: &'static str) -> CoreResult<&ExecutionReport> {
        self.last_report
            .as_ref()
            .ok_or_else(|| CoreError::no_report(operation))
    }

    /// Store a fresh page model. Supersedes the previous one and everything
    /// designed from it.
    pub fn record_exploration(&mut self, page_model: PageModel, path: PathBuf) {
        info!(session = %self.id, url = %page_model.url, "Recording exploration");
        self.page_model = Some(page_model);
        self.page_model_path = Some(path);
        self.clear_from_design();
        self.advance(Phase::Explored);
    }

    /// Store a designed or refined test plan.
    pub fn record_design(&mut self, test_cases: TestSuite, path: PathBuf) -> CoreResult<()> {
        self.require_page_model("design")?;
        info!(session = %self.id, count = test_cases.len(), "Recording test design");
        self.test_cases = test_cases;
        self.test_cases_path = Some(path);
        self.clear_from_implementation();
        self.advance(Phase::Designed);
        Ok(())
    }

    /// Store a generated test artifact.
    pub fn record_implementation(&mut self, artifact: TestArtifact) -> CoreResult<()> {
        self.require_test_cases("implement")?;
        info!(session = %self.id, path = %artifact.path.display(), "Recording implementation");
        self.artifact = Some(artifact);
        self.last_report = None;
        self.advance(Phase::Implemented);
        Ok(())
    }

    /// Append an execution report for the current artifact.
    pub fn record_verification(&mut self, report: ExecutionReport) -> CoreResult<()> {
        self.require_artifact("verify")?;
        info!(session = %self.id, summary = %report.summary(), "Recording verification");
        self.push_report(report);
        self.advance(Phase::Verified);
        Ok(())
    }

    /// Replace the artifact with a critique revision and its fresh report.
    pub fn record_critique(
        &mut self,
        artifact: TestArtifact,
        report: ExecutionReport,
    ) -> CoreResult<()> {
        self.require_report("critique")?;
        info!(
            session = %self.id,
            version = artifact.version,
            summary = %report.summary(),
            "Recording critique revision"
        );
        self.artifact = Some(artifact);
        self.push_report(report);
        self.advance(Phase::Verified);
        Ok(())
    }

    /// Fold one model call into the running metrics.
    pub fn record_call(&mut self, response_time: f64, tokens: u64) {
        self.metrics.record(response_time, tokens);
        self.updated_at = Utc::now();
    }

    /// Back to `idle`. Files already written stay on disk.
    pub fn reset(&mut self) {
        info!(session = %self.id, "Resetting workflow");
        let id = std::mem::take(&mut self.id);
        *self = Self::new(id);
    }

    pub fn status(&self) -> WorkflowStatus {
        let suggestion = self.phase.suggestion();
        WorkflowStatus {
            phase: self.phase,
            has_page_structure: self.page_model.is_some(),
            test_cases_count: self.test_cases.len(),
            has_generated_code: self.artifact.is_some(),
            has_verification: self.last_report.is_some(),
            metrics: self.metrics,
            suggested_action: suggestion.action,
            suggestion_message: suggestion.message,
        }
    }

    fn push_report(&mut self, report: ExecutionReport) {
        self.reports.push(report.clone());
        self.last_report = Some(report);
    }

    fn clear_from_design(&mut self) {
        self.test_cases = TestSuite::new();
        self.test_cases_path = None;
        self.clear_from_implementation();
    }

    fn clear_from_implementation(&mut self) {
        self.artifact = None;
        self.last_report = None;
    }

    fn advance(&mut self, phase: Phase) {
        debug!(session = %self.id, from = %self.phase, to = %phase, "Phase transition");
        self.phase = phase;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Evidence, TestCase};

    fn page_model() -> PageModel {
        PageModel::skeleton("https://example.com")
    }

    fn suite() -> TestSuite {
        TestSuite::from_cases(vec![TestCase::generic()])
    }

    fn artifact() -> TestArtifact {
        TestArtifact::new(
            PathBuf::from("tests/test_example.py"),
            "def test_x(page): pass".to_string(),
            vec!["TC001".to_string()],
        )
    }

    fn report() -> ExecutionReport {
        ExecutionReport::errored(
            PathBuf::from("tests/test_example.py"),
            Utc::now(),
            1.0,
            "timeout",
            Evidence::default(),
        )
    }

    #[test]
    fn test_new_workflow_is_idle() {
        let wf = Workflow::new("s1");
        assert_eq!(wf.phase(), Phase::Idle);
        assert_eq!(wf.status().suggested_action, "explore");
        assert_eq!(wf.status().suggestion_message, "Enter a URL to start exploring");
    }

    #[test]
    fn test_preconditions_fail_closed() {
        let mut wf = Workflow::new("s1");
        let err = wf.record_design(suite(), PathBuf::from("x")).unwrap_err();
        assert_eq!(err.to_string(), "Please explore a URL first");

        let err = wf.record_implementation(artifact()).unwrap_err();
        assert_eq!(err.to_string(), "Please design test cases first");

        let err = wf.record_verification(report()).unwrap_err();
        assert_eq!(err.to_string(), "Please implement tests first");

        let err = wf.record_critique(artifact(), report()).unwrap_err();
        assert_eq!(err.to_string(), "Please run verification first");

        assert_eq!(wf.phase(), Phase::Idle);
    }

    #[test]
    fn test_full_progression() {
        let mut wf = Workflow::new("s1");
        wf.record_exploration(page_model(), PathBuf::from("pm.json"));
        assert_eq!(wf.phase(), Phase::Explored);
        wf.record_design(suite(), PathBuf::from("tc.json")).unwrap();
        assert_eq!(wf.phase(), Phase::Designed);
        wf.record_implementation(artifact()).unwrap();
        assert_eq!(wf.phase(), Phase::Implemented);
        wf.record_verification(report()).unwrap();
        assert_eq!(wf.phase(), Phase::Verified);
        wf.record_critique(artifact(), report()).unwrap();
        assert_eq!(wf.phase(), Phase::Verified);
        assert_eq!(wf.reports().len(), 2);
    }

    #[test]
    fn test_re_exploration_clears_downstream() {
        let mut wf = Workflow::new("s1");
        wf.record_exploration(page_model(), PathBuf::from("pm.json"));
        wf.record_design(suite(), PathBuf::from("tc.json")).unwrap();
        wf.record_implementation(artifact()).unwrap();

        wf.record_exploration(page_model(), PathBuf::from("pm2.json"));
        assert_eq!(wf.phase(), Phase::Explored);
        assert!(wf.test_cases().is_empty());
        assert!(wf.artifact().is_none());
        assert!(wf.require_artifact("verify").is_err());
    }

    #[test]
    fn test_reset_keeps_id_and_clears_state() {
        let mut wf = Workflow::new("s1");
        wf.record_exploration(page_model(), PathBuf::from("pm.json"));
        wf.record_call(2.0, 100);
        wf.reset();
        assert_eq!(wf.id(), "s1");
        assert_eq!(wf.phase(), Phase::Idle);
        assert!(wf.page_model().is_none());
        assert_eq!(wf.metrics().iteration_count, 0);
    }

    #[test]
    fn test_metrics_running_average() {
        let mut metrics = Metrics::default();
        metrics.record(2.0, 10);
        metrics.record(4.0, 20);
        assert_eq!(metrics.iteration_count, 2);
        assert_eq!(metrics.tokens_used, 30);
        assert!((metrics.avg_response_time - 3.0).abs() < f64::EPSILON);
    }
}
