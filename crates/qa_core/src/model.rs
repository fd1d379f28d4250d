//! Data model shared by every pipeline phase.
//!
//! Field names follow the JSON shapes exchanged with the language model and
//! persisted to disk (`userFlows`, `pageMetadata`, `expectedResult`), so the
//! same types deserialize model output and serialize artifacts.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_true() -> bool {
    true
}

/// Test priority. Unknown values from the model collapse to `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "high" | "critical" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }
}

/// Test category. Unknown values collapse to `Functional`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum TestType {
    #[default]
    Functional,
    Ui,
    Integration,
}

impl From<String> for TestType {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "ui" => Self::Ui,
            "integration" => Self::Integration,
            _ => Self::Functional,
        }
    }
}

/// An interactive element the model identified on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageElement {
    #[serde(rename = "type", default)]
    pub element_type: String,
    #[serde(default)]
    pub locator: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub interactions: Vec<String>,
    #[serde(default = "default_true")]
    pub testable: bool,
}

/// A user journey through the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserFlow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
}

/// Page-level classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    #[serde(default = "PageMetadata::default_title")]
    pub title: String,
    #[serde(rename = "type", default = "PageMetadata::default_type")]
    pub page_type: String,
    #[serde(default = "PageMetadata::default_complexity")]
    pub complexity: String,
}

impl PageMetadata {
    fn default_title() -> String {
        "Web Page".to_string()
    }

    fn default_type() -> String {
        "generic".to_string()
    }

    fn default_complexity() -> String {
        "medium".to_string()
    }
}

impl Default for PageMetadata {
    fn default() -> Self {
        Self {
            title: Self::default_title(),
            page_type: Self::default_type(),
            complexity: Self::default_complexity(),
        }
    }
}

/// An element as seen by the browser, before any model interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DomElement {
    #[serde(default)]
    pub tag: String,
    #[serde(rename = "type", default)]
    pub element_type: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub locator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DomInput {
    #[serde(rename = "type", default)]
    pub input_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DomForm {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub inputs: Vec<DomInput>,
}

/// Raw structure extracted from a live page by the browser collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DomSnapshot {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub elements: Vec<DomElement>,
    #[serde(default)]
    pub forms: Vec<DomForm>,
    #[serde(default)]
    pub html_snippet: String,
}

impl DomSnapshot {
    /// Placeholder used when the page could not be loaded.
    pub fn empty(url: &str) -> Self {
        Self {
            title: "Unknown".to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }
}

/// Summary of the raw DOM kept alongside the interpreted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawDom {
    pub element_count: usize,
    pub form_count: usize,
    pub elements: Vec<DomElement>,
}

impl RawDom {
    /// Number of raw elements retained for reference.
    pub const RETAINED_ELEMENTS: usize = 30;

    pub fn from_snapshot(snapshot: &DomSnapshot) -> Self {
        Self {
            element_count: snapshot.elements.len(),
            form_count: snapshot.forms.len(),
            elements: snapshot
                .elements
                .iter()
                .take(Self::RETAINED_ELEMENTS)
                .cloned()
                .collect(),
        }
    }
}

/// Structured description of a page's testable surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageModel {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub elements: Vec<PageElement>,
    #[serde(rename = "userFlows", default)]
    pub user_flows: Vec<UserFlow>,
    #[serde(rename = "pageMetadata", default)]
    pub page_metadata: PageMetadata,
    #[serde(default)]
    pub raw_dom: RawDom,
}

impl PageModel {
    /// Empty model used when the model's analysis cannot be parsed.
    pub fn skeleton(url: &str) -> Self {
        Self {
            url: url.to_string(),
            elements: Vec::new(),
            user_flows: Vec::new(),
            page_metadata: PageMetadata::default(),
            raw_dom: RawDom::default(),
        }
    }

    pub fn find_locator(&self, locator: &str) -> Option<&PageElement> {
        self.elements.iter().find(|e| e.locator == locator)
    }
}

/// A single designed test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TestCase {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(rename = "type", default)]
    pub test_type: TestType,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(rename = "expectedResult", default)]
    pub expected_result: String,
    #[serde(default)]
    pub elements: Vec<String>,
}

impl TestCase {
    /// The case returned when no test plan could be recovered.
    pub fn generic() -> Self {
        Self {
            id: "TC001".to_string(),
            title: "Verify page loads successfully".to_string(),
            priority: Priority::High,
            test_type: TestType::Functional,
            steps: vec![
                "Navigate to page".to_string(),
                "Wait for main content to load".to_string(),
                "Check the page title".to_string(),
            ],
            expected_result: "Page loads without errors and shows its title".to_string(),
            elements: Vec::new(),
        }
    }
}

/// Priority and type counts for a test plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TestSummary {
    pub high_priority: usize,
    pub medium_priority: usize,
    pub low_priority: usize,
    pub functional: usize,
    pub ui: usize,
    pub integration: usize,
}

/// Ordered collection of test cases with set semantics on `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct TestSuite {
    cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a suite, renumbering cases whose id is empty or already taken.
    pub fn from_cases(cases: impl IntoIterator<Item = TestCase>) -> Self {
        let mut suite = Self::new();
        for case in cases {
            suite.add(case);
        }
        suite
    }

    /// Append a case, assigning a fresh `TC_nnn` id on a missing or
    /// duplicate id. Returns the id the case was stored under.
    pub fn add(&mut self, mut case: TestCase) -> String {
        if case.id.trim().is_empty() || self.contains(&case.id) {
            case.id = self.next_id();
        }
        let id = case.id.clone();
        self.cases.push(case);
        id
    }

    /// Next free id of the form `TC_nnn`, starting after the current size.
    pub fn next_id(&self) -> String {
        let mut n = self.cases.len() + 1;
        loop {
            let candidate = format!("TC_{:03}", n);
            if !self.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cases.iter().any(|c| c.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TestCase> {
        self.cases.iter_mut().find(|c| c.id == id)
    }

    /// Remove every case whose id is listed. Returns how many were dropped.
    pub fn remove_ids<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        let before = self.cases.len();
        self.cases
            .retain(|c| !ids.iter().any(|id| id.as_ref() == c.id));
        before - self.cases.len()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestCase> {
        self.cases.iter()
    }

    pub fn as_slice(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn ids(&self) -> Vec<String> {
        self.cases.iter().map(|c| c.id.clone()).collect()
    }

    pub fn summary(&self) -> TestSummary {
        let mut summary = TestSummary::default();
        for case in &self.cases {
            match case.priority {
                Priority::High => summary.high_priority += 1,
                Priority::Medium => summary.medium_priority += 1,
                Priority::Low => summary.low_priority += 1,
            }
            match case.test_type {
                TestType::Functional => summary.functional += 1,
                TestType::Ui => summary.ui += 1,
                TestType::Integration => summary.integration += 1,
            }
        }
        summary
    }
}

/// A generated, versioned unit of executable test source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestArtifact {
    /// File name on disk.
    pub name: String,
    pub path: PathBuf,
    /// Source without the generated file header.
    pub code: String,
    pub version: u32,
    pub source_case_ids: Vec<String>,
    pub correction_attempts: usize,
    /// Artifact this one was derived from, for critique revisions.
    pub parent: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl TestArtifact {
    pub fn new(path: PathBuf, code: String, source_case_ids: Vec<String>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            name,
            path,
            code,
            version: 1,
            source_case_ids,
            correction_attempts: 0,
            parent: None,
            created_at: Utc::now(),
        }
    }

    /// Derive the next version of this artifact stored at `path`.
    pub fn revise(&self, path: PathBuf, code: String) -> Self {
        let mut next = Self::new(path, code, self.source_case_ids.clone());
        next.version = self.version + 1;
        next.parent = Some(self.path.clone());
        next
    }
}

/// Status of a single executed test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Error,
}

impl TestStatus {
    /// Parse a pytest status token such as `PASSED`.
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "PASSED" => Some(Self::Passed),
            "FAILED" => Some(Self::Failed),
            "SKIPPED" => Some(Self::Skipped),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-test record inside an execution report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub name: String,
    pub status: TestStatus,
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TestRecord {
    pub fn new(name: impl Into<String>, status: TestStatus) -> Self {
        Self {
            name: name.into(),
            status,
            passed: status == TestStatus::Passed,
            duration: None,
            error: None,
        }
    }

    /// Function name without the `file::` prefix.
    pub fn display_name(&self) -> &str {
        self.name.rsplit("::").next().unwrap_or(&self.name)
    }
}

/// Overall result of one execution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    Error,
}

impl Outcome {
    /// Map a pytest exit status. Only `1` means tests ran and some failed;
    /// interruption, internal and usage errors, an empty collection and
    /// signals are all execution errors.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => Self::Passed,
            1 => Self::Failed,
            _ => Self::Error,
        }
    }
}

/// Files produced by the runner's evidence hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Evidence {
    pub evidence_dir: PathBuf,
    pub video_dir: Option<PathBuf>,
    pub video_files: Vec<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

/// Result of one execution-runner invocation. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub id: Uuid,
    pub test_file: PathBuf,
    pub outcome: Outcome,
    pub tests: Vec<TestRecord>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// `-1` when the process never produced an exit status.
    pub exit_code: i32,
    pub duration_secs: f64,
    pub started_at: DateTime<Utc>,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
    pub evidence: Evidence,
}

impl ExecutionReport {
    /// A report for a run that never completed (timeout, spawn failure).
    pub fn errored(
        test_file: PathBuf,
        started_at: DateTime<Utc>,
        duration_secs: f64,
        error: impl Into<String>,
        evidence: Evidence,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            test_file,
            outcome: Outcome::Error,
            tests: Vec::new(),
            total: 0,
            passed: 0,
            failed: 0,
            exit_code: -1,
            duration_secs,
            started_at,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error.into()),
            evidence,
        }
    }

    pub fn success(&self) -> bool {
        self.outcome == Outcome::Passed
    }

    pub fn summary(&self) -> String {
        format!(
            "Executed {} tests: {} passed, {} failed",
            self.total, self.passed, self.failed
        )
    }

    pub fn failed_tests(&self) -> impl Iterator<Item = &TestRecord> {
        self.tests.iter().filter(|t| !t.passed)
    }

    /// Number of passing tests among the per-test records.
    pub fn passed_records(&self) -> usize {
        self.tests.iter().filter(|t| t.passed).count()
    }
}

/// One round of the self-correction loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionAttempt {
    #[serde(rename = "attempt")]
    pub attempt_number: usize,
    #[serde(rename = "issues")]
    pub issues_found: Vec<String>,
    pub resolved: bool,
}
