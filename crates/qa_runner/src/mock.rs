//! Mock runner and inspector for testing.
//!
//! Both capture every call and answer from a scripted list, so pipeline
//! tests never spawn a browser or a Python process.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use qa_core::{DomSnapshot, Evidence, ExecutionReport, Outcome, TestRecord, TestStatus};

use crate::error::{RunnerError, RunnerResult};
use crate::inspector::PageInspector;
use crate::runner::{RunEvent, RunSummary, TestRunner};

/// Scripted outcome of one mock run.
#[derive(Debug, Clone)]
pub struct MockRun {
    pub tests: Vec<TestRecord>,
    pub exit_code: i32,
    pub stdout: String,
    /// Lines replayed to streaming callers; may repeat test names.
    pub output_lines: Vec<String>,
    pub timed_out: bool,
}

impl MockRun {
    /// One record per `(name, passed)` pair; exit code follows the failures.
    pub fn with_results(results: &[(&str, bool)]) -> Self {
        let tests: Vec<TestRecord> = results
            .iter()
            .map(|(name, passed)| {
                let status = if *passed {
                    TestStatus::Passed
                } else {
                    TestStatus::Failed
                };
                let mut record = TestRecord::new(format!("test_generated.py::{}", name), status);
                if !passed {
                    record.error = Some(format!("AssertionError in {}", name));
                }
                record
            })
            .collect();
        let output_lines: Vec<String> = tests
            .iter()
            .map(|t| format!("{} {}", t.name, t.status.as_str().to_uppercase()))
            .collect();
        let exit_code = if tests.iter().all(|t| t.passed) { 0 } else { 1 };
        Self {
            stdout: output_lines.join("\n"),
            tests,
            exit_code,
            output_lines,
            timed_out: false,
        }
    }

    pub fn timeout() -> Self {
        Self {
            tests: Vec::new(),
            exit_code: -1,
            stdout: String::new(),
            output_lines: Vec::new(),
            timed_out: true,
        }
    }

    pub fn with_output_lines(mut self, lines: Vec<String>) -> Self {
        self.output_lines = lines;
        self
    }
}

#[derive(Clone)]
pub struct MockRunner {
    runs: Arc<RwLock<Vec<MockRun>>>,
    run_index: Arc<AtomicUsize>,
    executed: Arc<RwLock<Vec<PathBuf>>>,
    evidence_dir: PathBuf,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(RwLock::new(Vec::new())),
            run_index: Arc::new(AtomicUsize::new(0)),
            executed: Arc::new(RwLock::new(Vec::new())),
            evidence_dir: PathBuf::from("evidence"),
        }
    }

    pub fn add_run(self, run: MockRun) -> Self {
        self.runs.write().push(run);
        self
    }

    pub fn evidence_dir_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.evidence_dir = dir.into();
        self
    }

    /// Test files executed so far, in order.
    pub fn executed(&self) -> Vec<PathBuf> {
        self.executed.read().clone()
    }

    pub fn run_count(&self) -> usize {
        self.executed.read().len()
    }

    /// Next scripted run; the last one repeats once the script is exhausted.
    fn next_run(&self) -> MockRun {
        let runs = self.runs.read();
        if runs.is_empty() {
            return MockRun::with_results(&[]);
        }
        let index = self.run_index.fetch_add(1, Ordering::SeqCst);
        runs[index.min(runs.len() - 1)].clone()
    }

    fn report(&self, test_file: &Path, run: MockRun) -> ExecutionReport {
        let evidence = Evidence {
            evidence_dir: self.evidence_dir.clone(),
            ..Default::default()
        };
        if run.timed_out {
            return ExecutionReport::errored(
                test_file.to_path_buf(),
                Utc::now(),
                600.0,
                "Test execution timed out after 600 seconds",
                evidence,
            );
        }
        let passed = run.tests.iter().filter(|t| t.passed).count();
        ExecutionReport {
            id: Uuid::new_v4(),
            test_file: test_file.to_path_buf(),
            outcome: Outcome::from_exit_code(run.exit_code),
            total: run.tests.len(),
            passed,
            failed: run.tests.len() - passed,
            tests: run.tests,
            exit_code: run.exit_code,
            duration_secs: 0.5,
            started_at: Utc::now(),
            stdout: run.stdout,
            stderr: String::new(),
            error: None,
            evidence,
        }
    }
}

#[async_trait]
impl TestRunner for MockRunner {
    async fn run(&self, test_file: &Path) -> RunnerResult<ExecutionReport> {
        self.executed.write().push(test_file.to_path_buf());
        let run = self.next_run();
        Ok(self.report(test_file, run))
    }

    async fn run_streaming(
        &self,
        test_file: &Path,
        events: mpsc::Sender<RunEvent>,
    ) -> RunnerResult<ExecutionReport> {
        self.executed.write().push(test_file.to_path_buf());
        let run = self.next_run();
        let _ = events
            .send(RunEvent::Start {
                test_file: test_file.to_path_buf(),
            })
            .await;

        let mut matcher = crate::output::ResultMatcher::new();
        for line in &run.output_lines {
            if let Some(record) = matcher.observe(line) {
                let _ = events.send(RunEvent::test_result(&record)).await;
            }
        }

        let report = self.report(test_file, run);
        let terminal = match &report.error {
            Some(error) => RunEvent::error(error.clone()),
            None => RunEvent::Complete(RunSummary::from_report(&report)),
        };
        let _ = events.send(terminal).await;
        Ok(report)
    }

    fn evidence_dir(&self) -> &Path {
        &self.evidence_dir
    }
}

/// Inspector returning a fixed snapshot or a scripted failure.
#[derive(Clone, Default)]
pub struct MockInspector {
    snapshot: Arc<RwLock<Option<DomSnapshot>>>,
    failure: Arc<RwLock<Option<String>>>,
    inspected: Arc<RwLock<Vec<String>>>,
}

impl MockInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(self, snapshot: DomSnapshot) -> Self {
        *self.snapshot.write() = Some(snapshot);
        self
    }

    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.failure.write() = Some(message.into());
        self
    }

    pub fn inspected(&self) -> Vec<String> {
        self.inspected.read().clone()
    }
}

#[async_trait]
impl PageInspector for MockInspector {
    async fn inspect(&self, url: &str) -> RunnerResult<DomSnapshot> {
        self.inspected.write().push(url.to_string());
        if let Some(message) = self.failure.read().clone() {
            return Err(RunnerError::Inspection(message));
        }
        let mut snapshot = self
            .snapshot
            .read()
            .clone()
            .unwrap_or_else(|| DomSnapshot::empty(url));
        snapshot.url = url.to_string();
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_run_counts() {
        let runner = MockRunner::new().add_run(MockRun::with_results(&[
            ("test_a", true),
            ("test_b", false),
        ]));
        let report = runner.run(Path::new("tests/test_x.py")).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.passed, 1);
        assert_eq!(report.outcome, Outcome::Failed);
        assert_eq!(runner.executed(), vec![PathBuf::from("tests/test_x.py")]);
    }

    #[tokio::test]
    async fn test_mock_streaming_dedupes_repeated_lines() {
        let run = MockRun::with_results(&[("test_a", true)]).with_output_lines(vec![
            "test_generated.py::test_a PASSED".to_string(),
            "test_generated.py::test_a PASSED".to_string(),
        ]);
        let runner = MockRunner::new().add_run(run);
        let (tx, mut rx) = mpsc::channel(16);
        runner.run_streaming(Path::new("t.py"), tx).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let results = events
            .iter()
            .filter(|e| matches!(e, RunEvent::TestResult { .. }))
            .count();
        assert_eq!(results, 1);
        assert!(matches!(events.first(), Some(RunEvent::Start { .. })));
        assert!(matches!(events.last(), Some(RunEvent::Complete(_))));
    }

    #[tokio::test]
    async fn test_mock_inspector() {
        let inspector = MockInspector::new().simulate_failure("browser crashed");
        assert!(inspector.inspect("https://a.test").await.is_err());
        assert_eq!(inspector.inspected(), vec!["https://a.test"]);
    }
}
