//! Test runner trait and streaming event types.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use qa_core::{ExecutionReport, TestRecord, TestStatus};

use crate::error::RunnerResult;

/// Aggregate data carried by the `complete` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub success: bool,
    pub duration: f64,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
    pub video_files: Vec<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub evidence_dir: PathBuf,
    pub report_path: Option<PathBuf>,
    pub test_details: Vec<TestRecord>,
}

impl RunSummary {
    pub fn from_report(report: &ExecutionReport) -> Self {
        Self {
            success: report.success(),
            duration: report.duration_secs,
            passed: report.passed,
            failed: report.failed,
            total: report.total,
            video_files: report.evidence.video_files.clone(),
            log_file: report.evidence.log_file.clone(),
            evidence_dir: report.evidence.evidence_dir.clone(),
            report_path: report.evidence.report_path.clone(),
            test_details: report.tests.clone(),
        }
    }
}

/// One event of a streaming run, serialized as `{"event": .., "data": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RunEvent {
    Start {
        test_file: PathBuf,
    },
    TestResult {
        name: String,
        status: TestStatus,
        passed: bool,
        display_name: String,
    },
    Complete(RunSummary),
    Error {
        error: String,
    },
}

impl RunEvent {
    pub fn test_result(record: &TestRecord) -> Self {
        Self::TestResult {
            name: record.name.clone(),
            status: record.status,
            passed: record.passed,
            display_name: record.display_name().to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error { .. })
    }
}

/// Executes generated test files.
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Run to completion and return one report.
    async fn run(&self, test_file: &Path) -> RunnerResult<ExecutionReport>;

    /// Run while forwarding per-test events as output arrives.
    ///
    /// Emits `start` first and exactly one of `complete` or `error` last. The
    /// returned report is the same one the `complete` event summarizes.
    async fn run_streaming(
        &self,
        test_file: &Path,
        events: mpsc::Sender<RunEvent>,
    ) -> RunnerResult<ExecutionReport>;

    /// Where this runner's evidence hooks write their files.
    fn evidence_dir(&self) -> &Path;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let record = TestRecord::new("test_demo.py::test_login", TestStatus::Passed);
        let value = serde_json::to_value(RunEvent::test_result(&record)).unwrap();
        assert_eq!(value["event"], "test_result");
        assert_eq!(value["data"]["status"], "passed");
        assert_eq!(value["data"]["passed"], true);
        assert_eq!(value["data"]["display_name"], "test_login");

        let value = serde_json::to_value(RunEvent::error("boom")).unwrap();
        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["error"], "boom");
    }

    #[test]
    fn test_terminal_events() {
        assert!(RunEvent::error("x").is_terminal());
        assert!(!RunEvent::Start {
            test_file: PathBuf::from("t.py")
        }
        .is_terminal());
    }
}
