//! Integration tests for the pytest runner.
//!
//! A shell script stands in for the Python interpreter, so these tests
//! exercise process handling, parsing and evidence without pytest installed.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use qa_core::{Outcome, TestStatus};
use qa_runner::{PytestRunner, RunEvent, RunnerConfig, TestRunner};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn fake_python(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-python");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn runner_for(temp: &TempDir, body: &str) -> (PytestRunner, PathBuf) {
    let python = fake_python(temp.path(), body);
    let config = RunnerConfig::for_workspace(temp.path())
        .python(python.to_string_lossy())
        .timeout(5);
    let test_file = config.tests_dir.join("test_demo.py");
    fs::create_dir_all(&config.tests_dir).unwrap();
    fs::write(&test_file, "def test_one(page):\n    pass\n").unwrap();
    (PytestRunner::new(config), test_file)
}

const MIXED_OUTPUT: &str = r#"
echo "tests/test_demo.py::test_one PASSED [ 50%]"
echo "tests/test_demo.py::test_one PASSED [ 50%]"
echo "tests/test_demo.py::test_two FAILED [100%]"
echo "=========== short test summary info ==========="
echo "FAILED tests/test_demo.py::test_two - AssertionError: boom"
echo "=========== 1 failed, 1 passed ==========="
exit 1
"#;

#[tokio::test]
async fn test_batch_run_parses_results() {
    let temp = TempDir::new().unwrap();
    let (runner, test_file) = runner_for(&temp, MIXED_OUTPUT);

    let report = runner.run(&test_file).await.unwrap();

    assert_eq!(report.exit_code, 1);
    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.tests.len(), 2);
    assert_eq!(report.summary(), "Executed 2 tests: 1 passed, 1 failed");
    assert_eq!(report.tests[1].status, TestStatus::Failed);
    assert_eq!(report.tests[1].error.as_deref(), Some("AssertionError: boom"));
    assert!(temp.path().join("tests/conftest.py").exists());
}

#[tokio::test]
async fn test_collection_error_is_an_execution_error() {
    let temp = TempDir::new().unwrap();
    let (runner, test_file) = runner_for(
        &temp,
        r#"echo "ERROR tests/test_demo.py - SyntaxError: invalid syntax"
echo "!!!!!!! Interrupted: 1 error during collection !!!!!!!"
exit 2"#,
    );

    let report = runner.run(&test_file).await.unwrap();

    assert_eq!(report.exit_code, 2);
    assert_eq!(report.outcome, Outcome::Error);
    assert!(!report.success());
    assert!(report.tests.is_empty());
    assert_eq!(
        report.error.as_deref(),
        Some("Test execution was interrupted, usually by a collection error (exit code 2)")
    );
}

#[tokio::test]
async fn test_batch_run_passes_headless_flag() {
    let temp = TempDir::new().unwrap();
    let (runner, test_file) = runner_for(
        &temp,
        r#"echo "tests/test_demo.py::test_env PASSED headless=$PLAYWRIGHT_HEADLESS""#,
    );

    let report = runner.run(&test_file).await.unwrap();
    assert_eq!(report.outcome, Outcome::Passed);
    assert!(report.stdout.contains("headless=true"));
}

#[tokio::test]
async fn test_streaming_emits_one_result_per_test() {
    let temp = TempDir::new().unwrap();
    let (runner, test_file) = runner_for(&temp, MIXED_OUTPUT);
    let (tx, mut rx) = mpsc::channel(32);

    let report = runner.run_streaming(&test_file, tx).await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(RunEvent::Start { .. })));
    let names: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::TestResult { display_name, .. } => Some(display_name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["test_one", "test_two"]);

    match events.last() {
        Some(RunEvent::Complete(summary)) => {
            assert!(!summary.success);
            assert_eq!(summary.total, 2);
            assert_eq!(summary.passed, 1);
        }
        other => panic!("expected complete event, got {:?}", other),
    }
    assert_eq!(report.total, 2);
}

#[tokio::test]
async fn test_hook_report_takes_precedence() {
    let temp = TempDir::new().unwrap();
    let evidence = temp.path().join("evidence");
    let body = format!(
        r#"mkdir -p "{dir}/20260101_000000"
echo video > "{dir}/20260101_000000/test_one.webm"
cat > "{dir}/report_20260101_000000.json" <<'JSON'
{{"execution": {{"success": true, "duration": 1.0, "exit_code": 0}},
 "tests": {{"total": 3, "passed": 3, "failed": 0,
  "details": [{{"name": "tests/test_demo.py::test_one", "status": "passed", "passed": true, "duration": 0.2, "error": null}}]}},
 "evidence": {{"video_files": [], "log_file": null}}}}
JSON
echo "tests/test_demo.py::test_one PASSED"
exit 0"#,
        dir = evidence.display()
    );
    let (runner, test_file) = runner_for(&temp, &body);

    let report = runner.run(&test_file).await.unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.passed, 3);
    assert_eq!(report.tests[0].duration, Some(0.2));
    assert_eq!(report.evidence.video_files.len(), 1);
    assert!(report.evidence.report_path.is_some());
}

#[tokio::test]
async fn test_timeout_yields_error_report() {
    let temp = TempDir::new().unwrap();
    let (runner, test_file) = runner_for(&temp, "sleep 10");
    let runner = PytestRunner::new(runner.config().clone().timeout(1));

    let report = runner.run(&test_file).await.unwrap();

    assert_eq!(report.outcome, Outcome::Error);
    assert_eq!(report.exit_code, -1);
    assert_eq!(report.total, 0);
    assert_eq!(
        report.error.as_deref(),
        Some("Test execution timed out after 1 seconds")
    );
}

#[tokio::test]
async fn test_streaming_timeout_emits_error_event() {
    let temp = TempDir::new().unwrap();
    let (runner, test_file) = runner_for(&temp, "echo started\nsleep 10");
    let runner = PytestRunner::new(runner.config().clone().timeout(1));
    let (tx, mut rx) = mpsc::channel(8);

    let report = runner.run_streaming(&test_file, tx).await.unwrap();
    assert_eq!(report.outcome, Outcome::Error);

    let mut last = None;
    while let Some(event) = rx.recv().await {
        last = Some(event);
    }
    assert!(matches!(last, Some(RunEvent::Error { .. })));
}

#[tokio::test]
async fn test_missing_interpreter_yields_error_report() {
    let temp = TempDir::new().unwrap();
    let config = RunnerConfig::for_workspace(temp.path()).python("/nonexistent/python-qa");
    let runner = PytestRunner::new(config);

    let report = runner
        .run(&temp.path().join("tests/test_missing.py"))
        .await
        .unwrap();
    assert_eq!(report.outcome, Outcome::Error);
    assert!(report.error.is_some());
}
