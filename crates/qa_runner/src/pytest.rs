//! pytest-backed test runner.
//!
//! Batch mode waits for the process and parses its captured output. Streaming
//! mode reads stdout on a separate task that forwards lines through a
//! one-slot channel, so per-test events go out as soon as pytest prints them.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use qa_core::{Evidence, ExecutionReport, Outcome, TestRecord};

use crate::config::RunnerConfig;
use crate::error::RunnerResult;
use crate::evidence;
use crate::output::{self, ResultMatcher};
use crate::runner::{RunEvent, RunSummary, TestRunner};
use crate::conftest;

pub struct PytestRunner {
    config: RunnerConfig,
}

/// Raw facts about a finished process, before evidence is merged in.
struct Finished {
    exit_code: i32,
    stdout: String,
    stderr: String,
    parsed: Vec<TestRecord>,
}

impl PytestRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn timeout_message(&self) -> String {
        format!(
            "Test execution timed out after {} seconds",
            self.config.timeout_seconds
        )
    }

    fn spawn(&self, test_file: &Path) -> std::io::Result<Child> {
        let args = self.config.pytest_args(test_file);
        let (key, value) = self.config.headless_env();
        info!(
            command = %format!("{} {}", self.config.python, args.join(" ")),
            headless = self.config.headless,
            "Running tests"
        );
        Command::new(&self.config.python)
            .args(&args)
            .current_dir(&self.config.working_dir)
            .env(key, value)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }

    fn prepare(&self) -> RunnerResult<()> {
        conftest::ensure(&self.config.tests_dir, &self.config.evidence_dir)?;
        Ok(())
    }

    fn errored(
        &self,
        test_file: &Path,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        message: String,
    ) -> ExecutionReport {
        let evidence = Evidence {
            evidence_dir: self.config.evidence_dir.clone(),
            log_file: evidence::latest_log(&self.config.evidence_dir),
            ..Default::default()
        };
        ExecutionReport::errored(
            test_file.to_path_buf(),
            started_at,
            elapsed.as_secs_f64(),
            message,
            evidence,
        )
    }

    /// Merge process output with the hook report; a fresh hook report wins.
    fn build_report(
        &self,
        test_file: &Path,
        started_at: DateTime<Utc>,
        since: SystemTime,
        elapsed: Duration,
        finished: Finished,
    ) -> ExecutionReport {
        let (evidence, hook_report) = evidence::collect(&self.config.evidence_dir, since);

        let (tests, total, passed, failed) = match hook_report {
            Some(report) => {
                let details = if report.tests.details.is_empty() {
                    finished.parsed
                } else {
                    report.tests.details
                };
                (details, report.tests.total, report.tests.passed, report.tests.failed)
            }
            None => {
                let passed = finished.parsed.iter().filter(|t| t.passed).count();
                let total = finished.parsed.len();
                (finished.parsed, total, passed, total - passed)
            }
        };

        let report = ExecutionReport {
            id: Uuid::new_v4(),
            test_file: test_file.to_path_buf(),
            outcome: Outcome::from_exit_code(finished.exit_code),
            tests,
            total,
            passed,
            failed,
            exit_code: finished.exit_code,
            duration_secs: elapsed.as_secs_f64(),
            started_at,
            stdout: finished.stdout,
            stderr: finished.stderr,
            error: exit_reason(finished.exit_code),
            evidence,
        };
        info!(
            exit_code = report.exit_code,
            passed = report.passed,
            total = report.total,
            videos = report.evidence.video_files.len(),
            duration_secs = format!("{:.2}", report.duration_secs),
            "Test run finished"
        );
        report
    }
}

#[async_trait]
impl TestRunner for PytestRunner {
    async fn run(&self, test_file: &Path) -> RunnerResult<ExecutionReport> {
        self.prepare()?;
        let started_at = Utc::now();
        let since = SystemTime::now();
        let start = Instant::now();

        let child = match self.spawn(test_file) {
            Ok(child) => child,
            Err(e) => {
                error!(error = %e, "Failed to start pytest");
                return Ok(self.errored(test_file, started_at, start.elapsed(), e.to_string()));
            }
        };

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!(error = %e, "pytest process failed");
                return Ok(self.errored(test_file, started_at, start.elapsed(), e.to_string()));
            }
            Err(_) => {
                error!(timeout_secs = self.config.timeout_seconds, "Test execution timed out");
                return Ok(self.errored(
                    test_file,
                    started_at,
                    start.elapsed(),
                    self.timeout_message(),
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let finished = Finished {
            exit_code: output.status.code().unwrap_or(-1),
            parsed: output::parse_results(&stdout),
            stdout,
            stderr,
        };
        Ok(self.build_report(test_file, started_at, since, start.elapsed(), finished))
    }

    async fn run_streaming(
        &self,
        test_file: &Path,
        events: mpsc::Sender<RunEvent>,
    ) -> RunnerResult<ExecutionReport> {
        // A closed receiver only means the caller stopped listening.
        let emit = |event: RunEvent| {
            let events = events.clone();
            async move {
                if events.send(event).await.is_err() {
                    debug!("Event receiver dropped");
                }
            }
        };

        emit(RunEvent::Start {
            test_file: test_file.to_path_buf(),
        })
        .await;

        if let Err(e) = self.prepare() {
            emit(RunEvent::error(e.to_string())).await;
            return Err(e);
        }

        let started_at = Utc::now();
        let since = SystemTime::now();
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.config.timeout_seconds);

        let mut child = match self.spawn(test_file) {
            Ok(child) => child,
            Err(e) => {
                error!(error = %e, "Failed to start pytest");
                emit(RunEvent::error(e.to_string())).await;
                return Ok(self.errored(test_file, started_at, start.elapsed(), e.to_string()));
            }
        };

        let (line_tx, mut line_rx) = mpsc::channel::<String>(1);
        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line_tx.send(line).await.is_err() {
                        break;
                    }
                }
            })
        });
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut matcher = ResultMatcher::new();
        let mut stdout = String::new();
        let mut timed_out = false;
        loop {
            match tokio::time::timeout_at(deadline, line_rx.recv()).await {
                Ok(Some(line)) => {
                    debug!(target: "pytest", "{}", line);
                    if let Some(record) = matcher.observe(&line) {
                        emit(RunEvent::test_result(&record)).await;
                    }
                    stdout.push_str(&line);
                    stdout.push('\n');
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }

        let status = if timed_out {
            None
        } else {
            tokio::time::timeout_at(deadline, child.wait()).await.ok()
        };

        let exit_code = match status {
            Some(Ok(status)) => status.code().unwrap_or(-1),
            Some(Err(e)) => {
                error!(error = %e, "pytest process failed");
                emit(RunEvent::error(e.to_string())).await;
                return Ok(self.errored(test_file, started_at, start.elapsed(), e.to_string()));
            }
            None => {
                warn!(timeout_secs = self.config.timeout_seconds, "Streaming run timed out");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill pytest");
                }
                if let Some(task) = stdout_task {
                    task.abort();
                }
                let message = self.timeout_message();
                emit(RunEvent::error(message.clone())).await;
                return Ok(self.errored(test_file, started_at, start.elapsed(), message));
            }
        };

        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        let finished = Finished {
            exit_code,
            parsed: output::parse_results(&stdout),
            stdout,
            stderr,
        };
        let report = self.build_report(test_file, started_at, since, start.elapsed(), finished);
        emit(RunEvent::Complete(RunSummary::from_report(&report))).await;
        Ok(report)
    }

    fn evidence_dir(&self) -> &Path {
        &self.config.evidence_dir
    }
}

/// Why pytest stopped, for exit statuses other than a pass or test failures.
fn exit_reason(code: i32) -> Option<String> {
    let reason = match code {
        0 | 1 => return None,
        2 => "Test execution was interrupted, usually by a collection error",
        3 => "pytest hit an internal error",
        4 => "pytest was invoked incorrectly",
        5 => "No tests were collected",
        _ => "pytest exited abnormally",
    };
    Some(format!("{} (exit code {})", reason, code))
}

