//! User-facing view of an execution report.

use std::path::PathBuf;

use serde::Serialize;

use qa_core::{ExecutionReport, Outcome};

const STDOUT_PREVIEW: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTest {
    pub name: String,
    pub status: String,
    pub duration: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEvidence {
    pub video_files: Vec<PathBuf>,
    pub evidence_dir: PathBuf,
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionDetails {
    pub duration: f64,
    pub return_code: i32,
    pub stdout_preview: String,
}

/// Verification summary with issues and follow-up recommendations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub status: Outcome,
    pub summary: String,
    pub tests: Vec<ReportTest>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub evidence: ReportEvidence,
    pub execution_details: ExecutionDetails,
}

impl VerificationReport {
    pub fn from_execution(report: &ExecutionReport) -> Self {
        let tests = report
            .tests
            .iter()
            .map(|t| ReportTest {
                name: t.name.clone(),
                status: t.status.as_str().to_string(),
                duration: t.duration,
                error: t.error.clone(),
            })
            .collect();

        let mut issues: Vec<String> = report
            .failed_tests()
            .map(|t| {
                t.error
                    .clone()
                    .unwrap_or_else(|| format!("{} failed", t.name))
            })
            .collect();
        if let Some(error) = &report.error {
            issues.push(error.clone());
        }

        let mut recommendations = Vec::new();
        if report.failed > 0 {
            recommendations.extend(
                [
                    "Review failed tests and use the critique feature to refactor",
                    "Check element locators - they may have changed",
                    "Add explicit waits for dynamic elements",
                ]
                .map(String::from),
            );
        }
        if !report.evidence.video_files.is_empty() {
            recommendations.push(format!(
                "Review video evidence at: {}",
                report.evidence.evidence_dir.display()
            ));
        }

        Self {
            status: report.outcome,
            summary: report.summary(),
            tests,
            issues,
            recommendations,
            evidence: ReportEvidence {
                video_files: report.evidence.video_files.clone(),
                evidence_dir: report.evidence.evidence_dir.clone(),
                report_path: report.evidence.report_path.clone(),
            },
            execution_details: ExecutionDetails {
                duration: report.duration_secs,
                return_code: report.exit_code,
                stdout_preview: report.stdout.chars().take(STDOUT_PREVIEW).collect(),
            },
        }
    }
}
