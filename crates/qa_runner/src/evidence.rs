//! Evidence written by the pytest hooks: session videos, logs and JSON reports.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use qa_core::{Evidence, TestRecord};

/// `execution` block of a hook report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportExecution {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub exit_code: i32,
}

/// `tests` block of a hook report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportTests {
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub passed: usize,
    #[serde(default)]
    pub failed: usize,
    #[serde(default)]
    pub details: Vec<TestRecord>,
}

/// `evidence` block of a hook report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportEvidence {
    #[serde(default)]
    pub video_dir: Option<PathBuf>,
    #[serde(default)]
    pub video_files: Vec<PathBuf>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// The `report_<ts>.json` file the session-finish hook writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookReport {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub execution: ReportExecution,
    #[serde(default)]
    pub tests: ReportTests,
    #[serde(default)]
    pub evidence: ReportEvidence,
}

/// A file listed by [`list_evidence`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceFile {
    pub name: String,
    pub path: PathBuf,
    pub relative_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceListing {
    pub videos: Vec<EvidenceFile>,
    pub reports: Vec<EvidenceFile>,
    pub evidence_dir: PathBuf,
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Newest file in `dir` matching a glob pattern such as `report_*.json`.
fn newest_match(dir: &Path, pattern: &str) -> Option<PathBuf> {
    let full = dir.join(pattern);
    let paths = glob::glob(&full.to_string_lossy()).ok()?;
    paths
        .filter_map(Result::ok)
        .filter_map(|p| modified(&p).map(|t| (t, p)))
        .max_by_key(|(t, _)| *t)
        .map(|(_, p)| p)
}

/// The newest hook report written at or after `since`.
pub fn latest_report(evidence_dir: &Path, since: SystemTime) -> Option<(PathBuf, HookReport)> {
    let path = newest_match(evidence_dir, "report_*.json")?;
    if modified(&path)? < since {
        debug!(path = %path.display(), "Ignoring hook report from an earlier run");
        return None;
    }
    let content = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&content) {
        Ok(report) => Some((path, report)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable hook report");
            None
        }
    }
}

/// Newest session subdirectory and the videos inside it.
pub fn latest_session_videos(evidence_dir: &Path) -> (Option<PathBuf>, Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(evidence_dir) else {
        return (None, Vec::new());
    };
    let newest = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter_map(|p| modified(&p).map(|t| (t, p)))
        .max_by_key(|(t, _)| *t)
        .map(|(_, p)| p);

    let Some(dir) = newest else {
        return (None, Vec::new());
    };
    let mut videos: Vec<PathBuf> = glob::glob(&dir.join("*.webm").to_string_lossy())
        .map(|paths| paths.filter_map(Result::ok).collect())
        .unwrap_or_default();
    videos.sort();
    (Some(dir), videos)
}

pub fn latest_log(evidence_dir: &Path) -> Option<PathBuf> {
    newest_match(evidence_dir, "test_execution_*.log")
}

/// Gather evidence for a run that started at `since`.
pub fn collect(evidence_dir: &Path, since: SystemTime) -> (Evidence, Option<HookReport>) {
    let (video_dir, video_files) = latest_session_videos(evidence_dir);
    let report = latest_report(evidence_dir, since);
    let evidence = Evidence {
        evidence_dir: evidence_dir.to_path_buf(),
        video_dir,
        video_files,
        log_file: latest_log(evidence_dir),
        report_path: report.as_ref().map(|(p, _)| p.clone()),
    };
    debug!(
        videos = evidence.video_files.len(),
        has_report = evidence.report_path.is_some(),
        "Collected evidence"
    );
    (evidence, report.map(|(_, r)| r))
}

/// Every video and JSON report under the evidence directory.
pub fn list_evidence(evidence_dir: &Path) -> EvidenceListing {
    let mut videos = Vec::new();
    let mut reports = Vec::new();

    for entry in WalkDir::new(evidence_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let relative_path = path
            .strip_prefix(evidence_dir)
            .unwrap_or(path)
            .to_path_buf();
        let name = entry.file_name().to_string_lossy().to_string();
        match path.extension().and_then(|e| e.to_str()) {
            Some("webm") => videos.push(EvidenceFile {
                name,
                path: path.to_path_buf(),
                relative_path,
                size: entry.metadata().ok().map(|m| m.len()),
            }),
            Some("json") => reports.push(EvidenceFile {
                name,
                path: path.to_path_buf(),
                relative_path,
                size: None,
            }),
            _ => {}
        }
    }

    EvidenceListing {
        videos,
        reports,
        evidence_dir: evidence_dir.to_path_buf(),
    }
}
