//! Artifact persistence.
//!
//! Every artifact lands in the workspace under a timestamped,
//! domain-derived name and is never overwritten:
//!
//! ```text
//! <root>/
//! ├── output/
//! │   ├── page_model_<domain>_<ts>.json
//! │   ├── test_cases_<domain>_<ts>.json
//! │   └── execution_report_<domain>_<ts>.json
//! ├── tests/
//! │   ├── __init__.py
//! │   ├── test_<url>_<ts>.py
//! │   └── test_<url>_<ts>_refactored_<ts>.py
//! └── evidence/          # written by the runner's hooks
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::model::{ExecutionReport, PageModel, TestSuite};

const MAX_SLUG_LEN: usize = 30;

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\-]").expect("valid regex"));

/// Filename-safe domain of a URL: `https://www.shop.example.com/x` becomes
/// `shop_example_com`.
pub fn domain_slug(url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let slug: String = host
        .replace("www.", "")
        .replace(['.', ':'], "_")
        .chars()
        .take(MAX_SLUG_LEN)
        .collect();
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}

/// Filename-safe form of a whole URL, used for generated test files.
pub fn url_slug(url: &str) -> String {
    let trimmed = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let cleaned = UNSAFE_CHARS.replace_all(trimmed, "_");
    cleaned.chars().take(MAX_SLUG_LEN).collect()
}

/// Timestamp used in artifact names.
pub fn file_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// A file found in one of the store's directories.
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub name: String,
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
}

/// Writes pipeline artifacts to disk and reports their paths.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn tests_dir(&self) -> PathBuf {
        self.root.join("tests")
    }

    pub fn evidence_dir(&self) -> PathBuf {
        self.root.join("evidence")
    }

    /// Persist an explored page model.
    pub fn save_page_model(&self, model: &PageModel) -> CoreResult<PathBuf> {
        let document = json!({
            "metadata": {
                "url": model.url,
                "timestamp": Local::now().to_rfc3339(),
                "title": model.page_metadata.title,
                "type": model.page_metadata.page_type,
                "complexity": model.page_metadata.complexity,
            },
            "elements": model.elements,
            "userFlows": model.user_flows,
            "raw_dom": model.raw_dom,
            "pageMetadata": model.page_metadata,
        });
        let stem = format!("page_model_{}_{}", domain_slug(&model.url), file_timestamp());
        let path = self.write_json(&self.output_dir(), &stem, &document)?;
        info!("Page model saved to: {}", path.display());
        Ok(path)
    }

    /// Persist a designed test plan.
    pub fn save_test_cases(&self, cases: &TestSuite, model: &PageModel) -> CoreResult<PathBuf> {
        let document = json!({
            "metadata": {
                "url": model.url,
                "timestamp": Local::now().to_rfc3339(),
                "total_test_cases": cases.len(),
                "page_title": model.page_metadata.title,
                "page_type": model.page_metadata.page_type,
            },
            "test_cases": cases,
            "summary": cases.summary(),
        });
        let stem = format!("test_cases_{}_{}", domain_slug(&model.url), file_timestamp());
        let path = self.write_json(&self.output_dir(), &stem, &document)?;
        info!("Test cases saved to: {}", path.display());
        Ok(path)
    }

    /// Persist an execution report.
    pub fn save_execution_report(&self, report: &ExecutionReport, url: &str) -> CoreResult<PathBuf> {
        let finished_at =
            report.started_at + chrono::Duration::milliseconds((report.duration_secs * 1000.0) as i64);
        let document = json!({
            "timestamp": finished_at.to_rfc3339(),
            "test_file": report.test_file,
            "outcome": report.outcome,
            "execution": {
                "success": report.success(),
                "duration": report.duration_secs,
                "exit_code": report.exit_code,
            },
            "tests": {
                "total": report.total,
                "passed": report.passed,
                "failed": report.failed,
                "details": report.tests,
            },
            "evidence": {
                "video_dir": report.evidence.video_dir,
                "video_files": report.evidence.video_files,
                "log_file": report.evidence.log_file,
            },
        });
        let stem = format!("execution_report_{}_{}", domain_slug(url), file_timestamp());
        let path = self.write_json(&self.output_dir(), &stem, &document)?;
        debug!("Execution report saved to: {}", path.display());
        Ok(path)
    }

    /// Create the tests directory as a Python package.
    pub fn ensure_tests_dir(&self) -> CoreResult<PathBuf> {
        let dir = self.tests_dir();
        fs::create_dir_all(&dir)?;
        let init = dir.join("__init__.py");
        if !init.exists() {
            fs::write(&init, "# Auto-generated test package\n")?;
        }
        Ok(dir)
    }

    /// Write generated test code with a descriptive header.
    pub fn save_test_file(&self, code: &str, model: &PageModel) -> CoreResult<PathBuf> {
        let dir = self.ensure_tests_dir()?;
        let stem = format!("test_{}_{}", url_slug(&model.url), file_timestamp());
        let path = unique_path(&dir, &stem, "py");
        let filename = file_name(&path);
        let header = format!(
            r#""""
Auto-generated Playwright Test
Generated on: {generated}
Target URL: {url}
Page Type: {page_type}

To run this test:
    pytest {filename}

Or with Playwright:
    python -m pytest {filename} --headed
"""

"#,
            generated = Local::now().format("%Y-%m-%d %H:%M:%S"),
            url = model.url,
            page_type = model.page_metadata.page_type,
        );
        fs::write(&path, format!("{}{}", header, code))?;
        info!("Test file saved: {}", path.display());
        Ok(path)
    }

    /// Write a revision of `original` next to it, never overwriting it.
    pub fn save_refactored(&self, code: &str, original: &Path) -> CoreResult<PathBuf> {
        let dir = match original.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => self.ensure_tests_dir()?,
        };
        fs::create_dir_all(&dir)?;
        let original_stem = original
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "test_refactored".to_string());
        let stem = format!("{}_refactored_{}", original_stem, file_timestamp());
        let path = unique_path(&dir, &stem, "py");
        let filename = file_name(&path);
        let header = format!(
            r#""""
Refactored Playwright Test
Original: {original}
Refactored on: {refactored}

To run this test:
    pytest {filename} --headed
"""

"#,
            original = file_name(original),
            refactored = Local::now().format("%Y-%m-%d %H:%M:%S"),
        );
        fs::write(&path, format!("{}{}", header, code))?;
        info!("Refactored code saved to: {}", path.display());
        Ok(path)
    }

    pub fn read_test_file(&self, path: &Path) -> CoreResult<String> {
        if !path.exists() {
            return Err(CoreError::ArtifactNotFound(path.display().to_string()));
        }
        Ok(fs::read_to_string(path)?)
    }

    /// Generated test files, newest first.
    pub fn list_test_files(&self) -> CoreResult<Vec<StoredFile>> {
        let dir = self.tests_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !(name.starts_with("test_") && name.ends_with(".py")) {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            files.push(StoredFile {
                name,
                path: entry.path(),
                modified: DateTime::<Utc>::from(modified),
            });
        }
        files.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(files)
    }

    fn write_json(&self, dir: &Path, stem: &str, value: &serde_json::Value) -> CoreResult<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = unique_path(dir, stem, "json");
        fs::write(&path, serde_json::to_string_pretty(value)?)?;
        Ok(path)
    }
}

/// `dir/stem.ext`, or `dir/stem_N.ext` when that name is already taken.
fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let candidate = dir.join(format!("{}.{}", stem, ext));
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 1;
    loop {
        let candidate = dir.join(format!("{}_{}.{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
