//! Page-structure extraction through a headless browser.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use qa_core::DomSnapshot;

use crate::error::{RunnerError, RunnerResult};

/// Extracts the raw interactive structure of a live page.
#[async_trait]
pub trait PageInspector: Send + Sync {
    async fn inspect(&self, url: &str) -> RunnerResult<DomSnapshot>;
}

const INSPECT_SCRIPT: &str = r#"
import json
import sys
from playwright.sync_api import sync_playwright

url = sys.argv[1]
headless = sys.argv[2] == "true"

ELEMENTS_JS = """() => {
    const elements = [];
    const selectors = ['button', 'input', 'select', 'textarea', 'a[href]',
                       '[role="button"]', '[onclick]', 'form'];
    selectors.forEach(selector => {
        document.querySelectorAll(selector).forEach(el => {
            try {
                const rect = el.getBoundingClientRect();
                if (rect.width > 0 && rect.height > 0) {
                    const text = el.innerText || el.textContent || '';
                    const cls = (typeof el.className === 'string') ? el.className : null;
                    elements.push({
                        tag: el.tagName.toLowerCase(),
                        type: el.type || el.getAttribute('role') || el.tagName.toLowerCase(),
                        id: el.id || null,
                        name: el.name || null,
                        className: cls,
                        text: text.substring(0, 50).trim() || null,
                        placeholder: el.placeholder || null,
                        href: el.href || null,
                        locator: el.id ? '#' + el.id :
                                 el.name ? '[name="' + el.name + '"]' :
                                 cls ? '.' + cls.split(' ')[0] :
                                 el.tagName.toLowerCase()
                    });
                }
            } catch (e) {}
        });
    });
    return elements;
}"""

FORMS_JS = """() => Array.from(document.querySelectorAll('form')).map(form => ({
    id: form.id || null,
    action: form.action || null,
    method: form.method || 'get',
    inputs: Array.from(form.querySelectorAll('input, select, textarea')).map(input => ({
        type: input.type || input.tagName.toLowerCase(),
        name: input.name || null,
        id: input.id || null,
        required: input.required || false
    }))
}))"""

with sync_playwright() as p:
    browser = p.chromium.launch(headless=headless)
    page = browser.new_page()
    try:
        page.goto(url, timeout=30000)
        page.wait_for_load_state("domcontentloaded", timeout=15000)
    except Exception as e:
        print(f"navigation: {e}", file=sys.stderr)
    snapshot = {
        "title": page.title(),
        "url": url,
        "elements": page.evaluate(ELEMENTS_JS),
        "forms": page.evaluate(FORMS_JS),
        "html_snippet": page.evaluate(
            "() => document.body ? document.body.innerHTML.substring(0, 5000) : ''"
        ),
    }
    browser.close()

print(json.dumps(snapshot))
"#;

/// Runs a small Playwright script through the Python interpreter.
pub struct PlaywrightInspector {
    python: String,
    headless: bool,
    timeout_seconds: u64,
}

impl Default for PlaywrightInspector {
    fn default() -> Self {
        Self::new("python")
    }
}

impl PlaywrightInspector {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            headless: true,
            timeout_seconds: 90,
        }
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

#[async_trait]
impl PageInspector for PlaywrightInspector {
    async fn inspect(&self, url: &str) -> RunnerResult<DomSnapshot> {
        info!(url, "Fetching page structure");
        let child = Command::new(&self.python)
            .arg("-c")
            .arg(INSPECT_SCRIPT)
            .arg(url)
            .arg(if self.headless { "true" } else { "false" })
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunnerError::Spawn {
                program: self.python.clone(),
                message: e.to_string(),
            })?;

        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_seconds),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| RunnerError::Timeout(self.timeout_seconds))??;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let last = stderr.lines().last().unwrap_or("unknown error").to_string();
            return Err(RunnerError::Inspection(last));
        }
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "Inspector diagnostics");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let json_line = stdout
            .lines()
            .rev()
            .find(|l| l.trim_start().starts_with('{'))
            .ok_or_else(|| RunnerError::Inspection("inspector produced no output".to_string()))?;
        let snapshot: DomSnapshot = serde_json::from_str(json_line)?;

        info!(
            elements = snapshot.elements.len(),
            forms = snapshot.forms.len(),
            title = %snapshot.title,
            "Page structure extracted"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_error() {
        let inspector = PlaywrightInspector::new("/nonexistent/python3-for-qa");
        let err = inspector.inspect("https://example.com").await.unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }

    #[test]
    fn test_script_reads_url_and_mode() {
        assert!(INSPECT_SCRIPT.contains("sys.argv[1]"));
        assert!(INSPECT_SCRIPT.contains("chromium.launch(headless=headless)"));
    }
}
