//! Parsing of pytest verbose output.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use qa_core::{TestRecord, TestStatus};

static RESULT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(test_\w+\.py::test_\w+)\s+(PASSED|FAILED|SKIPPED|ERROR)").expect("valid regex")
});

static FAILURE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^FAILED \S*?(test_\w+\.py::test_\w+) - (.*)$").expect("valid regex")
});

/// Recognizes per-test result lines, reporting each test name once.
pub struct ResultMatcher {
    seen: HashSet<String>,
}

impl Default for ResultMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultMatcher {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }

    /// Returns a record the first time a test name appears with a status.
    pub fn observe(&mut self, line: &str) -> Option<TestRecord> {
        let caps = RESULT_LINE.captures(line)?;
        let name = caps.get(1)?.as_str();
        let status = TestStatus::parse(caps.get(2)?.as_str())?;
        if !self.seen.insert(name.to_string()) {
            return None;
        }
        Some(TestRecord::new(name, status))
    }

    pub fn seen(&self) -> usize {
        self.seen.len()
    }
}

/// Parse every distinct test result from captured stdout, attaching failure
/// messages from the short summary section.
pub fn parse_results(stdout: &str) -> Vec<TestRecord> {
    let mut matcher = ResultMatcher::new();
    let mut records: Vec<TestRecord> = stdout.lines().filter_map(|l| matcher.observe(l)).collect();

    for (name, message) in parse_failures(stdout) {
        if let Some(record) = records.iter_mut().find(|r| r.name == name) {
            record.error = Some(message);
        }
    }
    records
}

/// `(test name, message)` pairs from `FAILED file::test - message` lines.
///
/// A message continues over following lines until the next summary entry or
/// a `=` separator.
pub fn parse_failures(stdout: &str) -> Vec<(String, String)> {
    let mut failures = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;

    for line in stdout.lines() {
        let boundary =
            line.starts_with("FAILED") || line.starts_with("PASSED") || line.starts_with('=');
        if boundary {
            if let Some((name, parts)) = current.take() {
                failures.push((name, parts.join("\n").trim().to_string()));
            }
        }
        if let Some(caps) = FAILURE_LINE.captures(line) {
            if let (Some(name), Some(msg)) = (caps.get(1), caps.get(2)) {
                current = Some((name.as_str().to_string(), vec![msg.as_str().to_string()]));
            }
        } else if !boundary {
            if let Some((_, parts)) = current.as_mut() {
                parts.push(line.to_string());
            }
        }
    }
    if let Some((name, parts)) = current {
        failures.push((name, parts.join("\n").trim().to_string()));
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
============================= test session starts ==============================
collected 2 items

tests/test_example_com.py::test_page_loads PASSED                        [ 50%]
tests/test_example_com.py::test_login_button FAILED                      [100%]

=================================== FAILURES ===================================
E   AssertionError: Locator expected to be visible
=========================== short test summary info ============================
PASSED tests/test_example_com.py::test_page_loads
FAILED tests/test_example_com.py::test_login_button - AssertionError: Locator expected to be visible
  waiting for locator(\"#login-btn\")
========================= 1 failed, 1 passed in 3.21s ==========================
";

    #[test]
    fn test_parse_results() {
        let records = parse_results(SAMPLE);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "test_example_com.py::test_page_loads");
        assert!(records[0].passed);
        assert_eq!(records[1].status, TestStatus::Failed);
        let error = records[1].error.as_deref().unwrap();
        assert!(error.starts_with("AssertionError: Locator expected to be visible"));
        assert!(error.contains("waiting for locator"));
    }

    #[test]
    fn test_matcher_dedupes() {
        let mut matcher = ResultMatcher::new();
        let line = "test_a.py::test_one PASSED";
        assert!(matcher.observe(line).is_some());
        assert!(matcher.observe(line).is_none());
        assert!(matcher.observe("test_a.py::test_one FAILED").is_none());
        assert!(matcher.observe("collected 1 item").is_none());
        assert_eq!(matcher.seen(), 1);
    }

    #[test]
    fn test_no_results_in_garbage() {
        assert!(parse_results("ImportError: No module named playwright\n").is_empty());
        assert!(parse_failures("").is_empty());
    }
}
