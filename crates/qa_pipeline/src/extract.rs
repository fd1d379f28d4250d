//! Recovery of structured values from free-form model text.
//!
//! Every extraction is total: malformed input yields a documented fallback
//! and a `warn!`, never an error. Code extraction is idempotent, so feeding
//! its output back in returns the same string.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use qa_core::{PageModel, TestCase};

static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z0-9_+-]*").expect("valid regex"));

/// Module-level assignment such as `BASE_URL = ...` or `TIMEOUT: int = 5000`.
static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\s*:\s*[\w\[\], .]+)?\s*=[^=]").expect("valid regex")
});

/// An extracted value, flagged when it came from the fallback path.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub value: T,
    pub fallback: bool,
}

impl<T> Extracted<T> {
    fn parsed(value: T) -> Self {
        Self {
            value,
            fallback: false,
        }
    }

    fn fallback(value: T) -> Self {
        Self {
            value,
            fallback: true,
        }
    }
}

/// Stateless extractor for JSON and Python source.
pub struct ResponseExtractor;

impl ResponseExtractor {
    /// Remove Markdown fence markers (```` ``` ```` with an optional language tag).
    pub fn strip_fences(text: &str) -> String {
        FENCE.replace_all(text, "").trim().to_string()
    }

    /// Parse the first JSON value recoverable from `text`.
    ///
    /// Tries the fence-stripped text as a whole, then the balanced
    /// brace/bracket span opening at each `{` or `[` in order. An opener
    /// that never closes is skipped.
    pub fn json_value(text: &str) -> Option<Value> {
        let cleaned = Self::strip_fences(text);
        if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
            return Some(value);
        }
        debug!("Direct JSON parse failed, scanning for a balanced span");
        let mut offset = 0;
        while let Some(start) = cleaned[offset..].find(['{', '[']) {
            let from = offset + start;
            if let Some((_, end)) = balanced_span(&cleaned[from..]) {
                if let Ok(value) = serde_json::from_str::<Value>(&cleaned[from..from + end]) {
                    return Some(value);
                }
            }
            offset = from + 1;
        }
        None
    }

    /// Page model from an exploration reply, or an empty skeleton for `url`.
    pub fn page_model(text: &str, url: &str) -> Extracted<PageModel> {
        let parsed = Self::json_value(text)
            .filter(Value::is_object)
            .and_then(|value| serde_json::from_value::<PageModel>(value).ok());
        match parsed {
            Some(mut model) => {
                if model.url.trim().is_empty() {
                    model.url = url.to_string();
                }
                debug!(
                    elements = model.elements.len(),
                    flows = model.user_flows.len(),
                    "Parsed page model"
                );
                Extracted::parsed(model)
            }
            None => {
                warn!(url = %url, "Could not parse page model, using default structure");
                Extracted::fallback(PageModel::skeleton(url))
            }
        }
    }

    /// Test cases from a design reply, or the single generic case.
    ///
    /// Accepts a bare array or an object carrying a `test_cases` array.
    pub fn test_cases(text: &str) -> Extracted<Vec<TestCase>> {
        let cases = Self::json_value(text)
            .and_then(|value| match value {
                Value::Array(_) => Some(value),
                Value::Object(mut map) => map.remove("test_cases").filter(Value::is_array),
                _ => None,
            })
            .and_then(|value| serde_json::from_value::<Vec<TestCase>>(value).ok())
            .filter(|cases| !cases.is_empty());
        match cases {
            Some(cases) => {
                debug!(count = cases.len(), "Parsed test cases");
                Extracted::parsed(cases)
            }
            None => {
                warn!("Could not parse test cases, using default test case");
                Extracted::fallback(vec![TestCase::generic()])
            }
        }
    }

    /// Python source from a reply that may carry fences, prose and fixtures.
    pub fn code(text: &str) -> String {
        let body = fenced_python(text).unwrap_or_else(|| text.to_string());

        let mut kept: Vec<&str> = Vec::new();
        let mut in_docstring = false;
        for line in body.lines().skip_while(|l| !is_code_start(l.trim())) {
            let trimmed = line.trim();
            if trimmed.starts_with("```") {
                if is_python_fence(trimmed) {
                    continue;
                }
                break;
            }
            if !in_docstring && is_prose_boundary(line, trimmed) {
                break;
            }
            if (line.matches("\"\"\"").count() + line.matches("'''").count()) % 2 == 1 {
                in_docstring = !in_docstring;
            }
            kept.push(line.trim_end());
        }

        // Stripping a leading fixture can expose a line that would not
        // start code on its own, so the leading skip is applied again.
        let stripped = strip_fixtures(&kept);
        let first = stripped
            .iter()
            .position(|l| is_code_start(l.trim()))
            .unwrap_or(stripped.len());
        collapse_blank_lines(&stripped[first..]).trim().to_string()
    }
}

fn is_python_fence(trimmed: &str) -> bool {
    matches!(
        trimmed.trim_start_matches('`').trim().to_lowercase().as_str(),
        "" | "python" | "py"
    )
}

/// Content of the first python (or untagged) fenced block.
fn fenced_python(text: &str) -> Option<String> {
    let mut inside: Option<bool> = None;
    let mut captured: Vec<&str> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            match inside {
                Some(true) => {
                    if captured.iter().any(|l| !l.trim().is_empty()) {
                        return Some(captured.join("\n"));
                    }
                    captured.clear();
                    inside = None;
                }
                Some(false) => inside = None,
                None => inside = Some(is_python_fence(trimmed)),
            }
            continue;
        }
        if inside == Some(true) {
            captured.push(line);
        }
    }
    if inside == Some(true) && captured.iter().any(|l| !l.trim().is_empty()) {
        return Some(captured.join("\n"));
    }
    None
}

fn is_code_start(trimmed: &str) -> bool {
    const STARTS: [&str; 8] = [
        "import ", "from ", "def ", "async def ", "class ", "@", "\"\"\"", "'''",
    ];
    STARTS.iter().any(|s| trimmed.starts_with(s))
        || (trimmed.starts_with('#') && !trimmed.starts_with("##"))
        || ASSIGNMENT.is_match(trimmed)
}

/// Lines that mark the end of code and the start of trailing prose.
fn is_prose_boundary(line: &str, trimmed: &str) -> bool {
    let lower = trimmed.to_lowercase();
    if trimmed.starts_with("**")
        || trimmed.starts_with("##")
        || trimmed.starts_with("---")
        || trimmed == "bash"
        || trimmed.starts_with("bash ")
        || trimmed.starts_with("$ ")
        || lower.starts_with("# how to run")
    {
        return true;
    }
    let unindented = !line.starts_with(char::is_whitespace);
    unindented
        && ["note:", "how to run", "to run", "explanation:"]
            .iter()
            .any(|p| lower.starts_with(p))
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Drop `@pytest.fixture` definitions; fixtures come from the hook module.
fn strip_fixtures(lines: &[&str]) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    // (decorator indent, def line seen)
    let mut skipping: Option<(usize, bool)> = None;
    for line in lines {
        let trimmed = line.trim_start();
        if let Some((indent, seen_def)) = skipping {
            if !seen_def {
                if trimmed.starts_with("def ") || trimmed.starts_with("async def ") {
                    skipping = Some((indent, true));
                }
                continue;
            }
            if trimmed.is_empty() || indent_of(line) > indent {
                continue;
            }
            skipping = None;
        }
        if trimmed.starts_with("@pytest.fixture") {
            debug!("Removing locally defined fixture");
            skipping = Some((indent_of(line), false));
            continue;
        }
        out.push(line.to_string());
    }
    out
}

fn collapse_blank_lines(lines: &[String]) -> String {
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut blank_run = 0;
    for line in lines {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push("");
        } else {
            blank_run = 0;
            out.push(line);
        }
    }
    out.join("\n")
}

/// Byte range of the first balanced `{…}` or `[…]` span, string-aware.
fn balanced_span(text: &str) -> Option<(usize, usize)> {
    let start = text.find(['{', '['])?;
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some((start, start + i + c.len_utf8()));
                }
            }
            _ => {}
        }
    }
    None
}
