//! Syntax and structure checks for generated Playwright tests.
//!
//! The syntax check is a line-oriented Python tokenizer: it tracks string
//! literals, bracket nesting, the indentation stack and block headers, and
//! reports the first error the way the interpreter would locate it.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

static TEST_FUNCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"def (test_\w+)\s*\(").expect("valid regex"));

/// The first syntax error found in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxIssue {
    pub line: usize,
    pub message: String,
    pub text: String,
}

impl SyntaxIssue {
    fn new(line: usize, message: impl Into<String>, text: &str) -> Self {
        Self {
            line,
            message: message.into(),
            text: text.trim().to_string(),
        }
    }
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            write!(f, "Line {}: {}", self.line, self.message)
        } else {
            write!(f, "Line {}: {} -> '{}'", self.line, self.message, self.text)
        }
    }
}

/// A structural shortcoming of a generated test file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StructureIssue {
    MissingImport,
    MissingTestFunction,
    MissingNavigation,
    MissingAssertion,
}

impl StructureIssue {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingImport => "Missing Playwright import",
            Self::MissingTestFunction => "No test functions found (expected 'def test_*')",
            Self::MissingNavigation => "No page.goto() call - tests should navigate to target URL",
            Self::MissingAssertion => "No assertions found - tests should verify outcomes",
        }
    }

    /// Critical issues block progression and trigger a correction round;
    /// the rest are advisory.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::MissingImport | Self::MissingTestFunction)
    }
}

impl fmt::Display for StructureIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Combined result of both checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub syntax: Option<SyntaxIssue>,
    pub structure: Vec<StructureIssue>,
}

impl Validation {
    pub fn syntax_valid(&self) -> bool {
        self.syntax.is_none()
    }

    pub fn structure_valid(&self) -> bool {
        !self.structure.iter().any(StructureIssue::is_critical)
    }

    /// Syntax error plus critical structure issues, as diagnostic strings.
    pub fn critical_issues(&self) -> Vec<String> {
        self.syntax
            .iter()
            .map(ToString::to_string)
            .chain(
                self.structure
                    .iter()
                    .filter(|i| i.is_critical())
                    .map(ToString::to_string),
            )
            .collect()
    }

    /// Every structure issue, critical or not.
    pub fn structure_messages(&self) -> Vec<String> {
        self.structure.iter().map(ToString::to_string).collect()
    }

    pub fn is_acceptable(&self) -> bool {
        self.syntax_valid() && self.structure_valid()
    }
}

pub struct Validator;

impl Validator {
    pub fn validate(code: &str) -> Validation {
        Validation {
            syntax: Self::syntax(code).err(),
            structure: Self::structure(code),
        }
    }

    /// Check that `code` tokenizes as Python with consistent blocks.
    pub fn syntax(code: &str) -> Result<(), SyntaxIssue> {
        match PythonChecker::default().check(code) {
            Ok(()) => {
                debug!("Syntax validation passed");
                Ok(())
            }
            Err(issue) => {
                warn!(issue = %issue, "Syntax error in generated code");
                Err(issue)
            }
        }
    }

    pub fn structure(code: &str) -> Vec<StructureIssue> {
        let mut issues = Vec::new();

        if !code.to_lowercase().contains("playwright") {
            issues.push(StructureIssue::MissingImport);
        }

        let test_functions: Vec<&str> = TEST_FUNCTION
            .captures_iter(code)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        if test_functions.is_empty() {
            issues.push(StructureIssue::MissingTestFunction);
        } else {
            debug!(count = test_functions.len(), functions = %test_functions.join(", "), "Found test functions");
        }

        if !code.contains("page.goto") && !code.contains(".goto(") {
            issues.push(StructureIssue::MissingNavigation);
        }
        if !code.contains("expect(") && !code.contains("assert ") {
            issues.push(StructureIssue::MissingAssertion);
        }

        const SEMANTIC: [&str; 5] = [
            "get_by_role",
            "get_by_text",
            "get_by_label",
            "get_by_placeholder",
            "get_by_test_id",
        ];
        if SEMANTIC.iter().any(|l| code.contains(l)) {
            info!("Uses semantic Playwright locators");
        } else {
            warn!("Consider using semantic locators for better stability");
        }

        for issue in issues.iter().filter(|i| !i.is_critical()) {
            warn!(issue = %issue, "Advisory structure issue");
        }
        issues
    }
}

/// Statement keywords that open an indented block.
const BLOCK_KEYWORDS: [&str; 12] = [
    "if", "elif", "else", "for", "while", "def", "class", "try", "except", "finally", "with",
    "async",
];

struct OpenString {
    quote: char,
    triple: bool,
    line: usize,
    text: String,
}

struct OpenBracket {
    bracket: char,
    line: usize,
    text: String,
}

/// One logical line, possibly spanning several physical lines.
struct LogicalLine {
    line: usize,
    text: String,
    header: bool,
    colon_at_top: bool,
    last: Option<char>,
}

impl LogicalLine {
    fn new(line: usize, raw: &str) -> Self {
        let trimmed = raw.trim_start();
        let mut words = trimmed
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|w| !w.is_empty());
        let first = if trimmed.starts_with(|c: char| c.is_alphabetic() || c == '_') {
            words.next().unwrap_or_default()
        } else {
            ""
        };
        let header = match first {
            "async" => matches!(words.next(), Some("def" | "for" | "with")),
            word => BLOCK_KEYWORDS.contains(&word),
        };
        Self {
            line,
            text: raw.to_string(),
            header,
            colon_at_top: false,
            last: None,
        }
    }
}

#[derive(Default)]
struct PythonChecker {
    indents: Vec<usize>,
    brackets: Vec<OpenBracket>,
    string: Option<OpenString>,
    logical: Option<LogicalLine>,
    /// Header line awaiting its indented body.
    pending_block: Option<(usize, String)>,
}

impl PythonChecker {
    fn check(mut self, code: &str) -> Result<(), SyntaxIssue> {
        self.indents.push(0);
        let mut last_line = 0;
        let mut continuation = false;

        for (index, raw) in code.lines().enumerate() {
            let number = index + 1;
            last_line = number;
            let chars: Vec<char> = raw.chars().collect();
            let mut i = 0;

            let starts_logical =
                self.string.is_none() && self.brackets.is_empty() && !continuation;
            continuation = false;

            if starts_logical {
                let trimmed = raw.trim_start();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                self.check_indent(number, raw)?;
                self.logical = Some(LogicalLine::new(number, raw));
                i = chars.iter().take_while(|c| c.is_whitespace()).count();
            }

            while i < chars.len() {
                let c = chars[i];
                if let Some(open) = &self.string {
                    if c == '\\' {
                        i += 2;
                        continue;
                    }
                    if c == open.quote {
                        if !open.triple {
                            self.string = None;
                        } else if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                            self.string = None;
                            i += 3;
                            continue;
                        }
                    }
                    i += 1;
                    continue;
                }
                match c {
                    '#' => break,
                    '\'' | '"' => {
                        let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                        self.string = Some(OpenString {
                            quote: c,
                            triple,
                            line: number,
                            text: raw.to_string(),
                        });
                        self.mark(c);
                        i += if triple { 3 } else { 1 };
                        continue;
                    }
                    '(' | '[' | '{' => self.brackets.push(OpenBracket {
                        bracket: c,
                        line: number,
                        text: raw.to_string(),
                    }),
                    ')' | ']' | '}' => self.close_bracket(c, number, raw)?,
                    ':' if self.brackets.is_empty() => {
                        if let Some(logical) = self.logical.as_mut() {
                            logical.colon_at_top = true;
                        }
                    }
                    '\\' if i + 1 == chars.len() => continuation = true,
                    _ => {}
                }
                if !c.is_whitespace() && !(c == '\\' && continuation) {
                    self.mark(c);
                }
                i += 1;
            }

            if let Some(open) = &self.string {
                if !open.triple {
                    if raw.ends_with('\\') {
                        continue;
                    }
                    return Err(SyntaxIssue::new(
                        open.line,
                        format!("unterminated string literal (detected at line {})", number),
                        &open.text,
                    ));
                }
            }

            if self.string.is_none() && self.brackets.is_empty() && !continuation {
                self.finish_logical_line()?;
            }
        }

        if let Some(open) = &self.string {
            let message = if open.triple {
                format!("unterminated triple-quoted string literal (detected at line {})", last_line)
            } else {
                format!("unterminated string literal (detected at line {})", last_line)
            };
            return Err(SyntaxIssue::new(open.line, message, &open.text));
        }
        if let Some(open) = self.brackets.first() {
            return Err(SyntaxIssue::new(
                open.line,
                format!("'{}' was never closed", open.bracket),
                &open.text,
            ));
        }
        if let Some((line, text)) = &self.pending_block {
            return Err(SyntaxIssue::new(
                *line,
                "expected an indented block",
                text,
            ));
        }
        Ok(())
    }

    fn mark(&mut self, c: char) {
        if let Some(logical) = self.logical.as_mut() {
            logical.last = Some(c);
        }
    }

    fn check_indent(&mut self, number: usize, raw: &str) -> Result<(), SyntaxIssue> {
        let indent = indent_width(raw);
        let top = self.indents.last().copied().unwrap_or(0);
        if let Some((header_line, _)) = self.pending_block.take() {
            if indent <= top {
                return Err(SyntaxIssue::new(
                    number,
                    format!("expected an indented block after line {}", header_line),
                    raw,
                ));
            }
            self.indents.push(indent);
            return Ok(());
        }
        if indent > top {
            return Err(SyntaxIssue::new(number, "unexpected indent", raw));
        }
        while self.indents.last().is_some_and(|&level| level > indent) {
            self.indents.pop();
        }
        if self.indents.last().copied().unwrap_or(0) != indent {
            return Err(SyntaxIssue::new(
                number,
                "unindent does not match any outer indentation level",
                raw,
            ));
        }
        Ok(())
    }

    fn close_bracket(&mut self, close: char, number: usize, raw: &str) -> Result<(), SyntaxIssue> {
        let expected = match close {
            ')' => '(',
            ']' => '[',
            _ => '{',
        };
        match self.brackets.pop() {
            Some(open) if open.bracket == expected => Ok(()),
            Some(open) => Err(SyntaxIssue::new(
                number,
                format!(
                    "closing parenthesis '{}' does not match opening parenthesis '{}'",
                    close, open.bracket
                ),
                raw,
            )),
            None => Err(SyntaxIssue::new(number, format!("unmatched '{}'", close), raw)),
        }
    }

    fn finish_logical_line(&mut self) -> Result<(), SyntaxIssue> {
        let Some(logical) = self.logical.take() else {
            return Ok(());
        };
        if !logical.header {
            return Ok(());
        }
        if !logical.colon_at_top {
            return Err(SyntaxIssue::new(logical.line, "expected ':'", &logical.text));
        }
        if logical.last == Some(':') {
            self.pending_block = Some((logical.line, logical.text));
        }
        Ok(())
    }
}

/// Column width of leading whitespace, tabs advancing to the next multiple of 8.
fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            _ => break,
        }
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r##"import re
from playwright.sync_api import Page, expect


def test_login_button(page: Page):
    """Login button is visible.

    Checks the header (and footer) area.
    """
    page.goto("https://example.com", wait_until="domcontentloaded")
    button = page.locator("#login-btn")  # primary action
    button.wait_for(state="visible", timeout=5000)
    items = [
        "a",
        "b",
    ]
    if button.count() > 0 and items:
        assert button.is_visible()
    else:
        pass
    text = 'it\'s "quoted" # not a comment'
    value = 1 + \
        2
    expect(page).to_have_title(re.compile("Example"))


class TestGroup:
    def test_nested(self, page: Page):
        for _ in range(2): page.reload()
        with page.expect_popup() as info:
            page.get_by_role("link", name="Docs").first.click()
        assert "/docs" in info.value.url
"##;

    #[test]
    fn test_valid_code_passes() {
        assert_eq!(Validator::syntax(VALID), Ok(()));
    }

    #[test]
    fn test_missing_colon() {
        let code = "def test_a(page)\n    page.goto('x')\n";
        let issue = Validator::syntax(code).unwrap_err();
        assert_eq!(issue.line, 1);
        assert_eq!(issue.to_string(), "Line 1: expected ':' -> 'def test_a(page)'");
    }

    #[test]
    fn test_unclosed_bracket() {
        let code = "def test_a(page):\n    page.goto('x'\n    assert True\n";
        let issue = Validator::syntax(code).unwrap_err();
        assert_eq!(issue.line, 2);
        assert!(issue.message.contains("'(' was never closed"));
    }

    #[test]
    fn test_mismatched_bracket() {
        let issue = Validator::syntax("x = [1, 2)\n").unwrap_err();
        assert!(issue.message.contains("does not match"));
        let issue = Validator::syntax("x = 1)\n").unwrap_err();
        assert_eq!(issue.message, "unmatched ')'");
    }

    #[test]
    fn test_unterminated_strings() {
        let issue = Validator::syntax("x = 'abc\ny = 2\n").unwrap_err();
        assert_eq!(issue.line, 1);
        assert!(issue.message.starts_with("unterminated string literal"));

        let issue = Validator::syntax("\"\"\"doc\nnever closed\n").unwrap_err();
        assert!(issue.message.starts_with("unterminated triple-quoted string literal"));
    }

    #[test]
    fn test_indentation_errors() {
        let issue = Validator::syntax("import x\n    y = 1\n").unwrap_err();
        assert_eq!(issue.message, "unexpected indent");
        assert_eq!(issue.line, 2);

        let issue = Validator::syntax("def f():\nreturn 1\n").unwrap_err();
        assert!(issue.message.starts_with("expected an indented block"));

        let issue = Validator::syntax("def f():\n        a = 1\n    b = 2\n").unwrap_err();
        assert_eq!(issue.message, "unindent does not match any outer indentation level");

        let issue = Validator::syntax("def f():\n").unwrap_err();
        assert!(issue.message.starts_with("expected an indented block"));
    }

    #[test]
    fn test_comments_and_blank_lines_ignore_indentation() {
        let code = "def f():\n\n        # odd comment\n    return 1\n";
        assert_eq!(Validator::syntax(code), Ok(()));
    }

    #[test]
    fn test_structure_of_valid_code() {
        assert!(Validator::structure(VALID).is_empty());
    }

    #[test]
    fn test_structure_issues_and_criticality() {
        let issues = Validator::structure("def helper():\n    pass\n");
        assert_eq!(
            issues,
            vec![
                StructureIssue::MissingImport,
                StructureIssue::MissingTestFunction,
                StructureIssue::MissingNavigation,
                StructureIssue::MissingAssertion,
            ]
        );
        let critical: Vec<_> = issues.iter().filter(|i| i.is_critical()).collect();
        assert_eq!(critical.len(), 2);
    }

    #[test]
    fn test_missing_assertion_is_advisory() {
        let code = "from playwright.sync_api import Page\n\ndef test_a(page: Page):\n    page.goto('https://a.test')\n";
        let validation = Validator::validate(code);
        assert_eq!(validation.structure, vec![StructureIssue::MissingAssertion]);
        assert!(validation.is_acceptable());
        assert!(validation.critical_issues().is_empty());
    }

    #[test]
    fn test_critical_issues_include_syntax() {
        let validation = Validator::validate("def test_a(page)\n    pass\n");
        let issues = validation.critical_issues();
        assert_eq!(issues[0], "Line 1: expected ':' -> 'def test_a(page)'");
        assert!(issues.contains(&"Missing Playwright import".to_string()));
    }
}
