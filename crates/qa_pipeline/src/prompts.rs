//! Prompt rendering for every phase.
//!
//! Prompts are plain strings built from pipeline state. The wording is part
//! of the contract with the model: the JSON shapes requested here are the
//! shapes [`ResponseExtractor`](crate::extract::ResponseExtractor) parses.

use serde_json::Value;

use qa_core::{DomSnapshot, ExecutionReport, PageModel, Phase, TestCase, TestSuite};

/// Elements of the raw DOM included in the exploration prompt.
const EXPLORE_ELEMENTS: usize = 20;
/// Page-model elements listed with their locators in the implementation prompt.
const IMPLEMENT_ELEMENTS: usize = 20;
const REFINE_ELEMENTS: usize = 15;
const REFINE_FORMS: usize = 5;
const CHAT_TITLES: usize = 5;
const CRITIQUE_STDOUT: usize = 2000;
const CRITIQUE_STDERR: usize = 1000;

/// Locator priorities and Playwright pitfalls shared by generation prompts.
pub const LOCATOR_STRATEGY: &str = r##"
LOCATOR PRIORITY (use in order):
1. ID: `page.locator("#login-btn")`
2. data-testid: `page.get_by_test_id("submit")`
3. role + name: `page.get_by_role("button", name="Submit")`
4. placeholder: `page.get_by_placeholder("Enter email")`
5. text: `page.get_by_text("Login")`
6. CSS: `page.locator(".btn-primary")`

CRITICAL RULES:
- ALWAYS use .first when multiple matches possible: `page.get_by_role("link", name="Home").first`
- ALWAYS use wait_until="domcontentloaded": `page.goto(url, wait_until="domcontentloaded")`
- NEVER use wait_for_load_state("networkidle") - causes timeouts
- After navigation clicks, use: `page.wait_for_url("**/path**")`
- For new tabs: `new_page.wait_for_load_state("domcontentloaded")`
- get_by_text() has NO ignore_case param - use `page.locator("text=/pattern/i")` for case-insensitive

TIMING (wait before asserting):
- After clicking expandable elements: `content.wait_for(state="visible", timeout=5000)`
- For footer elements: `element.scroll_into_view_if_needed()`
- After form submit: `success_msg.wait_for(state="visible", timeout=5000)`
- NEVER assert immediately after clicking

FORM VALIDATION:
- HTML5 validation uses browser tooltips, not DOM elements
- Test with: `is_invalid = input.evaluate("el => !el.validity.valid")`
- Only look for custom error messages if site uses JS validation

SPECIAL CASES:
- mailto: links open email client, not browser navigation - don't use expect_navigation
- Menu links usually navigate same window - don't use expect_page() unless target="_blank"
- Form fields may NOT clear after submission - assert success message visibility instead
"##;

const CRITIQUE_RULES: &str = r#"CRITICAL PLAYWRIGHT API RULES - MUST FOLLOW:
- get_by_text() does NOT have ignore_case parameter - just use page.get_by_text("text")
- get_by_role() valid params: name, exact, checked, disabled, expanded, pressed, selected, level
- When multiple elements match, use .first, .last, or .nth(n) to avoid strict mode errors
- Use relative URLs in href selectors: a[href='/products'] NOT a[href='https://site.com/products']
- For flexible counts, use greater_than/less_than: expect(locator).to_have_count(count) or check dynamically

Please refactor the code to:
1. Fix any failing tests - especially API usage errors like invalid parameters
2. Address the user's critique
3. Handle strict mode violations by using .first when multiple elements match
4. Use relative href selectors instead of absolute URLs
5. Add proper waits and error handling
6. Make count assertions flexible or verify actual counts first

Return ONLY the complete, corrected Python code - no markdown, no explanations.
Start with the imports and end with the last line of code."#;

fn pretty<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Stateless renderer for phase prompts.
pub struct PromptBuilder;

impl PromptBuilder {
    /// Ask for a page model from the DOM actually observed at `url`.
    pub fn explore(url: &str, dom: &DomSnapshot) -> String {
        let elements: Vec<_> = dom.elements.iter().take(EXPLORE_ELEMENTS).collect();
        format!(
            r#"You are a web testing agent. I have visited this URL: {url}

Here is the ACTUAL page data extracted from the DOM:

Page Title: {title}

Interactive Elements Found ({count} elements):
{elements}

Forms Found:
{forms}

Based on this REAL page structure, generate a structured analysis. Return ONLY a JSON object:
{{
  "url": "{url}",
  "elements": [
    {{
      "type": "button|input|link|form|etc",
      "locator": "CSS selector or ID (use the actual locators from above)",
      "description": "What this element does",
      "interactions": ["click", "type", "hover"],
      "testable": true/false
    }}
  ],
  "userFlows": [
    {{
      "name": "Flow name",
      "steps": ["Step 1", "Step 2"],
      "priority": "high|medium|low"
    }}
  ],
  "pageMetadata": {{
    "title": "{title}",
    "type": "login|form|dashboard|e-commerce|etc",
    "complexity": "simple|medium|complex"
  }}
}}

Analyze the actual elements and create meaningful test flows."#,
            url = url,
            title = dom.title,
            count = dom.elements.len(),
            elements = pretty(&elements),
            forms = pretty(&dom.forms),
        )
    }

    /// Ask for a JSON array of test cases covering the page model.
    pub fn design(model: &PageModel, guidance: Option<&str>) -> String {
        let guidance = guidance
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(|g| {
                format!(
                    "\nUSER GUIDANCE:\nThe user has provided the following input to guide test case generation:\n\"{}\"\n\nPlease take this guidance into account when designing the test cases.\n",
                    g
                )
            })
            .unwrap_or_default();
        format!(
            r##"Based on this page structure:
{structure}
{guidance}
Generate a COMPREHENSIVE test plan that includes coverage of:
1. Navigation behavior
2. Valid input scenarios
3. Invalid input scenarios
4. Boundary cases
5. Post-condition behavior
6. UI responsiveness

DO NOT test any element or feature NOT present in the provided page structure.
DO NOT expect any field names or keywords without prior knowledge of the provided page structure.

Return ONLY a JSON array of test cases:
[
  {{
    "id": "TC001",
    "title": "Test case title",
    "priority": "high|medium|low",
    "type": "functional|ui|integration",
    "steps": ["Step 1", "Step 2", "Step 3"],
    "expectedResult": "Expected outcome",
    "elements": ["#selector1", "#selector2"]
  }}
]
"##,
            structure = pretty(model),
            guidance = guidance,
        )
    }

    /// Ask for Python + Playwright code implementing `cases`.
    pub fn implement(cases: &[TestCase], model: &PageModel) -> String {
        let mut structure = serde_json::to_value(model).unwrap_or(Value::Null);
        // Locators are listed once, below the structure.
        if let Some(map) = structure.as_object_mut() {
            map.remove("elements");
            if let Some(raw) = map.get_mut("raw_dom").and_then(Value::as_object_mut) {
                raw.remove("elements");
            }
        }
        let elements_info = if model.elements.is_empty() {
            String::new()
        } else {
            let elements: Vec<_> = model.elements.iter().take(IMPLEMENT_ELEMENTS).collect();
            format!(
                "\nAVAILABLE ELEMENTS WITH LOCATORS:\n{}\n\nUse the locator information above to select the best locator for each element.\n",
                pretty(&elements)
            )
        };
        format!(
            r#"Generate Python + Playwright test code for these test cases:
{cases}

Page structure:
{structure}

{elements_info}

{strategy}

OUTPUT REQUIREMENTS:
- Return ONLY valid Python code - no markdown, no ```python blocks, no explanations
- Code will be validated with AST parser - must be syntactically correct
- Do NOT define @pytest.fixture - fixtures are provided by conftest.py
- Test functions accept `page` parameter: `def test_example(page):`

COMMON MISTAKES:
- NEVER use networkidle - causes timeouts
- NEVER assert immediately after clicking - wait first
- NEVER use expect_page() unless link has target="_blank"
- NEVER use expect_navigation() on mailto: links
- ALWAYS use .first for elements that may match multiple times
- ALWAYS scroll_into_view_if_needed() for footer elements
- ALWAYS wait_for(state="visible") after clicking expandable elements
- Form fields may NOT clear after submit - assert success message visibility instead
- Use validity API for HTML5 validation, not custom error messages

ASSERTIONS (every test MUST have at least one):
- URL: `assert "/path" in page.url` (use `in`, not `==`)
- Visibility: `element.wait_for(state="visible"); assert element.is_visible()`
- Text: `assert "text" in element.text_content()`
- Count: `assert locator.count() > 0`
- Form validity: `assert input.evaluate("el => !el.validity.valid")`

Start directly with imports, end with last line of code."#,
            cases = pretty(cases),
            structure = pretty(&structure),
            elements_info = elements_info,
            strategy = LOCATOR_STRATEGY,
        )
    }

    /// Ask the model to repair `code` given the validator's findings.
    pub fn correction(code: &str, issues: &[String]) -> String {
        let issues: Vec<String> = issues.iter().map(|i| format!("- {}", i)).collect();
        format!(
            r#"The following Playwright test code has issues that need to be fixed:

ISSUES FOUND:
{issues}

ORIGINAL CODE:
{code}

Please fix ALL the issues and return the corrected Python code.

REQUIREMENTS:
1. Return ONLY pure Python code - no markdown, no explanations
2. Do NOT include ```python or ``` markers
3. Fix all syntax errors
4. Ensure all required imports are present (from playwright.sync_api import Page, expect)
5. Ensure test functions follow pytest conventions (def test_*)
6. Include page.goto() to navigate to the target URL
7. Include at least one assertion using expect()

{strategy}

Return the complete, corrected Python code:"#,
            issues = issues.join("\n"),
            code = code,
            strategy = LOCATOR_STRATEGY,
        )
    }

    /// Ask for a refactor of `code` from the last run and the user's critique.
    pub fn critique(code: &str, report: &ExecutionReport, critique: &str) -> String {
        let failed: Vec<String> = report
            .failed_tests()
            .map(|t| {
                format!(
                    "  - {}: {}",
                    t.name,
                    t.error.as_deref().unwrap_or("Unknown error")
                )
            })
            .collect();
        let failure_details = if failed.is_empty() {
            String::new()
        } else {
            format!("FAILED TESTS:\n{}\n", failed.join("\n"))
        };
        format!(
            r#"The following Playwright test code needs to be refactored based on execution results and user feedback.

CURRENT CODE:
```python
{code}
```

TEST EXECUTION RESULTS:
- Success: {success}
- Return Code: {exit_code}
- Duration: {duration:.2}s
- Tests Passed: {passed}
- Tests Failed: {failed_count}

{failure_details}

STDOUT:
{stdout}

STDERR:
{stderr}

USER CRITIQUE:
{critique}

{rules}"#,
            code = code,
            success = report.success(),
            exit_code = report.exit_code,
            duration = report.duration_secs,
            passed = report.passed_records(),
            failed_count = failed.len(),
            failure_details = failure_details,
            stdout = truncate(&report.stdout, CRITIQUE_STDOUT),
            stderr = truncate(&report.stderr, CRITIQUE_STDERR),
            critique = critique,
            rules = CRITIQUE_RULES,
        )
    }

    /// Ask for an add/modify/remove edit of the current test plan.
    pub fn refine(model: &PageModel, suite: &TestSuite, feedback: &str) -> String {
        let elements: Vec<String> = model
            .elements
            .iter()
            .take(REFINE_ELEMENTS)
            .map(|e| {
                let label = [&e.description, &e.locator, &e.element_type]
                    .into_iter()
                    .find(|s| !s.is_empty())
                    .map(|s| truncate(s, 30))
                    .unwrap_or_default();
                let kind = if e.element_type.is_empty() {
                    "element"
                } else {
                    e.element_type.as_str()
                };
                format!("- {}: {}", kind, label)
            })
            .collect();
        let forms: Vec<String> = model
            .raw_dom
            .elements
            .iter()
            .filter(|e| e.tag.eq_ignore_ascii_case("form"))
            .take(REFINE_FORMS)
            .map(|f| {
                let name = f
                    .id
                    .as_deref()
                    .or(f.name.as_deref())
                    .unwrap_or(f.locator.as_str());
                format!("- Form: {}", name)
            })
            .collect();
        let cases: Vec<String> = suite
            .iter()
            .enumerate()
            .map(|(i, tc)| format!("{}. {}: {}", i + 1, tc.id, tc.title))
            .collect();

        format!(
            r#"You are refining a test plan for a web application.

PAGE BEING TESTED:
URL: {url}

KEY ELEMENTS:
{elements}

FORMS:
{forms}

CURRENT TEST CASES:
{cases}

USER REQUEST:
{feedback}

Based on the user's request, provide ONLY the NEW or MODIFIED test cases in JSON format.
If adding new tests, generate appropriate test cases.
If modifying existing tests, provide the updated version.
If removing tests, indicate which test IDs to remove.

Respond in this exact JSON format ONLY:
{{
    "action": "add" | "modify" | "remove",
    "test_cases": [
        {{
            "id": "TC_XXX",
            "title": "Test Case Title",
            "priority": "high" | "medium" | "low",
            "type": "functional" | "ui" | "integration",
            "steps": ["Step 1", "Step 2", "..."],
            "expectedResult": "What should happen",
            "elements": ["element selectors used"]
        }}
    ],
    "remove_ids": ["TC_001"]
}}

Only output valid JSON, no explanations."#,
            url = model.url,
            elements = or_placeholder(&elements, "No elements extracted"),
            forms = or_placeholder(&forms, "No forms found"),
            cases = or_placeholder(&cases, "No test cases yet"),
            feedback = feedback,
        )
    }

    /// System prompt for free-form chat, built from the session's state.
    pub fn chat_system(phase: Phase, model: Option<&PageModel>, suite: &TestSuite) -> String {
        let mut parts = vec!["You are a helpful QA testing assistant.".to_string()];
        if phase != Phase::Idle {
            parts.push(format!("\nCurrent phase: {}", phase));
        }
        if let Some(model) = model {
            let url = if model.url.is_empty() {
                "a webpage"
            } else {
                model.url.as_str()
            };
            parts.push(format!("\nCurrently exploring: {}", url));
            parts.push(format!("Elements found: {}", model.elements.len()));
        }
        if !suite.is_empty() {
            let titles: Vec<&str> = suite
                .iter()
                .take(CHAT_TITLES)
                .map(|tc| tc.title.as_str())
                .collect();
            parts.push(format!(
                "\nCurrent test cases ({}): {}",
                suite.len(),
                titles.join(", ")
            ));
            if suite.len() > CHAT_TITLES {
                parts.push(format!("... and {} more", suite.len() - CHAT_TITLES));
            }
        }
        parts.join("\n")
    }

    /// Code used when the model returned nothing importable.
    pub fn fallback_code(model: &PageModel, cases: &[TestCase]) -> String {
        let url = if model.url.is_empty() {
            "https://example.com"
        } else {
            model.url.as_str()
        };
        let comments: Vec<String> = cases
            .iter()
            .map(|tc| {
                let title = if tc.title.is_empty() { "Test" } else { tc.title.as_str() };
                format!("# {}", title)
            })
            .collect();
        format!(
            "from playwright.sync_api import Page, expect\n\ndef test_example(page: Page):\n    \"\"\"Generated test based on test cases\"\"\"\n    page.goto(\"{}\")\n\n    {}\n",
            url,
            comments.join("\n    ")
        )
    }
}

fn or_placeholder(lines: &[String], placeholder: &str) -> String {
    if lines.is_empty() {
        placeholder.to_string()
    } else {
        lines.join("\n")
    }
}
