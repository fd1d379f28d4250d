//! Applying add/modify/remove edits from the model to a test plan.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use qa_core::{TestCase, TestSuite};

use crate::extract::ResponseExtractor;

const UNPARSEABLE: &str =
    "I understood your request but couldn't process it properly. Please try rephrasing.";
const NO_CHANGE: &str = "I understood your request but no changes were made. Please be more specific about what you'd like to add, modify, or remove.";

#[derive(Debug, Deserialize)]
struct Refinement {
    #[serde(default = "default_action")]
    action: String,
    #[serde(default)]
    test_cases: Vec<Value>,
    #[serde(default)]
    remove_ids: Vec<String>,
}

fn default_action() -> String {
    "add".to_string()
}

/// The edited plan and a message for the user.
#[derive(Debug, Clone, PartialEq)]
pub struct RefineOutcome {
    pub suite: TestSuite,
    pub message: String,
    /// Whether the plan differs from the one passed in.
    pub changed: bool,
}

impl RefineOutcome {
    fn unchanged(suite: &TestSuite, message: &str) -> Self {
        Self {
            suite: suite.clone(),
            message: message.to_string(),
            changed: false,
        }
    }
}

/// Apply the model's `reply` to `suite`. Never fails: an unusable reply
/// leaves the plan untouched and says so.
pub fn apply_refinement(suite: &TestSuite, reply: &str) -> RefineOutcome {
    let refinement = ResponseExtractor::json_value(reply)
        .filter(Value::is_object)
        .and_then(|value| serde_json::from_value::<Refinement>(value).ok());
    let Some(refinement) = refinement else {
        warn!("Could not parse refinement response");
        return RefineOutcome::unchanged(suite, UNPARSEABLE);
    };

    let mut updated = suite.clone();
    match refinement.action.trim().to_lowercase().as_str() {
        "add" if !refinement.test_cases.is_empty() => {
            let mut added = 0;
            for value in refinement.test_cases {
                match serde_json::from_value::<TestCase>(value) {
                    Ok(case) => {
                        updated.add(case);
                        added += 1;
                    }
                    Err(e) => warn!(error = %e, "Skipping malformed test case"),
                }
            }
            info!(added, "Added test cases");
            RefineOutcome {
                changed: added > 0,
                message: format!(
                    "✅ Added {} new test case(s). You now have {} test cases total.",
                    added,
                    updated.len()
                ),
                suite: updated,
            }
        }
        "modify" if !refinement.test_cases.is_empty() => {
            let mut modified = 0;
            for value in refinement.test_cases {
                if merge_case(&mut updated, value) {
                    modified += 1;
                }
            }
            info!(modified, "Modified test cases");
            RefineOutcome {
                changed: modified > 0,
                message: format!("✅ Modified {} test case(s).", modified),
                suite: updated,
            }
        }
        "remove" if !refinement.remove_ids.is_empty() => {
            let removed = updated.remove_ids(&refinement.remove_ids);
            info!(removed, "Removed test cases");
            RefineOutcome {
                changed: removed > 0,
                message: format!(
                    "✅ Removed {} test case(s). You now have {} test cases remaining.",
                    removed,
                    updated.len()
                ),
                suite: updated,
            }
        }
        _ => RefineOutcome::unchanged(suite, NO_CHANGE),
    }
}

/// Overlay the fields present in `patch` onto the case with the same id.
fn merge_case(suite: &mut TestSuite, patch: Value) -> bool {
    let Value::Object(fields) = patch else {
        return false;
    };
    let Some(id) = fields.get("id").and_then(Value::as_str) else {
        return false;
    };
    let Some(existing) = suite.get_mut(id) else {
        return false;
    };
    let Ok(Value::Object(mut merged)) = serde_json::to_value(&*existing) else {
        return false;
    };
    merged.extend(fields);
    match serde_json::from_value::<TestCase>(Value::Object(merged)) {
        Ok(case) => {
            *existing = case;
            true
        }
        Err(e) => {
            warn!(error = %e, "Skipping malformed test case update");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_core::Priority;

    fn suite() -> TestSuite {
        TestSuite::from_cases([
            TestCase::generic(),
            TestCase {
                id: "TC002".into(),
                title: "Submit empty form".into(),
                ..TestCase::generic()
            },
        ])
    }

    #[test]
    fn test_add_renumbers_duplicates() {
        let reply = r#"{"action": "add", "test_cases": [
            {"id": "TC001", "title": "Duplicate id"},
            {"title": "No id"}
        ]}"#;
        let outcome = apply_refinement(&suite(), reply);
        assert!(outcome.changed);
        assert_eq!(
            outcome.message,
            "✅ Added 2 new test case(s). You now have 4 test cases total."
        );
        assert_eq!(outcome.suite.ids(), vec!["TC001", "TC002", "TC_003", "TC_004"]);
    }

    #[test]
    fn test_modify_merges_fields() {
        let reply = r#"```json
{"action": "modify", "test_cases": [{"id": "TC002", "priority": "low"}, {"id": "TC999", "title": "x"}]}
```"#;
        let outcome = apply_refinement(&suite(), reply);
        assert_eq!(outcome.message, "✅ Modified 1 test case(s).");
        let case = outcome.suite.get("TC002").unwrap();
        assert_eq!(case.priority, Priority::Low);
        assert_eq!(case.title, "Submit empty form");
    }

    #[test]
    fn test_remove() {
        let reply = r#"{"action": "remove", "test_cases": [], "remove_ids": ["TC001"]}"#;
        let outcome = apply_refinement(&suite(), reply);
        assert!(outcome.changed);
        assert_eq!(
            outcome.message,
            "✅ Removed 1 test case(s). You now have 1 test cases remaining."
        );
        assert_eq!(outcome.suite.ids(), vec!["TC002"]);
    }

    #[test]
    fn test_no_change_and_unparseable() {
        let outcome = apply_refinement(&suite(), r#"{"action": "add", "test_cases": []}"#);
        assert!(!outcome.changed);
        assert!(outcome.message.starts_with("I understood your request but no changes"));
        assert_eq!(outcome.suite, suite());

        let outcome = apply_refinement(&suite(), "I'd love to help!");
        assert!(!outcome.changed);
        assert_eq!(outcome.message, UNPARSEABLE);
    }
}
