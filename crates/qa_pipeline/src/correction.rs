//! Bounded validate-and-repair loop over generated test code.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use qa_core::CorrectionAttempt;
use qa_llm::{LlmClient, LlmRequest};

use crate::extract::ResponseExtractor;
use crate::prompts::PromptBuilder;
use crate::usage::Usage;
use crate::validate::Validator;

/// Correction rounds allowed per implementation.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// What the loop settled on, with its history for observability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionOutcome {
    #[serde(skip)]
    pub code: String,
    /// Number of rounds that found critical issues.
    pub attempts: usize,
    pub history: Vec<CorrectionAttempt>,
    pub final_syntax_valid: bool,
    pub final_structure_valid: bool,
    /// Every structure issue of the final code, advisory ones included.
    pub final_issues: Vec<String>,
    #[serde(skip)]
    pub usage: Usage,
}

/// Repairs code by feeding validator findings back to the model.
///
/// The latest candidate always replaces the previous one, even when it
/// validates worse.
pub struct SelfCorrectionLoop {
    llm: Arc<dyn LlmClient>,
    max_attempts: usize,
}

impl SelfCorrectionLoop {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub async fn run(&self, initial: String) -> CorrectionOutcome {
        let mut code = initial;
        let mut history: Vec<CorrectionAttempt> = Vec::new();
        let mut usage = Usage::default();

        for attempt in 1..=self.max_attempts {
            info!(attempt, max = self.max_attempts, "Validating generated code");
            let critical = Validator::validate(&code).critical_issues();
            if critical.is_empty() {
                info!(attempt, "Code passed all validations");
                break;
            }

            warn!(attempt, count = critical.len(), "Critical issues found, requesting correction");
            let prompt = PromptBuilder::correction(&code, &critical);
            history.push(CorrectionAttempt {
                attempt_number: attempt,
                issues_found: critical,
                resolved: false,
            });

            let completion = match self.llm.complete(LlmRequest::text(prompt)).await {
                Ok(completion) => completion,
                Err(e) => {
                    error!(attempt, error = %e, "Correction attempt failed");
                    break;
                }
            };
            usage.add(&completion);

            let corrected = ResponseExtractor::code(&completion.text);
            if corrected.is_empty() || corrected == code {
                warn!(attempt, "Model returned same or empty code, stopping correction loop");
                break;
            }
            info!(attempt, chars = corrected.len(), "Received corrected code");
            code = corrected;
            if let Some(last) = history.last_mut() {
                last.resolved = Validator::validate(&code).is_acceptable();
            }
        }

        let validation = Validator::validate(&code);
        info!(
            attempts = history.len(),
            syntax_valid = validation.syntax_valid(),
            "Self-correction finished"
        );
        CorrectionOutcome {
            attempts: history.len(),
            history,
            final_syntax_valid: validation.syntax_valid(),
            final_structure_valid: validation.structure_valid(),
            final_issues: validation.structure_messages(),
            code,
            usage,
        }
    }
}
