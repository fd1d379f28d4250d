//! Model-call accounting folded into workflow metrics.

use serde::Serialize;

use qa_llm::Completion;

/// Response time and tokens summed over one operation's model calls.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Usage {
    pub response_time: f64,
    pub tokens_used: u64,
}

impl Usage {
    pub fn of(completion: &Completion) -> Self {
        Self {
            response_time: completion.response_time,
            tokens_used: completion.tokens_used,
        }
    }

    pub fn add(&mut self, completion: &Completion) {
        self.response_time += completion.response_time;
        self.tokens_used += completion.tokens_used;
    }

    pub fn merge(self, other: Usage) -> Self {
        Self {
            response_time: self.response_time + other.response_time,
            tokens_used: self.tokens_used + other.tokens_used,
        }
    }
}
