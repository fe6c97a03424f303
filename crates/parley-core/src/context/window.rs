//! Sliding context window over conversation history.

use parley_types::config::{ContextConfig, TokenizerConfig};
use parley_types::llm::{Message, MessageRole, ModelInfo};

use super::budget::TokenBudget;
use super::tokens::TokenCounter;

/// Builds the message list sent to a backend so it fits a model's context.
///
/// System messages are always kept, in order, ahead of everything else.
/// Conversational turns (history followed by the new user input) are kept
/// whole when they fit; otherwise only the longest suffix that fits is kept.
/// Building never fails: overflow degrades by trimming.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    counter: TokenCounter,
    budget: TokenBudget,
}

impl ContextWindow {
    pub fn new(counter: TokenCounter, budget: TokenBudget) -> Self {
        Self { counter, budget }
    }

    pub fn for_model(info: &ModelInfo, context: &ContextConfig, tokenizer: &TokenizerConfig) -> Self {
        Self::new(
            TokenCounter::for_model(&info.id, tokenizer),
            TokenBudget::for_model(info, context.reply_reserve_percent),
        )
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    pub fn build<S: AsRef<str>>(&self, history: &[Message], new_inputs: &[S]) -> Vec<Message> {
        let (system, mut turns): (Vec<Message>, Vec<Message>) = history
            .iter()
            .cloned()
            .partition(|m| m.role == MessageRole::System);
        turns.extend(new_inputs.iter().map(|s| Message::user(s.as_ref())));

        let system_tokens = self.counter.count_all(&system);
        let remaining = self.budget.history_budget(system_tokens);

        let total_turns = turns.len();
        let kept = self.trim(turns, remaining);

        tracing::debug!(
            system = system.len(),
            system_tokens,
            remaining,
            turns = total_turns,
            kept = kept.len(),
            "built context window"
        );

        let mut out = system;
        out.extend(kept);
        out
    }

    fn trim(&self, turns: Vec<Message>, budget: u32) -> Vec<Message> {
        if self.counter.count_all(&turns) <= budget {
            return turns;
        }

        let mut used = 0u32;
        let mut start = turns.len();
        for (i, message) in turns.iter().enumerate().rev() {
            let cost = self.counter.count(Some(message));
            match used.checked_add(cost) {
                Some(total) if total <= budget => {
                    used = total;
                    start = i;
                }
                _ => break,
            }
        }
        turns.into_iter().skip(start).collect()
    }
}
