//! Token budget for a model's context window.
//!
//! Part of the context length is held back for the reply and the newly
//! submitted input. What remains is the "available" budget, from which system
//! messages are paid first; conversational history gets the rest.

use parley_types::llm::ModelInfo;

/// Allocation of one model's context length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub context_length: u32,
    /// Tokens held back for the reply.
    pub reserved: u32,
    /// Tokens usable for the prompt (system messages plus history).
    pub available: u32,
}

impl TokenBudget {
    /// Reserve `reserve_percent` (clamped to 100) of `context_length`.
    pub fn new(context_length: u32, reserve_percent: u32) -> Self {
        let percent = u64::from(reserve_percent.min(100));
        let reserved = (u64::from(context_length) * percent / 100) as u32;
        Self {
            context_length,
            reserved,
            available: context_length - reserved,
        }
    }

    pub fn for_model(info: &ModelInfo, reserve_percent: u32) -> Self {
        Self::new(info.context_length, reserve_percent)
    }

    /// Budget left for conversational turns once system messages are paid for.
    pub fn history_budget(&self, system_tokens: u32) -> u32 {
        self.available.saturating_sub(system_tokens)
    }
}
