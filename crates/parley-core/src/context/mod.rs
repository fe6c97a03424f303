//! Context window management.
//!
//! - `tokens`: tokenizer selection and per-message token counting
//! - `budget`: how much of a model's context length history may use
//! - `window`: trims conversation history into the budget

pub mod budget;
pub mod tokens;
pub mod window;

pub use budget::TokenBudget;
pub use tokens::{MESSAGE_OVERHEAD_TOKENS, TokenCounter, select_encoding};
pub use window::ContextWindow;
