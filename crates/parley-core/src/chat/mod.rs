//! Generation drivers and the chat lifecycle operations built on them.

pub mod driver;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use driver::{Generation, GenerationDriver};
pub use service::{ChatService, NewConversation, PreparedGeneration, StartChat};
