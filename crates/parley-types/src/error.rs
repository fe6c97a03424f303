use thiserror::Error;
use uuid::Uuid;

use crate::chat::{MessageRole, MessageStatus};
use crate::llm::LlmError;

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by the chat lifecycle operations (start, stop, regenerate).
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("conversation {0} not found")]
    ConversationNotFound(Uuid),

    #[error("message {0} not found")]
    MessageNotFound(Uuid),

    #[error("message {id} has role {actual}, expected {expected}")]
    InvalidRole {
        id: Uuid,
        expected: MessageRole,
        actual: MessageRole,
    },

    #[error("message {id} is {actual}, operation requires {expected}")]
    InvalidStatus {
        id: Uuid,
        expected: String,
        actual: MessageStatus,
    },

    #[error("backend error: {0}")]
    Backend(#[from] LlmError),

    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),
}

impl ChatError {
    /// Whether the error is a caller mistake (reported immediately, never retried).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ChatError::Validation(_) | ChatError::InvalidRole { .. } | ChatError::InvalidStatus { .. }
        )
    }
}
