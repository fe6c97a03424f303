//! ChatRepository trait definition.
//!
//! Provides CRUD operations for conversations and their messages, plus the
//! few multi-row units of work the lifecycle operations need.

use parley_types::chat::{ChatMessage, Conversation, MessageStatus};
use parley_types::error::RepositoryError;
use uuid::Uuid;

/// Narrows a message listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFilter {
    /// Only messages with `is_active = true`.
    pub active_only: bool,
    /// Only messages in this status.
    pub status: Option<MessageStatus>,
}

impl MessageFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn active() -> Self {
        Self {
            active_only: true,
            status: None,
        }
    }

    /// Active, completed messages: what a generation request may see as history.
    pub fn history() -> Self {
        Self {
            active_only: true,
            status: Some(MessageStatus::Completed),
        }
    }

    pub fn matches(&self, message: &ChatMessage) -> bool {
        (!self.active_only || message.is_active)
            && self.status.is_none_or(|s| s == message.status)
    }
}

/// Repository trait for conversation and message persistence.
///
/// Implementations live in parley-infra (e.g., `SqliteChatRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
///
/// Updates are last-write-wins; a single `update_message` must be atomic.
pub trait ChatRepository: Send + Sync {
    fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<Conversation, RepositoryError>> + Send;

    fn get_conversation(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// List conversations, newest first.
    fn list_conversations(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<Conversation>, RepositoryError>> + Send;

    /// Update title, model and system prompt. Counters are owned by the repository.
    fn update_conversation(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a conversation and all of its messages.
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    fn delete_conversation(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Remove every message of a conversation and reset `message_count` and
    /// `tokens_used` to 0. The conversation record itself is kept.
    fn clear_messages(
        &self,
        conversation_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Add `tokens` to the conversation's `tokens_used`.
    fn add_conversation_tokens(
        &self,
        conversation_id: &Uuid,
        tokens: u64,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Insert a message and increment its conversation's `message_count`.
    fn create_message(
        &self,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_message(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ChatMessage>, RepositoryError>> + Send;

    /// Messages of a conversation in creation order.
    fn list_messages(
        &self,
        conversation_id: &Uuid,
        filter: MessageFilter,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Persist every mutable field of an existing message.
    ///
    /// Returns `RepositoryError::NotFound` if the row does not exist.
    fn update_message(
        &self,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Mark a message still `pending` or `streaming` as stopped by the user.
    ///
    /// Only status, stop reason and `updated_at` change, so a driver that
    /// already wrote the final content is never clobbered. Returns whether
    /// the row changed.
    fn mark_stopped(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// In one transaction: persist `original` (already deactivated by the
    /// caller) and insert `replacement`, incrementing `message_count`.
    fn replace_message(
        &self,
        original: &ChatMessage,
        replacement: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
