//! Conversation and chat message types for Parley.
//!
//! These types model persisted conversations and the messages within them,
//! including the assistant generation lifecycle
//! (`pending -> streaming -> completed | stopped | failed`) and version
//! links created by regeneration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

// Re-export the shared enums (used in both chat and llm contexts).
pub use crate::llm::{MessageRole, StopReason};

/// Lifecycle status of a chat message.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (status IN ('pending', 'streaming', 'completed', 'stopped', 'failed'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Streaming,
    Completed,
    Stopped,
    Failed,
}

impl MessageStatus {
    /// Whether generation for this message has ended.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MessageStatus::Completed | MessageStatus::Stopped | MessageStatus::Failed
        )
    }

    /// Only finished messages may receive user feedback.
    pub fn accepts_feedback(self) -> bool {
        self.is_terminal()
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageStatus::Pending => write!(f, "pending"),
            MessageStatus::Streaming => write!(f, "streaming"),
            MessageStatus::Completed => write!(f, "completed"),
            MessageStatus::Stopped => write!(f, "stopped"),
            MessageStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(MessageStatus::Pending),
            "streaming" => Ok(MessageStatus::Streaming),
            "completed" => Ok(MessageStatus::Completed),
            "stopped" => Ok(MessageStatus::Stopped),
            "failed" => Ok(MessageStatus::Failed),
            other => Err(format!("invalid message status: '{other}'")),
        }
    }
}

/// User feedback on a finished assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Like,
    Dislike,
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::Like => write!(f, "like"),
            Feedback::Dislike => write!(f, "dislike"),
        }
    }
}

impl FromStr for Feedback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "like" => Ok(Feedback::Like),
            "dislike" => Ok(Feedback::Dislike),
            other => Err(format!("invalid feedback: '{other}'")),
        }
    }
}

/// A conversation grouping an ordered list of messages.
///
/// `message_count` and `tokens_used` are aggregates kept consistent by the
/// repository when messages are added, cleared, or regenerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: Option<String>,
    /// Model used when none is given on a request.
    pub model_id: Option<String>,
    /// Instructions placed as the first system turn of every request.
    pub system_prompt: Option<String>,
    pub message_count: u32,
    pub tokens_used: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(title: Option<String>, model_id: Option<String>, system_prompt: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            title,
            model_id,
            system_prompt,
            message_count: 0,
            tokens_used: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single turn within a conversation.
///
/// Messages are ordered by `created_at` within a conversation. Assistant
/// messages carry generation metadata (status, stop reason, usage, latency).
/// Regeneration never mutates an assistant message in place: it creates a
/// new row whose `parent_id` points at the original and deactivates the
/// original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub status: MessageStatus,
    pub content: String,
    pub error: Option<String>,
    pub stop_reason: Option<StopReason>,
    /// The message this one regenerates.
    pub parent_id: Option<Uuid>,
    pub regenerate_count: u32,
    pub is_active: bool,
    /// Model that produced this message (assistant messages only).
    pub model_id: Option<String>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// Generation latency in milliseconds (assistant messages only).
    pub latency_ms: Option<u64>,
    pub feedback: Option<Feedback>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatMessage {
    fn blank(conversation_id: Uuid, role: MessageRole, status: MessageStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            conversation_id,
            role,
            status,
            content: String::new(),
            error: None,
            stop_reason: None,
            parent_id: None,
            regenerate_count: 0,
            is_active: true,
            model_id: None,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            latency_ms: None,
            feedback: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A user turn, persisted as already completed.
    pub fn user(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::blank(conversation_id, MessageRole::User, MessageStatus::Completed)
        }
    }

    /// A fresh assistant turn awaiting generation.
    pub fn pending_assistant(conversation_id: Uuid, model_id: impl Into<String>) -> Self {
        Self {
            model_id: Some(model_id.into()),
            ..Self::blank(conversation_id, MessageRole::Assistant, MessageStatus::Pending)
        }
    }

    /// A pending assistant turn that regenerates `original`.
    ///
    /// Keeps the original's `created_at` so the new version holds the same
    /// place in the conversation. Ties sort by id, which puts it right after
    /// the original.
    pub fn regeneration_of(original: &ChatMessage, model_id: impl Into<String>) -> Self {
        Self {
            parent_id: Some(original.id),
            regenerate_count: original.regenerate_count + 1,
            created_at: original.created_at,
            ..Self::pending_assistant(original.conversation_id, model_id)
        }
    }

    /// Record the end of generation for this message.
    pub fn finish(&mut self, status: MessageStatus, stop_reason: StopReason) {
        self.status = status;
        self.stop_reason = Some(stop_reason);
        self.updated_at = Utc::now();
    }
}
