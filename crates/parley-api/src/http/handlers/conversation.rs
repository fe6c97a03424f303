//! Conversation HTTP handlers.
//!
//! Endpoints:
//! - POST   /api/v1/conversations               - Create a conversation
//! - GET    /api/v1/conversations               - List conversations, newest first
//! - GET    /api/v1/conversations/{id}          - Get a single conversation
//! - DELETE /api/v1/conversations/{id}          - Delete a conversation and its messages
//! - POST   /api/v1/conversations/{id}/clear    - Clear messages but keep the conversation
//! - GET    /api/v1/conversations/{id}/messages - List messages in creation order

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use parley_core::chat::NewConversation;
use parley_types::chat::{ChatMessage, Conversation};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestMeta};
use crate::state::AppState;

/// Request body for conversation creation.
#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationBody {
    pub title: Option<String>,
    pub model_id: Option<String>,
    pub system_prompt: Option<String>,
}

/// Query parameters for conversation listing.
#[derive(Debug, Deserialize)]
pub struct ConversationListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Query parameters for message listing.
#[derive(Debug, Default, Deserialize)]
pub struct MessageListQuery {
    #[serde(default)]
    pub active_only: bool,
}

/// POST /api/v1/conversations - Create a conversation.
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(body): Json<CreateConversationBody>,
) -> Result<Json<ApiResponse<Conversation>>, AppError> {
    let meta = RequestMeta::start();
    let conversation = state
        .chat_service
        .create_conversation(NewConversation {
            title: body.title,
            model_id: body.model_id,
            system_prompt: body.system_prompt,
        })
        .await?;
    Ok(meta.respond(conversation))
}

/// GET /api/v1/conversations - List conversations.
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationListQuery>,
) -> Result<Json<ApiResponse<Vec<Conversation>>>, AppError> {
    let meta = RequestMeta::start();
    if query.limit < 0 || query.offset < 0 {
        return Err(AppError::Validation(
            "limit and offset must be non-negative".to_string(),
        ));
    }
    let conversations = state
        .chat_service
        .list_conversations(Some(query.limit), Some(query.offset))
        .await?;
    Ok(meta.respond(conversations))
}

/// GET /api/v1/conversations/{id} - Get a conversation by ID.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Conversation>>, AppError> {
    let meta = RequestMeta::start();
    let conversation = state.chat_service.get_conversation(id).await?;
    Ok(meta.respond(conversation))
}

/// DELETE /api/v1/conversations/{id} - Delete a conversation.
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let meta = RequestMeta::start();
    state.chat_service.delete_conversation(id).await?;
    Ok(meta.respond(serde_json::json!({ "deleted": true })))
}

/// POST /api/v1/conversations/{id}/clear - Remove all messages.
pub async fn clear_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Conversation>>, AppError> {
    let meta = RequestMeta::start();
    let conversation = state.chat_service.clear_conversation(id).await?;
    Ok(meta.respond(conversation))
}

/// GET /api/v1/conversations/{id}/messages - List a conversation's messages.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<ApiResponse<Vec<ChatMessage>>>, AppError> {
    let meta = RequestMeta::start();
    let messages = state
        .chat_service
        .list_messages(id, query.active_only)
        .await?;
    Ok(meta.respond(messages))
}
