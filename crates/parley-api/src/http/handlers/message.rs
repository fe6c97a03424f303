//! Message HTTP handlers.
//!
//! - GET  /api/v1/messages/{id}
//! - POST /api/v1/messages/{id}/feedback

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use parley_types::chat::{ChatMessage, Feedback};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestMeta};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    pub feedback: Feedback,
}

/// GET /api/v1/messages/{id} - Get a single message.
pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ChatMessage>>, AppError> {
    let meta = RequestMeta::start();
    let message = state.chat_service.get_message(id).await?;
    Ok(meta.respond(message))
}

/// POST /api/v1/messages/{id}/feedback - Like or dislike a finished reply.
pub async fn submit_feedback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<FeedbackBody>,
) -> Result<Json<ApiResponse<ChatMessage>>, AppError> {
    let meta = RequestMeta::start();
    let message = state.chat_service.submit_feedback(id, body.feedback).await?;
    Ok(meta.respond(message))
}
