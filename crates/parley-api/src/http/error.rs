//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use parley_types::error::ChatError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Lifecycle and management errors from the chat service.
    Chat(ChatError),
    /// Malformed request outside the service's own validation.
    Validation(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Chat(e) => {
                let (status, code) = match e {
                    ChatError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                    ChatError::InvalidRole { .. } => (StatusCode::BAD_REQUEST, "INVALID_ROLE"),
                    ChatError::InvalidStatus { .. } => (StatusCode::BAD_REQUEST, "INVALID_STATUS"),
                    ChatError::UnknownModel(_) => (StatusCode::NOT_FOUND, "MODEL_NOT_FOUND"),
                    ChatError::ConversationNotFound(_) => {
                        (StatusCode::NOT_FOUND, "CONVERSATION_NOT_FOUND")
                    }
                    ChatError::MessageNotFound(_) => (StatusCode::NOT_FOUND, "MESSAGE_NOT_FOUND"),
                    ChatError::Backend(_) => (StatusCode::BAD_GATEWAY, "BACKEND_ERROR"),
                    ChatError::Repository(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
                    }
                };
                (status, code, e.to_string())
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, error = %message, "request failed");
        }

        let body = ApiResponse::error(code, &message, String::new(), 0);
        (status, axum::Json(body)).into_response()
    }
}
