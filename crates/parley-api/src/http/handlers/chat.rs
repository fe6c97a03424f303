//! Generation endpoints: start, stop, regenerate.
//!
//! - POST /api/v1/chat/completions
//! - POST /api/v1/chat/stop
//! - POST /api/v1/chat/regenerate
//!
//! With `stream: true` the response is `text/event-stream`: one `message`
//! event per chunk, then `stopped` or `error` if the generation did not
//! complete, a `done` event carrying the final message, and `[DONE]`.
//! Dropping the response body (client disconnect) cancels the generation.
//!
//! Frames come pre-encoded from the core SSE encoder, so the body is a raw
//! byte stream with its own keep-alive ticker rather than axum's `Sse`.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use parley_core::chat::{PreparedGeneration, StartChat};
use parley_core::sse::{ChannelSink, SSE_HEADERS};

use crate::http::error::AppError;
use crate::http::response::RequestMeta;
use crate::state::AppState;

/// Frames buffered between the generation task and the response body.
const SINK_CAPACITY: usize = 64;

/// SSE comment line; clients ignore it, proxies see traffic.
const KEEP_ALIVE_FRAME: &[u8] = b": keep-alive\n\n";

/// Request body for POST /chat/completions.
#[derive(Debug, Deserialize)]
pub struct CompletionBody {
    pub conversation_id: Option<Uuid>,
    pub model_id: String,
    pub messages: Vec<String>,
    #[serde(default)]
    pub stream: bool,
    pub system_prompt: Option<String>,
}

/// Request body for POST /chat/stop.
#[derive(Debug, Deserialize)]
pub struct StopBody {
    pub message_id: Uuid,
}

/// Request body for POST /chat/regenerate.
#[derive(Debug, Deserialize)]
pub struct RegenerateBody {
    pub message_id: Uuid,
    #[serde(default)]
    pub stream: bool,
}

/// POST /api/v1/chat/completions - record user turns and generate a reply.
pub async fn completions(
    State(state): State<AppState>,
    Json(body): Json<CompletionBody>,
) -> Result<Response, AppError> {
    let meta = RequestMeta::start();
    let prepared = state
        .chat_service
        .start(StartChat {
            conversation_id: body.conversation_id,
            model_id: body.model_id,
            messages: body.messages,
            stream: body.stream,
            system_prompt: body.system_prompt,
        })
        .await?;

    respond(&state, prepared, meta).await
}

/// POST /api/v1/chat/regenerate - produce a new version of an assistant reply.
pub async fn regenerate(
    State(state): State<AppState>,
    Json(body): Json<RegenerateBody>,
) -> Result<Response, AppError> {
    let meta = RequestMeta::start();
    let prepared = state
        .chat_service
        .regenerate(body.message_id, body.stream)
        .await?;

    respond(&state, prepared, meta).await
}

/// POST /api/v1/chat/stop - cancel a streaming generation.
pub async fn stop(
    State(state): State<AppState>,
    Json(body): Json<StopBody>,
) -> Result<Response, AppError> {
    let meta = RequestMeta::start();
    let message = state.chat_service.stop(body.message_id).await?;
    Ok(meta.respond(message).into_response())
}

async fn respond(
    state: &AppState,
    prepared: PreparedGeneration,
    meta: RequestMeta,
) -> Result<Response, AppError> {
    if prepared.stream {
        return Ok(stream_response(state, prepared));
    }
    let message = state.chat_service.dispatch(prepared).await?;
    Ok(meta.respond(message).into_response())
}

/// Spawn the streaming driver and return an SSE response fed by its sink.
fn stream_response(state: &AppState, prepared: PreparedGeneration) -> Response {
    let (sink, rx) = ChannelSink::channel(SINK_CAPACITY);
    let scope = CancellationToken::new();
    let guard = scope.clone().drop_guard();

    let service = state.chat_service.clone();
    tokio::spawn(async move {
        service.dispatch_stream(prepared, &scope, &sink).await;
    });

    let mut response = Response::new(Body::from_stream(sse_body(rx, guard, state.keep_alive)));
    let headers = response.headers_mut();
    for (name, value) in SSE_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    response
}

/// Response body: sink frames interleaved with keep-alive comments.
///
/// Owns the scope's drop guard, so dropping the body cancels the generation.
fn sse_body(
    mut rx: mpsc::Receiver<Bytes>,
    guard: DropGuard,
    keep_alive: Option<Duration>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        let _guard = guard;
        let mut ticker = keep_alive.map(|period| tokio::time::interval_at(Instant::now() + period, period));
        loop {
            tokio::select! {
                frame = rx.recv() => match frame {
                    Some(frame) => yield Ok(frame),
                    None => break,
                },
                _ = tick(&mut ticker) => yield Ok(Bytes::from_static(KEEP_ALIVE_FRAME)),
            }
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_sse_body_forwards_frames_then_ends() {
        let (tx, rx) = mpsc::channel(4);
        let scope = CancellationToken::new();
        let body = sse_body(rx, scope.clone().drop_guard(), None);

        tx.send(Bytes::from_static(b"data: a\n\n")).await.unwrap();
        drop(tx);

        let frames: Vec<Bytes> = body.map(|f| f.unwrap()).collect().await;
        assert_eq!(frames, vec![Bytes::from_static(b"data: a\n\n")]);
        assert!(scope.is_cancelled(), "body finished, guard dropped");
    }

    #[tokio::test]
    async fn test_dropping_body_cancels_scope() {
        let (_tx, rx) = mpsc::channel::<Bytes>(4);
        let scope = CancellationToken::new();
        let body = sse_body(rx, scope.clone().drop_guard(), None);
        assert!(!scope.is_cancelled());
        drop(body);
        assert!(scope.is_cancelled());
    }

    #[tokio::test]
    async fn test_keep_alive_comment_when_idle() {
        let (_tx, rx) = mpsc::channel::<Bytes>(4);
        let scope = CancellationToken::new();
        let body = sse_body(rx, scope.drop_guard(), Some(Duration::from_millis(20)));
        let mut body = std::pin::pin!(body);

        let frame = body.next().await.unwrap().unwrap();
        assert_eq!(frame, Bytes::from_static(KEEP_ALIVE_FRAME));
    }
}
