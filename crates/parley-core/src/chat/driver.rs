//! Generation drivers.
//!
//! Each assistant message goes through
//! `pending -> streaming -> completed | stopped | failed` when streamed, or
//! `pending -> completed | failed` when generated in one shot. Every
//! transition is persisted as it happens.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parley_types::chat::{ChatMessage, MessageStatus};
use parley_types::error::ChatError;
use parley_types::llm::{CompletionRequest, LlmError, StopReason, StreamEvent, Usage};

use crate::context::TokenCounter;
use crate::llm::{BoxLlmProvider, StreamEventStream};
use crate::repository::ChatRepository;
use crate::sse::{EventData, EventSink, SinkError, SseEvent};
use crate::stream::StreamRegistry;

/// SSE event names emitted while streaming.
pub mod events {
    pub const MESSAGE: &str = "message";
    pub const STOPPED: &str = "stopped";
    pub const ERROR: &str = "error";
    pub const DONE: &str = "done";
}

/// Everything needed to run one generation for one assistant message.
#[derive(Debug)]
pub struct Generation {
    /// The assistant message being generated, in `pending` status.
    pub message: ChatMessage,
    pub request: CompletionRequest,
    pub provider: Arc<BoxLlmProvider>,
    /// Used to estimate usage when the backend reports none.
    pub counter: TokenCounter,
}

#[derive(Serialize)]
struct ChunkPayload<'a> {
    content: &'a str,
    delta: &'a str,
}

#[derive(Serialize)]
struct StoppedPayload {
    message_id: Uuid,
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    message_id: Uuid,
    error: &'a str,
}

enum Outcome {
    Cancelled,
    Finished,
    Failed(LlmError),
}

/// Runs generations against a backend and records their outcome.
pub struct GenerationDriver<R: ChatRepository> {
    repo: Arc<R>,
    registry: Arc<StreamRegistry>,
}

impl<R: ChatRepository> GenerationDriver<R> {
    pub fn new(repo: Arc<R>, registry: Arc<StreamRegistry>) -> Self {
        Self { repo, registry }
    }

    /// Stream a generation to `sink`, returning the message in its final state.
    ///
    /// Cancelling `parent` (or stopping the message through the registry)
    /// ends the generation as `stopped`. Backend errors end it as `failed`
    /// and are reported on the sink, never returned. The sink always
    /// receives a `done` event with the final message followed by the
    /// completion sentinel.
    pub async fn stream<S: EventSink>(
        &self,
        generation: Generation,
        parent: &CancellationToken,
        sink: &S,
    ) -> ChatMessage {
        let Generation {
            mut message,
            request,
            provider,
            counter,
        } = generation;
        let started = Instant::now();
        let id = message.id;
        let scope = parent.child_token();

        let registered = match self.registry.register(id, scope.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!(message_id = %id, error = %e, "stream registration conflict, continuing without stop support");
                false
            }
        };

        message.status = MessageStatus::Streaming;
        message.updated_at = chrono::Utc::now();
        self.persist(&message).await;
        info!(
            message_id = %id,
            conversation_id = %message.conversation_id,
            model = %request.model,
            "generation started"
        );

        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(pump(provider.stream(request.clone()), tx, scope.clone()));

        let mut usage: Option<Usage> = None;
        let mut finish: Option<StopReason> = None;

        let outcome = loop {
            tokio::select! {
                biased;
                _ = scope.cancelled() => break Outcome::Cancelled,
                next = rx.recv() => match next {
                    None | Some(Ok(StreamEvent::Done)) => break Outcome::Finished,
                    Some(Ok(StreamEvent::TextDelta { text })) => {
                        message.content.push_str(&text);
                        let payload = ChunkPayload { content: &message.content, delta: &text };
                        if let Some(event) = build_event(events::MESSAGE, id, &payload)
                            && let Err(SinkError::Closed) = sink.send(event).await
                        {
                            debug!(message_id = %id, "client went away, cancelling generation");
                            scope.cancel();
                        }
                    }
                    Some(Ok(StreamEvent::Finish { stop_reason })) => finish = Some(stop_reason),
                    Some(Ok(StreamEvent::Usage(u))) => usage = Some(u),
                    Some(Err(LlmError::Cancelled)) => break Outcome::Cancelled,
                    Some(Err(e)) => break Outcome::Failed(e),
                },
            }
        };

        message.latency_ms = Some(elapsed_ms(started));
        match outcome {
            Outcome::Cancelled => {
                message.finish(MessageStatus::Stopped, StopReason::User);
                message.is_active = false;
                self.persist(&message).await;
                info!(message_id = %id, chars = message.content.len(), "generation stopped");
                if let Some(event) = build_event(events::STOPPED, id, &StoppedPayload { message_id: id }) {
                    self.send_quiet(sink, event).await;
                }
            }
            Outcome::Finished => {
                let usage = usage.unwrap_or_else(|| estimate_usage(&counter, &request, &message.content));
                message.finish(MessageStatus::Completed, finish.unwrap_or(StopReason::EndTurn));
                apply_usage(&mut message, usage);
                self.persist(&message).await;
                self.record_tokens(&message, usage).await;
                info!(
                    message_id = %id,
                    total_tokens = usage.total_tokens,
                    latency_ms = message.latency_ms.unwrap_or_default(),
                    "generation completed"
                );
            }
            Outcome::Failed(e) => {
                let text = e.to_string();
                message.finish(MessageStatus::Failed, StopReason::Error);
                message.error = Some(text.clone());
                self.persist(&message).await;
                error!(message_id = %id, error = %text, "generation failed");
                let payload = ErrorPayload { message_id: id, error: &text };
                if let Some(event) = build_event(events::ERROR, id, &payload) {
                    self.send_quiet(sink, event).await;
                }
            }
        }

        // The entry belongs to whoever registered first.
        if registered {
            self.registry.unregister(id);
        }
        // Releases the pump and anything in the backend watching the scope.
        scope.cancel();

        if let Some(event) = build_event(events::DONE, id, &message) {
            self.send_quiet(sink, event).await;
        }
        sink.done().await;
        message
    }

    /// Generate in one shot. Backend errors are recorded and returned.
    pub async fn generate(&self, generation: Generation) -> Result<ChatMessage, ChatError> {
        let Generation {
            mut message,
            request,
            provider,
            counter,
        } = generation;
        let started = Instant::now();
        let id = message.id;

        info!(message_id = %id, model = %request.model, "generation started");
        let result = provider.complete(&request).await;
        message.latency_ms = Some(elapsed_ms(started));

        match result {
            Ok(response) => {
                message.content = response.content;
                let usage = response
                    .usage
                    .unwrap_or_else(|| estimate_usage(&counter, &request, &message.content));
                message.finish(
                    MessageStatus::Completed,
                    response.stop_reason.unwrap_or(StopReason::EndTurn),
                );
                apply_usage(&mut message, usage);
                self.persist(&message).await;
                self.record_tokens(&message, usage).await;
                info!(message_id = %id, total_tokens = usage.total_tokens, "generation completed");
                Ok(message)
            }
            Err(e) => {
                message.finish(MessageStatus::Failed, StopReason::Error);
                message.error = Some(e.to_string());
                self.persist(&message).await;
                error!(message_id = %id, error = %e, "generation failed");
                Err(ChatError::Backend(e))
            }
        }
    }

    async fn persist(&self, message: &ChatMessage) {
        if let Err(e) = self.repo.update_message(message).await {
            warn!(message_id = %message.id, status = %message.status, error = %e, "failed to persist message state");
        }
    }

    async fn record_tokens(&self, message: &ChatMessage, usage: Usage) {
        if usage.total_tokens == 0 {
            return;
        }
        if let Err(e) = self
            .repo
            .add_conversation_tokens(&message.conversation_id, u64::from(usage.total_tokens))
            .await
        {
            warn!(conversation_id = %message.conversation_id, error = %e, "failed to record token usage");
        }
    }

    async fn send_quiet<S: EventSink>(&self, sink: &S, event: SseEvent) {
        if let Err(e) = sink.send(event).await {
            debug!(error = %e, "dropping event for closed sink");
        }
    }
}

/// Forward backend events into the single-slot handoff until the stream
/// ends, errors, or the scope is cancelled. Never writes after cancellation.
async fn pump(
    mut stream: StreamEventStream,
    tx: mpsc::Sender<Result<StreamEvent, LlmError>>,
    scope: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = scope.cancelled() => return,
            item = stream.next() => item,
        };
        let Some(item) = item else { return };
        let last = item.is_err() || matches!(item, Ok(StreamEvent::Done));
        tokio::select! {
            biased;
            _ = scope.cancelled() => return,
            sent = tx.send(item) => if sent.is_err() { return },
        }
        if last {
            return;
        }
    }
}

fn build_event<T: Serialize + ?Sized>(name: &str, id: Uuid, payload: &T) -> Option<SseEvent> {
    match EventData::json(payload) {
        Ok(data) => Some(SseEvent::new().id(id.to_string()).event(name).data(data)),
        Err(e) => {
            warn!(event = name, error = %e, "failed to serialize event payload");
            None
        }
    }
}

fn estimate_usage(counter: &TokenCounter, request: &CompletionRequest, content: &str) -> Usage {
    Usage::new(counter.count_all(&request.messages), counter.count_text(content))
}

fn apply_usage(message: &mut ChatMessage, usage: Usage) {
    message.prompt_tokens = usage.prompt_tokens;
    message.completion_tokens = usage.completion_tokens;
    message.total_tokens = usage.total_tokens;
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
