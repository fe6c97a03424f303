//! Development backend that echoes the latest user turn.
//!
//! Streams the reply word by word so the SSE path can be exercised end to
//! end without a vendor. `max_tokens` is honored as a word cap, reported as
//! a `max_tokens` finish.

use std::time::Duration;

use parley_core::llm::{LlmProvider, StreamEventStream};
use parley_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, MessageRole, StopReason, StreamEvent,
};

/// Echo backend with an optional delay between chunks.
#[derive(Debug, Clone, Default)]
pub struct EchoProvider {
    chunk_delay: Option<Duration>,
}

impl EchoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }
}

/// Reply chunks for `request` and the reason the reply ends.
fn reply_chunks(request: &CompletionRequest) -> Result<(Vec<String>, StopReason), LlmError> {
    let last_user = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .ok_or_else(|| LlmError::InvalidRequest("no user message to echo".to_string()))?;

    let words: Vec<&str> = last_user.content.split_whitespace().collect();
    let limit = request.max_tokens.map_or(words.len(), |m| m as usize);
    let stop_reason = if words.len() > limit {
        StopReason::MaxTokens
    } else {
        StopReason::EndTurn
    };

    let chunks = words
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, w)| if i == 0 { (*w).to_string() } else { format!(" {w}") })
        .collect();
    Ok((chunks, stop_reason))
}

impl LlmProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (chunks, stop_reason) = reply_chunks(request)?;
        Ok(CompletionResponse {
            content: chunks.concat(),
            model: request.model.clone(),
            stop_reason: Some(stop_reason),
            usage: None,
        })
    }

    fn stream(&self, request: CompletionRequest) -> StreamEventStream {
        let delay = self.chunk_delay;
        Box::pin(async_stream::try_stream! {
            let (chunks, stop_reason) = reply_chunks(&request)?;
            for text in chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield StreamEvent::TextDelta { text };
            }
            yield StreamEvent::Finish { stop_reason };
            yield StreamEvent::Done;
        })
    }
}
