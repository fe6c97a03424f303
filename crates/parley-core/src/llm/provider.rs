//! LlmProvider trait definition.
//!
//! Uses RPITIT for `complete` and `Pin<Box<dyn Stream>>` for `stream`
//! (streams need to be object-safe for the BoxLlmProvider wrapper).

use std::pin::Pin;

use futures_util::Stream;

use parley_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};

/// Chunk source returned by [`LlmProvider::stream`].
pub type StreamEventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// A generation backend.
///
/// Backends receive an ordered list of role-tagged messages and either return
/// the full completion or a pull-based stream of events. A stream ends either
/// with [`StreamEvent::Done`], by simply finishing, or with an error item.
///
/// Implementations live in parley-infra (e.g., `EchoProvider`).
pub trait LlmProvider: Send + Sync {
    /// Backend name (e.g., "echo").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Send a streaming completion request. Returns a stream of events.
    ///
    /// Returns a boxed stream (not RPITIT) because streams need to be
    /// object-safe for the `BoxLlmProvider` wrapper. The stream must not
    /// borrow `self`; it may be polled from a spawned task.
    fn stream(&self, request: CompletionRequest) -> StreamEventStream;
}
