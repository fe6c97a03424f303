//! Event sinks: where encoded SSE frames go.
//!
//! The generation driver writes through [`EventSink`] so it never knows what
//! transport sits behind it. [`ChannelSink`] is the production sink: it pushes
//! encoded frames into a bounded channel that the HTTP layer turns into a
//! response body.

use std::future::Future;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::encoder::SseEvent;

/// Errors from writing to a sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The receiving side went away (client disconnected).
    #[error("event sink closed")]
    Closed,

    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for streamed events.
///
/// Each `send` hands one complete event to the transport; there is no
/// buffering between events. `done` emits the completion sentinel and is
/// called exactly once per stream regardless of how it ended.
pub trait EventSink: Send + Sync {
    fn send(&self, event: SseEvent) -> impl Future<Output = Result<(), SinkError>> + Send;

    fn done(&self) -> impl Future<Output = ()> + Send;
}

/// Sink backed by a bounded `mpsc` channel of encoded frames.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiver the transport drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl EventSink for ChannelSink {
    async fn send(&self, event: SseEvent) -> Result<(), SinkError> {
        self.tx
            .send(event.to_bytes())
            .await
            .map_err(|_| SinkError::Closed)
    }

    async fn done(&self) {
        if self.tx.send(SseEvent::done().to_bytes()).await.is_err() {
            tracing::debug!("sink closed before completion sentinel");
        }
    }
}
