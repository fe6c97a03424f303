//! Server-Sent Events wire encoding and delivery.
//!
//! - `encoder`: exact SSE framing for a single event
//! - `sink`: where encoded events go (an mpsc channel feeding the HTTP body)

pub mod encoder;
pub mod sink;

pub use encoder::{DONE_MARKER, EventData, SSE_HEADERS, SseEvent, encode};
pub use sink::{ChannelSink, EventSink, SinkError};
