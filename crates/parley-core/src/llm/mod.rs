//! Generation backend abstractions for Parley.
//!
//! - `LlmProvider`: RPITIT trait for concrete backend implementations
//! - `BoxLlmProvider`: object-safe wrapper for dynamic dispatch
//! - `ModelRegistry`: model id to backend lookup

pub mod box_provider;
pub mod provider;
pub mod registry;

pub use box_provider::BoxLlmProvider;
pub use provider::{LlmProvider, StreamEventStream};
pub use registry::{ModelRegistry, RegisteredModel};
