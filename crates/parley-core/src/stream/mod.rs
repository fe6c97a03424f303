//! In-flight generation tracking.

pub mod registry;

pub use registry::{RegistryError, StreamRegistry};
