//! Infrastructure layer for Parley.
//!
//! Contains implementations of the ports defined in `parley-core`: SQLite
//! storage for conversations and messages, the configuration loader, and
//! the built-in generation backends.

pub mod config;
pub mod llm;
pub mod sqlite;
