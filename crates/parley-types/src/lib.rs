//! Shared domain types for Parley.
//!
//! This crate contains the domain types used across the Parley workspace:
//! conversations, chat messages and their lifecycle enums, LLM request and
//! streaming shapes, configuration, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
