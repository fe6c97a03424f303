//! Conversational streaming engine for Parley.
//!
//! This crate holds the generation core and defines the "ports" (repository
//! and provider traits) that the infrastructure layer implements. It depends
//! only on `parley-types` -- never on `parley-infra` or any database/HTTP crate.

pub mod chat;
pub mod context;
pub mod llm;
pub mod repository;
pub mod sse;
pub mod stream;
