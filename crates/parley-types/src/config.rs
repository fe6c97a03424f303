//! Configuration types for Parley.
//!
//! `AppConfig` represents the top-level `parley.toml` that controls the HTTP
//! listener, storage, context window budgeting, tokenizer selection, logging,
//! and the set of served models. Every field has a serde default so an empty
//! file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level configuration for a Parley deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub tokenizer: TokenizerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Models exposed to clients, each bound to a backend.
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interval between SSE keep-alive comments, in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_keep_alive_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Connections in the read-only pool. The writer always has one.
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,

    /// How long a connection waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_url() -> String {
    "sqlite://parley.db?mode=rwc".to_string()
}

fn default_max_readers() -> u32 {
    8
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl DatabaseConfig {
    /// Defaults for everything but the URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_readers: default_max_readers(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Context window budgeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Share of the context length held back for the reply and new input.
    #[serde(default = "default_reply_reserve_percent")]
    pub reply_reserve_percent: u32,
    /// Context length assumed for models that do not declare one.
    #[serde(default = "default_context_length")]
    pub default_context_length: u32,
}

fn default_reply_reserve_percent() -> u32 {
    20
}

fn default_context_length() -> u32 {
    8_192
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            reply_reserve_percent: default_reply_reserve_percent(),
            default_context_length: default_context_length(),
        }
    }
}

/// A BPE encoding usable for token counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    O200kBase,
    Cl100kBase,
    P50kBase,
    R50kBase,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::O200kBase => write!(f, "o200k_base"),
            Encoding::Cl100kBase => write!(f, "cl100k_base"),
            Encoding::P50kBase => write!(f, "p50k_base"),
            Encoding::R50kBase => write!(f, "r50k_base"),
        }
    }
}

/// Maps a model-name prefix to an encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyPrefix {
    pub prefix: String,
    pub encoding: Encoding,
}

impl FamilyPrefix {
    pub fn new(prefix: impl Into<String>, encoding: Encoding) -> Self {
        Self {
            prefix: prefix.into(),
            encoding,
        }
    }
}

/// Tokenizer selection policy for models the tokenizer's own table does not know.
///
/// Prefixes are checked in order; the first match wins, so more specific
/// prefixes (`gpt-4o`) must precede broader ones (`gpt-4`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default = "default_family_prefixes")]
    pub family_prefixes: Vec<FamilyPrefix>,
    #[serde(default = "default_claude_prefix")]
    pub claude_prefix: String,
    /// Claude models have no public tokenizer; they borrow this encoding.
    #[serde(default = "default_claude_encoding")]
    pub claude_encoding: Encoding,
    #[serde(default = "default_encoding")]
    pub default_encoding: Encoding,
}

fn default_family_prefixes() -> Vec<FamilyPrefix> {
    vec![
        FamilyPrefix::new("gpt-4o", Encoding::O200kBase),
        FamilyPrefix::new("gpt-4", Encoding::Cl100kBase),
        FamilyPrefix::new("gpt-3.5-turbo", Encoding::Cl100kBase),
        FamilyPrefix::new("o1", Encoding::O200kBase),
    ]
}

fn default_claude_prefix() -> String {
    "claude-".to_string()
}

fn default_claude_encoding() -> Encoding {
    Encoding::Cl100kBase
}

fn default_encoding() -> Encoding {
    Encoding::Cl100kBase
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            family_prefixes: default_family_prefixes(),
            claude_prefix: default_claude_prefix(),
            claude_encoding: default_claude_encoding(),
            default_encoding: default_encoding(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
    /// Bridge spans to OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
            otel: false,
        }
    }
}

/// One served model and the backend that generates for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    /// Backend kind (e.g. "echo").
    pub provider: String,
    #[serde(default)]
    pub context_length: Option<u32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    /// Artificial delay between streamed chunks (development backends).
    #[serde(default)]
    pub chunk_delay_ms: Option<u64>,
}
