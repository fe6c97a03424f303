//! SQLite connection pools for the chat store.
//!
//! Streaming drivers persist every status transition while HTTP handlers list
//! conversations, so reads and writes are split: a read-only pool sized from
//! [`DatabaseConfig::max_readers`] and a single writer connection that
//! serializes all mutations. Both run in WAL mode with foreign keys on, which
//! the `chat_messages -> conversations` cascade relies on.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use parley_types::config::DatabaseConfig;

/// Reader and writer pools over one SQLite database.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open both pools and bring the schema up to date.
    ///
    /// Migrations run on the writer before the reader pool opens, so readers
    /// never observe a half-migrated schema.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(&config.url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(base_opts.clone())
            .await?;

        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(config.max_readers.max(1))
            .connect_with(base_opts.read_only(true))
            .await?;

        tracing::debug!(
            url = %config.url,
            max_readers = config.max_readers.max(1),
            "chat store opened"
        );
        Ok(Self { reader, writer })
    }

    /// Open a pool on `url` with default pool settings.
    pub async fn open(url: &str) -> Result<Self, sqlx::Error> {
        Self::new(&DatabaseConfig::with_url(url)).await
    }
}
