//! Application state wiring all services together.
//!
//! `ChatService` is generic over its repository; AppState pins it to the
//! SQLite implementation.

use std::sync::Arc;
use std::time::Duration;

use parley_core::chat::ChatService;
use parley_core::stream::StreamRegistry;
use parley_infra::llm::build_model_registry;
use parley_infra::sqlite::{DatabasePool, SqliteChatRepository};
use parley_types::config::AppConfig;

/// Concrete chat service pinned to the infra implementation.
pub type ConcreteChatService = ChatService<SqliteChatRepository>;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ConcreteChatService>,
    /// Interval between SSE keep-alive comments; `None` disables them.
    pub keep_alive: Option<Duration>,
}

impl AppState {
    /// Initialize the application state: connect to DB, build the model
    /// registry, wire the chat service.
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let db_pool = DatabasePool::new(&config.database).await?;
        let models = build_model_registry(config)?;
        if models.is_empty() {
            tracing::warn!("No models configured; every generation request will be rejected");
        }
        Ok(Self::from_parts(db_pool, models, config))
    }

    pub(crate) fn from_parts(
        db_pool: DatabasePool,
        models: parley_core::llm::ModelRegistry,
        config: &AppConfig,
    ) -> Self {
        let chat_service = ChatService::new(
            Arc::new(SqliteChatRepository::new(db_pool)),
            Arc::new(models),
            Arc::new(StreamRegistry::new()),
            config.context.clone(),
            config.tokenizer.clone(),
        );
        let keep_alive =
            (config.server.keep_alive_secs > 0).then(|| Duration::from_secs(config.server.keep_alive_secs));

        Self {
            chat_service: Arc::new(chat_service),
            keep_alive,
        }
    }
}
