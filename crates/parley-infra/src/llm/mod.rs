//! Generation backend implementations.
//!
//! Contains concrete implementations of the [`LlmProvider`] trait defined in
//! `parley-core`, plus the factory that turns the configured `[[models]]`
//! into a [`ModelRegistry`].
//!
//! [`LlmProvider`]: parley_core::llm::LlmProvider

pub mod echo;

use std::sync::Arc;
use std::time::Duration;

use parley_core::llm::{BoxLlmProvider, ModelRegistry};
use parley_types::config::{AppConfig, ModelConfig};
use parley_types::llm::{LlmError, ModelInfo};

use self::echo::EchoProvider;

/// Create a [`BoxLlmProvider`] for one configured model.
///
/// # Errors
///
/// Returns [`LlmError::InvalidRequest`] for an unknown backend kind.
pub fn create_provider(config: &ModelConfig) -> Result<BoxLlmProvider, LlmError> {
    match config.provider.as_str() {
        "echo" => {
            let mut provider = EchoProvider::new();
            if let Some(ms) = config.chunk_delay_ms {
                provider = provider.with_chunk_delay(Duration::from_millis(ms));
            }
            Ok(BoxLlmProvider::new(provider))
        }
        other => Err(LlmError::InvalidRequest(format!(
            "unknown provider '{other}' for model '{}'",
            config.id
        ))),
    }
}

/// Build the registry of served models from configuration.
///
/// Models that omit `context_length` get `context.default_context_length`.
pub fn build_model_registry(config: &AppConfig) -> Result<ModelRegistry, LlmError> {
    let mut registry = ModelRegistry::new();
    for model in &config.models {
        let provider = create_provider(model)?;
        let info = ModelInfo {
            id: model.id.clone(),
            provider: provider.name().to_string(),
            context_length: model
                .context_length
                .unwrap_or(config.context.default_context_length),
            max_output_tokens: model.max_output_tokens,
        };
        tracing::debug!(model = %info.id, provider = %info.provider, context_length = info.context_length, "Registered model");
        registry.register(info, Arc::new(provider));
    }
    Ok(registry)
}
