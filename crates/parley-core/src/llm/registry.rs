//! Model registry for runtime backend lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parley_types::llm::ModelInfo;

use super::box_provider::BoxLlmProvider;

/// A served model and the backend that generates for it.
#[derive(Debug, Clone)]
pub struct RegisteredModel {
    pub info: ModelInfo,
    pub provider: Arc<BoxLlmProvider>,
}

/// Registry of served models, indexed by model id.
///
/// Several models may share one backend instance.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, RegisteredModel>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model. An existing model with the same id is replaced.
    pub fn register(&mut self, info: ModelInfo, provider: Arc<BoxLlmProvider>) {
        self.models
            .insert(info.id.clone(), RegisteredModel { info, provider });
    }

    pub fn get(&self, model_id: &str) -> Option<&RegisteredModel> {
        self.models.get(model_id)
    }

    /// All registered models, sorted by id.
    pub fn list(&self) -> Vec<&ModelInfo> {
        let mut infos: Vec<&ModelInfo> = self.models.values().map(|m| &m.info).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
