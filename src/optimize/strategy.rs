use crate::error::{Error, Result};
use crate::models::{ModelConfig, Prompt};
use crate::optimize::dataset::Record;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A pluggable algorithm that computes an improved template.
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn optimize(
        &self,
        prompt: &Prompt,
        dataset: &[Record],
        model: &ModelConfig,
    ) -> Result<String>;
}

/// Strategies available to one engine, keyed by name.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `strategy` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, strategy: Arc<dyn Strategy>) -> &mut Self {
        self.strategies.insert(name.into(), strategy);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Strategy>> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownStrategy {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.strategies.keys().cloned().collect()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}
