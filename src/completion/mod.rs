//! Text-completion capability used by optimization strategies.
//!
//! The core only depends on [`CompletionClient`]; [`HttpCompletionClient`]
//! is the stock backend wired up by the binary.

mod http;

pub use http::HttpCompletionClient;

use crate::error::{Error, Result};
use crate::models::ModelConfig;
use async_trait::async_trait;

/// One single-turn completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub credential: Option<String>,
}

impl CompletionRequest {
    /// Build a request for `config`, reading its credential variable now.
    ///
    /// Fails with `MissingCredential` if the config names a variable that is
    /// not set.
    pub fn for_model(config: &ModelConfig, prompt: impl Into<String>) -> Result<Self> {
        let credential = match &config.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| Error::MissingCredential {
                model: config.name.clone(),
                var: var.clone(),
            })?),
            None => None,
        };
        Ok(Self {
            provider: config.provider.clone(),
            model: config.model.clone(),
            prompt: prompt.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            credential,
        })
    }

    /// Same request with different prompt text.
    pub fn with_prompt(&self, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..self.clone()
        }
    }
}

/// Anything that can turn a prompt into completion text.
///
/// Failures are opaque to the core; callers decide whether they are fatal.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String>;
}
