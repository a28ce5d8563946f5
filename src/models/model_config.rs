use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Provider families the stock completion backend can reach. `anthropic`
/// speaks the messages API; every other entry speaks OpenAI chat completions.
pub const SUPPORTED_PROVIDERS: &[&str] = &[
    "openai",
    "openai-compatible",
    "anthropic",
    "groq",
    "together",
    "mistral",
    "google",
    "cohere",
    "ollama",
];

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

/// A named model-access profile from the project's model registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Registry key.
    pub name: String,
    /// Backend family, e.g. `openai` or `anthropic`.
    pub provider: String,
    /// Backend-specific model identifier.
    pub model: String,
    /// Name of the environment variable holding the API key. Never the key itself.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl ModelConfig {
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            model: model.into(),
            api_key_env: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }

    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("model config name cannot be empty"));
        }
        if self.model.trim().is_empty() {
            return Err(Error::validation(format!(
                "model config '{}' has no model identifier",
                self.name
            )));
        }
        if !SUPPORTED_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(Error::validation(format!(
                "unsupported provider '{}' for model '{}' (supported: {})",
                self.provider,
                self.name,
                SUPPORTED_PROVIDERS.join(", ")
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::validation(format!(
                "temperature {} for model '{}' is outside 0.0..=2.0",
                self.temperature, self.name
            )));
        }
        if self.max_tokens == 0 {
            return Err(Error::validation(format!(
                "max_tokens for model '{}' must be positive",
                self.name
            )));
        }
        Ok(())
    }

    /// Split a model identifier into a supported provider and the model id
    /// the provider expects.
    ///
    /// A `provider/` prefix naming a supported provider is stripped, so
    /// `groq/llama3-70b` gives `("groq", "llama3-70b")`. Otherwise the
    /// provider is guessed from well-known model names and the id is kept.
    pub fn infer_provider(model: &str) -> Option<(String, String)> {
        let model = model.trim();
        if let Some((prefix, rest)) = model.split_once('/') {
            let prefix = prefix.to_lowercase();
            if SUPPORTED_PROVIDERS.contains(&prefix.as_str()) && !rest.is_empty() {
                return Some((prefix, rest.to_string()));
            }
        }

        let lower = model.to_lowercase();
        let provider = if lower.contains("gpt") || lower.starts_with("text-") {
            "openai"
        } else if lower.contains("claude") {
            "anthropic"
        } else if lower.contains("gemini") {
            "google"
        } else if lower.contains("mistral") {
            "mistral"
        } else if lower.starts_with("command") {
            "cohere"
        } else {
            return None;
        };
        Some((provider.to_string(), model.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_bounds_are_inclusive() {
        let base = ModelConfig::new("m", "openai", "gpt-4");
        assert!(base.clone().with_temperature(0.0).validate().is_ok());
        assert!(base.clone().with_temperature(2.0).validate().is_ok());
        assert!(base.clone().with_temperature(2.01).validate().is_err());
        assert!(base.with_temperature(-0.1).validate().is_err());
    }

    #[test]
    fn zero_max_tokens_is_rejected() {
        let cfg = ModelConfig::new("m", "openai", "gpt-4").with_max_tokens(0);
        assert!(matches!(cfg.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn defaults_apply_when_fields_are_absent() {
        let cfg: ModelConfig =
            serde_yaml_ng::from_str("name: fast\nprovider: openai\nmodel: gpt-4o-mini\n").unwrap();
        assert_eq!(cfg.temperature, 0.7);
        assert_eq!(cfg.max_tokens, 1024);
        assert_eq!(cfg.api_key_env, None);
    }

    fn inferred(model: &str) -> Option<(String, String)> {
        ModelConfig::infer_provider(model)
    }

    fn pair(provider: &str, model: &str) -> Option<(String, String)> {
        Some((provider.to_string(), model.to_string()))
    }

    #[test]
    fn infers_provider_from_model_name() {
        assert_eq!(inferred("gpt-4o"), pair("openai", "gpt-4o"));
        assert_eq!(inferred("claude-3-opus"), pair("anthropic", "claude-3-opus"));
        assert_eq!(inferred("command-r-plus"), pair("cohere", "command-r-plus"));
        assert_eq!(inferred("llama3"), None);
    }

    #[test]
    fn provider_prefix_is_stripped_from_model_id() {
        assert_eq!(inferred("groq/llama3-70b"), pair("groq", "llama3-70b"));
        assert_eq!(inferred("Ollama/llama3"), pair("ollama", "llama3"));
        // Not a provider prefix, so the id is kept whole.
        assert_eq!(inferred("meta-llama/Llama-3-70b"), None);
    }

    #[test]
    fn inferred_configs_always_validate() {
        let models = [
            "gpt-4o",
            "claude-3-haiku",
            "gemini-1.5-pro",
            "mistral-large",
            "command-r",
            "groq/llama3-70b",
        ];
        for model in models {
            let (provider, id) = inferred(model).unwrap();
            assert!(SUPPORTED_PROVIDERS.contains(&provider.as_str()), "{}", model);
            assert!(ModelConfig::new("m", provider, id).validate().is_ok(), "{}", model);
        }
    }

    #[test]
    fn unsupported_provider_is_rejected() {
        let cfg = ModelConfig::new("pigeon", "carrier-pigeon", "coo");
        assert!(matches!(cfg.validate(), Err(Error::Validation(_))));
    }
}
