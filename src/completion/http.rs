use super::{CompletionClient, CompletionRequest};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const TOGETHER_BASE_URL: &str = "https://api.together.xyz/v1";
const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";
const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const COHERE_BASE_URL: &str = "https://api.cohere.ai/compatibility/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Completion backend speaking the OpenAI chat-completions protocol
/// (every hosted provider with a compatible endpoint) and the Anthropic
/// messages API.
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    client: Client,
    openai_base_url: Option<String>,
    timeout: Duration,
}

#[derive(Debug, PartialEq)]
enum Route {
    Anthropic,
    OpenAi { base_url: String },
}

impl Default for HttpCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpCompletionClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            openai_base_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Point `openai` and `openai-compatible` requests at another server.
    /// Hosted providers such as `groq` keep their own endpoints.
    pub fn with_openai_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.openai_base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    fn route(&self, provider: &str) -> Result<Route> {
        let hosted = |url: &str| -> Result<Route> {
            Ok(Route::OpenAi {
                base_url: url.to_string(),
            })
        };
        match provider {
            "anthropic" => Ok(Route::Anthropic),
            "openai" => hosted(self.openai_base_url.as_deref().unwrap_or(OPENAI_BASE_URL)),
            "openai-compatible" => match &self.openai_base_url {
                Some(url) => hosted(url),
                None => bail!("Provider 'openai-compatible' needs a base URL (--openai-base-url)"),
            },
            "groq" => hosted(GROQ_BASE_URL),
            "together" => hosted(TOGETHER_BASE_URL),
            "mistral" => hosted(MISTRAL_BASE_URL),
            "google" => hosted(GOOGLE_BASE_URL),
            "cohere" => hosted(COHERE_BASE_URL),
            "ollama" => hosted(OLLAMA_BASE_URL),
            other => bail!("Unsupported completion provider '{}'", other),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn complete_openai(&self, base_url: &str, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", base_url))
            .json(&body)
            .timeout(self.timeout);
        if let Some(key) = &request.credential {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.context("OpenAI request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("OpenAI API error: {} - {}", status, body);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to decode OpenAI response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("OpenAI response contained no message content")
    }

    async fn complete_anthropic(&self, request: &CompletionRequest) -> Result<String> {
        let key = request
            .credential
            .as_deref()
            .context("Anthropic requests need an API key (set api_key_env)")?;
        let body = ChatRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .context("Anthropic request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Anthropic API error: {} - {}", status, body);
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .context("Failed to decode Anthropic response")?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            bail!("Anthropic response contained no text");
        }
        Ok(text)
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        debug!(provider = %request.provider, model = %request.model, "Sending completion request");
        match self.route(&request.provider)? {
            Route::Anthropic => self.complete_anthropic(request).await,
            Route::OpenAi { base_url } => self.complete_openai(&base_url, request).await,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}
