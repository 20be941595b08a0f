//! OpenAI-compatible chat completions adapter (secondary backend).
//!
//! Works against any service exposing `POST /chat/completions` with bearer
//! authentication (OpenAI, OpenRouter, Groq, local gateways). The generated
//! text is read from `choices[0].message.content`.

use super::{build_prompt, send_json, BackendOutcome, ComplexityBackend};
use super::{DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_MS};
use crate::config::BackendConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default chat completions endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Option<String> {
        self.choices.into_iter().next()?.message?.content
    }
}

/// Chat completions backend
///
/// ## Example
///
/// ```no_run
/// use complexity_broker::ChatBackend;
///
/// let backend = ChatBackend::new("sk-...")
///     .with_base_url("https://openrouter.ai/api/v1")
///     .with_model("mistralai/mistral-7b-instruct");
/// ```
pub struct ChatBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl ChatBackend {
    /// Create a chat backend authenticated with a bearer `api_key`.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Build from a config section. Returns `None` when the section is
    /// disabled or carries no API key.
    pub fn from_config(config: &BackendConfig) -> Option<Self> {
        let api_key = config.api_key()?;
        let mut backend = Self::new(api_key)
            .with_temperature(config.temperature)
            .with_timeout(Duration::from_millis(config.timeout_ms));
        if let Some(url) = &config.base_url {
            backend = backend.with_base_url(url);
        }
        if let Some(model) = &config.model {
            backend = backend.with_model(model);
        }
        Some(backend)
    }

    /// Override the API base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model identifier
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set temperature (0.0 - 2.0)
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ComplexityBackend for ChatBackend {
    fn name(&self) -> &str {
        "chat"
    }

    async fn invoke(&self, code: &str) -> BackendOutcome {
        let prompt = build_prompt(code);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: self.temperature,
        };

        let builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request);

        match send_json::<ChatResponse>(builder, "Chat").await {
            Ok((body, raw)) => BackendOutcome::from_generated(body.into_text(), raw),
            Err(e) => BackendOutcome::Failure(e),
        }
    }
}
