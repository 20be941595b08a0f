//! Google Gemini `generateContent` adapter (primary backend).
//!
//! Authenticates with an API key passed as the `key` query parameter and
//! reads the generated text from `candidates[0].content.parts[0].text`.

use super::{build_prompt, send_json, BackendOutcome, ComplexityBackend};
use super::{DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_MS};
use crate::config::BackendConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Gemini REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Gemini request payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

/// Gemini response envelope. Every level is optional so a reply with an
/// unexpected shape degrades to "no text" rather than a decode error.
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

/// Gemini API backend
///
/// ## Example
///
/// ```no_run
/// use complexity_broker::GeminiBackend;
/// use std::time::Duration;
///
/// let backend = GeminiBackend::new("my-api-key")
///     .with_model("gemini-1.5-pro")
///     .with_timeout(Duration::from_secs(10));
/// ```
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl GeminiBackend {
    /// Create a Gemini backend authenticated with `api_key`.
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

    /// Override the API base URL (useful for proxies and tests)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model name
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

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ComplexityBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn invoke(&self, code: &str) -> BackendOutcome {
        let prompt = build_prompt(code);
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        let builder = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(&request);

        match send_json::<GenerateContentResponse>(builder, "Gemini").await {
            Ok((body, raw)) => BackendOutcome::from_generated(body.into_text(), raw),
            Err(e) => BackendOutcome::Failure(e),
        }
    }
}
