//! Backend client adapters.
//!
//! Provides the [`ComplexityBackend`] trait and its remote implementations:
//! - [`GeminiBackend`]: Google Gemini `generateContent` (primary)
//! - [`ChatBackend`]: OpenAI-compatible chat completions (secondary)
//!
//! Every adapter builds the same instruction prompt, sends it with its own
//! authentication scheme, and classifies the reply into a [`BackendOutcome`].
//! Adapters never raise: transport errors, non-2xx statuses and undecodable
//! bodies all become [`BackendOutcome::Failure`].

pub mod chat;
pub mod gemini;

pub use chat::ChatBackend;
pub use gemini::GeminiBackend;

use crate::report::{is_valid_response, ComplexityReport};
use crate::BrokerError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Default sampling temperature sent to every backend.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Default per-call timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Result of a single backend invocation.
#[derive(Debug)]
pub enum BackendOutcome {
    /// The backend replied with text carrying the `Time Complexity` marker.
    Success(ComplexityReport),
    /// The backend replied, but the text was missing or lacked the marker.
    /// Carries the raw response body for diagnostics.
    Invalid(String),
    /// The call itself failed.
    Failure(BrokerError),
}

impl BackendOutcome {
    /// Short label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            BackendOutcome::Success(_) => "success",
            BackendOutcome::Invalid(_) => "invalid",
            BackendOutcome::Failure(_) => "failure",
        }
    }

    /// Classify the generated text extracted from a response body.
    pub(crate) fn from_generated(text: Option<String>, raw: String) -> Self {
        match text {
            Some(text) if is_valid_response(&text) => {
                BackendOutcome::Success(ComplexityReport::extract(&text))
            }
            _ => BackendOutcome::Invalid(raw),
        }
    }
}

/// A remote service able to estimate code complexity.
///
/// Implementations must be thread-safe (Send + Sync) and object safe so the
/// orchestrator can hold them as `Arc<dyn ComplexityBackend>`.
#[async_trait]
pub trait ComplexityBackend: Send + Sync {
    /// Stable identifier used in logs (e.g. `"gemini"`).
    fn name(&self) -> &str;

    /// Ask the backend for a complexity estimate of `code`.
    async fn invoke(&self, code: &str) -> BackendOutcome;
}

/// Build the instruction prompt shared by all backends.
///
/// The code is embedded verbatim inside a fenced block.
pub fn build_prompt(code: &str) -> String {
    format!(
        "Just tell only this:\nTime Complexity: \nSpace Complexity:\n\nCode:\n```\n{code}\n```"
    )
}

/// Send a prepared request and decode the JSON reply.
///
/// Returns the decoded body together with the raw text so callers can report
/// a [`BackendOutcome::Invalid`] with the original payload.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    backend: &str,
) -> Result<(T, String), BrokerError> {
    // The URL may carry a query-string API key; keep it out of error text.
    let response = request.send().await.map_err(|e| {
        BrokerError::Backend(format!("{backend} request failed: {}", e.without_url()))
    })?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(BrokerError::Backend(format!(
            "{backend} API error {status}: {error_text}"
        )));
    }

    let raw = response
        .text()
        .await
        .map_err(|e| {
            BrokerError::Backend(format!("{backend} body read failed: {}", e.without_url()))
        })?;

    let decoded = serde_json::from_str(&raw)
        .map_err(|e| BrokerError::Backend(format!("Failed to parse {backend} response: {e}")))?;

    Ok((decoded, raw))
}
