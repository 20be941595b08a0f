//! # complexity-broker
//!
//! Estimates the asymptotic time and space complexity of a code snippet by
//! brokering across remote LLM backends, degrading to a local heuristic when
//! none of them produce a usable answer.
//!
//! ## Architecture
//!
//! ```text
//! POST /api/analyze → Orchestrator → primary (Gemini)
//!                                  → secondary (chat completions)
//!                                  → heuristic fallback
//! ```
//!
//! Stages run strictly in order and the first valid report wins. The
//! heuristic stage never fails, so every valid request gets a result.

// ── Lint policy ───────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod backend;
pub mod config;
pub mod heuristic;
pub mod metrics;
pub mod orchestrator;
pub mod report;

#[cfg(feature = "web-api")]
pub mod web_api;

// Re-exports for convenience
pub use backend::{BackendOutcome, ChatBackend, ComplexityBackend, GeminiBackend};
pub use config::{BrokerConfig, LogFormat};
pub use heuristic::analyze;
pub use orchestrator::{AnalysisResult, FallbackReason, Orchestrator, Source};
pub use report::ComplexityReport;

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"`: structured JSON output for log aggregators
/// - anything else (including unset): human-readable pretty output
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`BrokerError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
///
/// # Example
///
/// ```no_run
/// # use complexity_broker::{init_tracing, BrokerError};
/// # fn example() -> Result<(), BrokerError> {
/// init_tracing()?;
/// # Ok(()) }
/// ```
pub fn init_tracing() -> Result<(), BrokerError> {
    init_tracing_with(LogFormat::Pretty)
}

/// Like [`init_tracing`], but uses `fallback` when `LOG_FORMAT` is unset.
///
/// # Errors
///
/// Returns [`BrokerError::Other`] if the global subscriber has already
/// been set.
pub fn init_tracing_with(fallback: LogFormat) -> Result<(), BrokerError> {
    let format = match std::env::var("LOG_FORMAT") {
        Ok(value) if value == "json" => LogFormat::Json,
        Ok(_) => LogFormat::Pretty,
        Err(_) => fallback,
    };

    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| BrokerError::Other(format!("tracing init failed: {e}")))
}

/// Top-level broker errors.
///
/// Backend failures never reach the HTTP caller directly; they are carried
/// inside [`BackendOutcome::Failure`] and turned into a fallthrough by the
/// orchestrator.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// A backend call failed (network, timeout, non-2xx status, or body decode).
    #[error("backend call failed: {0}")]
    Backend(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The HTTP server could not bind or terminated abnormally.
    #[error("server error: {0}")]
    Server(String),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}
