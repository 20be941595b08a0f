//! # Broker Configuration
//!
//! ## Responsibility
//! Parse and validate the TOML configuration for the HTTP server and the two
//! remote backends, then resolve API keys from the environment once at
//! startup.
//!
//! ```text
//! complexity-broker --config broker.toml
//! ```
//!
//! ## Guarantees
//! - Deterministic: same TOML input always produces the same `BrokerConfig`
//! - Validated: all semantic constraints are checked before a config is accepted
//! - Read-only after startup: adapters receive their settings by value and
//!   never read the environment themselves
//! - Schema-exportable: JSON Schema output enables IDE autocomplete
//!
//! ## NOT Responsible For
//! - Building backend clients (that belongs to `backend`)
//! - Serving HTTP (that belongs to `web_api`)

pub mod loader;
pub mod validation;

pub use validation::ConfigError;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Environment variable consulted for the primary (Gemini) API key.
pub const DEFAULT_PRIMARY_KEY_ENV: &str = "GEMINI_API_KEY";

/// Environment variable consulted for the secondary (chat) API key.
pub const DEFAULT_SECONDARY_KEY_ENV: &str = "OPENAI_API_KEY";

// ── Default value functions ──────────────────────────────────────────────

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Default maximum request body: 1 MiB.
fn default_max_request_size() -> usize {
    1024 * 1024
}

fn default_temperature() -> f32 {
    crate::backend::DEFAULT_TEMPERATURE
}

fn default_backend_timeout_ms() -> u64 {
    crate::backend::DEFAULT_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for a broker instance.
///
/// Every section is optional in TOML; an empty file yields
/// [`BrokerConfig::default`].
///
/// # Example
///
/// ```toml
/// [server]
/// port = 3000
/// request_deadline_ms = 20000
///
/// [primary]
/// model = "gemini-1.5-flash"
///
/// [secondary]
/// base_url = "https://openrouter.ai/api/v1"
/// model = "mistralai/mistral-7b-instruct"
/// api_key_env = "OPENROUTER_API_KEY"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BrokerConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Primary backend (Gemini `generateContent`).
    #[serde(default)]
    pub primary: BackendConfig,
    /// Secondary backend (OpenAI-compatible chat completions).
    #[serde(default)]
    pub secondary: BackendConfig,
    /// Logging settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl BrokerConfig {
    /// Fill each backend's `api_key` from the environment.
    ///
    /// Keys already present (e.g. set programmatically) are kept. Empty
    /// environment values count as absent.
    pub fn resolve_credentials(&mut self) {
        self.primary.resolve_key(DEFAULT_PRIMARY_KEY_ENV);
        self.secondary.resolve_key(DEFAULT_SECONDARY_KEY_ENV);
    }
}

// ── Server ───────────────────────────────────────────────────────────────

/// Configuration for the web API HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ServerConfig {
    /// IP address or hostname to bind to (e.g. `"0.0.0.0"` for all interfaces).
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port the server listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum allowed request body size in bytes.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    /// Upper bound for one whole fallback chain. `None` waits for each
    /// backend's own timeout.
    pub request_deadline_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_request_size: default_max_request_size(),
            request_deadline_ms: None,
        }
    }
}

// ── Backends ─────────────────────────────────────────────────────────────

/// Settings for one remote backend.
///
/// `base_url` and `model` fall back to the adapter's own defaults when
/// omitted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BackendConfig {
    /// Disabled backends are skipped even when a key is present.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// API base URL override.
    pub base_url: Option<String>,
    /// Model identifier override.
    pub model: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-call timeout in milliseconds.
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
    /// Resolved API key. Never serialized.
    #[serde(default, skip_serializing)]
    #[schemars(skip)]
    pub api_key: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            model: None,
            temperature: default_temperature(),
            timeout_ms: default_backend_timeout_ms(),
            api_key_env: None,
            api_key: None,
        }
    }
}

impl BackendConfig {
    /// The usable API key, or `None` when the backend is disabled or
    /// unconfigured.
    pub fn api_key(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    fn resolve_key(&mut self, default_env: &str) {
        if self.api_key.is_some() {
            return;
        }
        let var = self.api_key_env.as_deref().unwrap_or(default_env);
        self.api_key = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
    }
}

// ── Observability ────────────────────────────────────────────────────────

/// Observability configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ObservabilityConfig {
    /// Log output format. `LOG_FORMAT` in the environment takes precedence.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, colorized log output.
    #[default]
    Pretty,
    /// Structured JSON log output for machine consumption.
    Json,
}

/// Export the JSON Schema for `BrokerConfig`.
///
/// # Errors
///
/// Returns `serde_json::Error` if schema serialization fails.
pub fn export_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(BrokerConfig);
    serde_json::to_string_pretty(&schema)
}
