//! Configuration validation engine.
//!
//! ## Responsibility
//! Validate semantic constraints on a parsed [`BrokerConfig`] that cannot
//! be expressed through the type system alone (range checks, URL shape).
//!
//! ## Guarantees
//! - Every validation rule has at least one test that triggers it
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value

use super::{BackendConfig, BrokerConfig};

/// Errors arising from configuration parsing, validation, or I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range or contradictory value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "primary.temperature").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Validate all semantic constraints on a [`BrokerConfig`].
///
/// Collects every violation before returning so the caller sees the full
/// scope of issues at once.
///
/// # Errors
///
/// Returns every [`ConfigError::InvalidField`] found.
pub fn validate(config: &BrokerConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Server ───────────────────────────────────────────────────────
    if config.server.port == 0 {
        errors.push(ConfigError::InvalidField {
            field: "server.port".into(),
            value: "0".into(),
            reason: "must be between 1 and 65535".into(),
        });
    }

    if config.server.host.trim().is_empty() {
        errors.push(ConfigError::InvalidField {
            field: "server.host".into(),
            value: String::new(),
            reason: "host must not be empty".into(),
        });
    }

    if config.server.max_request_size == 0 {
        errors.push(ConfigError::InvalidField {
            field: "server.max_request_size".into(),
            value: "0".into(),
            reason: "must be at least 1 byte".into(),
        });
    }

    if config.server.request_deadline_ms == Some(0) {
        errors.push(ConfigError::InvalidField {
            field: "server.request_deadline_ms".into(),
            value: "0".into(),
            reason: "must be at least 1ms when set".into(),
        });
    }

    // ── Backends ─────────────────────────────────────────────────────
    validate_backend("primary", &config.primary, &mut errors);
    validate_backend("secondary", &config.secondary, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_backend(section: &str, backend: &BackendConfig, errors: &mut Vec<ConfigError>) {
    if !(0.0..=2.0).contains(&backend.temperature) {
        errors.push(ConfigError::InvalidField {
            field: format!("{section}.temperature"),
            value: backend.temperature.to_string(),
            reason: "must be between 0.0 and 2.0".into(),
        });
    }

    if backend.timeout_ms == 0 {
        errors.push(ConfigError::InvalidField {
            field: format!("{section}.timeout_ms"),
            value: "0".into(),
            reason: "timeout must be at least 1ms".into(),
        });
    }

    if let Some(model) = &backend.model {
        if model.trim().is_empty() {
            errors.push(ConfigError::InvalidField {
                field: format!("{section}.model"),
                value: String::new(),
                reason: "model name must not be empty".into(),
            });
        }
    }

    if let Some(url) = &backend.base_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ConfigError::InvalidField {
                field: format!("{section}.base_url"),
                value: url.clone(),
                reason: "must start with http:// or https://".into(),
            });
        }
    }

    if let Some(var) = &backend.api_key_env {
        if var.trim().is_empty() {
            errors.push(ConfigError::InvalidField {
                field: format!("{section}.api_key_env"),
                value: String::new(),
                reason: "environment variable name must not be empty".into(),
            });
        }
    }
}
