//! Configuration file loading.
//!
//! ## Responsibility
//! Read a TOML file from disk, parse it into a [`BrokerConfig`], and run
//! validation before returning.
//!
//! ## Guarantees
//! - A successfully loaded config is always validated
//! - I/O errors and parse errors are distinguished in the error type
//! - File path is included in every error message
//!
//! ## NOT Responsible For
//! - Resolving API keys (see [`BrokerConfig::resolve_credentials`])

use std::path::Path;

use super::validation::{self, ConfigError};
use super::BrokerConfig;

/// Load a [`BrokerConfig`] from a TOML file.
///
/// # Errors
///
/// - `ConfigError::Io` if the file cannot be read.
/// - `ConfigError::Parse` if the TOML is malformed.
/// - `ConfigError::Validation` if semantic constraints are violated.
///
/// # Example
///
/// ```rust,ignore
/// use complexity_broker::config::loader::load_from_file;
/// use std::path::Path;
///
/// let config = load_from_file(Path::new("broker.toml"))?;
/// println!("Listening on port {}", config.server.port);
/// ```
pub fn load_from_file(path: &Path) -> Result<BrokerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: path.display().to_string(),
        source: e,
    })?;

    load_from_str(&content, &path.display().to_string())
}

/// Load a [`BrokerConfig`] from a TOML string.
///
/// `source_name` identifies the source in error messages.
///
/// # Errors
///
/// - `ConfigError::Parse` if the TOML is malformed.
/// - `ConfigError::Validation` if semantic constraints are violated.
pub fn load_from_str(content: &str, source_name: &str) -> Result<BrokerConfig, ConfigError> {
    let config: BrokerConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })?;

    validation::validate(&config).map_err(|errors| {
        ConfigError::Validation(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    })?;

    Ok(config)
}
