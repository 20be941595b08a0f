//! complexity-broker server binary
//!
//! Loads configuration, resolves API keys from the environment and serves
//! the analyze endpoint.
//!
//! ## Usage
//!
//! ```text
//! complexity-broker [--config <path>] [--print-schema]
//! ```
//!
//! ## Environment Variables
//!
//! - `BROKER_CONFIG`: config file path when `--config` is not given
//! - `GEMINI_API_KEY`: primary backend key (name overridable via `api_key_env`)
//! - `OPENAI_API_KEY`: secondary backend key (name overridable via `api_key_env`)
//! - `LOG_FORMAT=json`: structured JSON output (production)
//! - `RUST_LOG=info`: log level filter

use std::path::PathBuf;
use std::sync::Arc;

use complexity_broker::config::{export_schema, loader};
use complexity_broker::{init_tracing_with, metrics, web_api, BrokerConfig, Orchestrator};
use tracing::info;

struct Args {
    config: Option<PathBuf>,
    print_schema: bool,
}

/// Parse command-line arguments manually (no external arg parser dependency).
fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = None;
    let mut print_schema = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    return Err("--config requires a value".to_string());
                };
                config = Some(PathBuf::from(path));
            }
            "--print-schema" => {
                print_schema = true;
            }
            "--help" | "-h" => {
                return Err("usage: complexity-broker [--config <path>] [--print-schema]".into());
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
        i += 1;
    }

    if config.is_none() {
        config = std::env::var("BROKER_CONFIG").ok().map(PathBuf::from);
    }

    Ok(Args {
        config,
        print_schema,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args()?;

    if args.print_schema {
        println!("{}", export_schema()?);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => loader::load_from_file(path)?,
        None => BrokerConfig::default(),
    };
    config.resolve_credentials();

    // A second subscriber (e.g. from a test harness) is not fatal.
    if let Err(e) = init_tracing_with(config.observability.log_format) {
        eprintln!("warning: tracing not initialized: {e}");
    }

    metrics::init_metrics()?;

    match &args.config {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => info!("no configuration file given, using defaults"),
    }

    let orchestrator = Arc::new(Orchestrator::from_config(&config));

    web_api::start_server(&config.server, orchestrator).await?;

    Ok(())
}
