//! Request relay
//!
//! Forwards configured routes to upstream services, attaching identity tokens
//! on managed runtimes, and turns handler panics into structured 500s.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ TraceLayer ──▶ Timeout ──▶ trace context ──▶ panic recovery
//!                                                                  │
//!                                                                  ▼
//!                                                          proxy route handler
//!                                                                  │
//!                                  ClientProvider (plain / identity token)
//!                                                                  │
//!     Client ◀──────────────── streamed upstream response ◀── upstream service
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use request_relay::config::loader::{apply_env_overrides, load_config, ConfigError};
use request_relay::config::validation::validate_config;
use request_relay::config::RelayConfig;
use request_relay::observability::{logging, metrics};
use request_relay::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "request-relay", version, about = "Environment-aware request relay")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Runtime environment identifier, e.g. gcp-cloud-run.
    #[arg(long)]
    runtime_environment: Option<String>,

    /// Bind address, e.g. 0.0.0.0:8080.
    #[arg(long)]
    bind: Option<String>,
}

fn resolve_config(args: &Args) -> Result<RelayConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = RelayConfig::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            config
        }
    };

    if let Some(environment) = &args.runtime_environment {
        config.runtime.environment = environment.clone();
    }
    if let Some(bind) = &args.bind {
        config.listener.bind_address = bind.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    logging::init_logging(&config.observability)?;
    tracing::info!("request-relay v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        environment = %config.runtime.environment,
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
