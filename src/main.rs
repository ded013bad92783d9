//! Resilience gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ route match ──▶ dependency guard ──▶ upstream
//!                      (request id,                   ┌──────────────┐
//!                       timeout,                      │ breaker      │
//!                       trace)                        │ rate limiter │
//!                                                     │ bulkhead     │
//!                                                     │ retries      │
//!                                                     └──────┬───────┘
//!     Client Response                                        │
//!     ◀────────────── response mapping ◀── fallback / compensation
//!
//!     Cross-cutting: config + watcher, observability, admin API, lifecycle
//! ```

use std::path::PathBuf;
use clap::Parser;

use resilience_gateway::config::{load_config, GatewayConfig, ObservabilityConfig};
use resilience_gateway::lifecycle;
use resilience_gateway::observability::logging::init_logging;

/// Environment variable consulted when `--config` is not given.
const CONFIG_ENV: &str = "GATEWAY_CONFIG";

#[derive(Parser)]
#[command(name = "resilience-gateway", version, about = "HTTP gateway with per-dependency resilience guards")]
struct Args {
    /// Path to the TOML configuration file. Watched for changes.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config_path = args
        .config
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    let config = match &config_path {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                init_logging(&ObservabilityConfig::default());
                tracing::error!(path = ?path, error = %e, "Failed to load configuration");
                return Err(e.into());
            }
        },
        None => GatewayConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resilience-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        dependencies = config.dependencies.len(),
        routes = config.routes.len(),
        source = ?config_path,
        "Configuration loaded"
    );

    lifecycle::run(config, config_path.as_deref()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
