//! Startup orchestration.
//!
//! # Responsibilities
//! - Install the metrics exporter
//! - Build the dependency registry shared by gateway and admin API
//! - Start the config watcher when a config file is in use
//! - Bind listeners and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::watcher::ConfigWatcher;
use crate::config::GatewayConfig;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::observability::metrics;
use crate::resilience::DependencyRegistry;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),

    #[error("server error: {0}")]
    Serve(#[from] io::Error),
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}

/// Run the gateway until a termination signal arrives.
///
/// `config_path` enables hot reload of the file it points to.
pub async fn run(config: GatewayConfig, config_path: Option<&Path>) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(DependencyRegistry::from_config(&config));

    // The watcher must outlive the server; dropping it stops notifications.
    let (_watcher, config_updates) = match config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let admin = if config.admin.enabled {
        let listener = bind(&config.admin.bind_address).await?;
        tracing::info!(address = %config.admin.bind_address, "Admin API listening");

        let router = setup_admin_router(AdminState::new(Arc::clone(&registry), &config.admin.api_key));
        let mut admin_shutdown = shutdown.subscribe();
        Some(tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        }))
    } else {
        None
    };

    let listener = bind(&config.listener.bind_address).await?;
    let server = HttpServer::with_registry(config, registry);
    let result = server.run(listener, config_updates, shutdown.subscribe()).await;

    // Stop the admin API even when the gateway failed on its own.
    shutdown.trigger();
    if let Some(admin) = admin {
        let _ = admin.await;
    }

    result.map_err(StartupError::from)
}
