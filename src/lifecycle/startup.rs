//! Startup orchestration.
//!
//! # Responsibilities
//! - Open product storage and wait until it is ready
//! - Initialize metrics and build the HTTP server
//! - Bind the listener and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener binds last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use super::shutdown::Shutdown;
use super::signals::spawn_signal_listener;
use crate::config::AppConfig;
use crate::dependency::DependencyError;
use crate::http::HttpServer;
use crate::observability::metrics;
use crate::product::store::{self, ProductStore, StoreError};

const METRICS_UPKEEP: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("storage: {0}")]
    Storage(#[from] StoreError),

    #[error("storage not ready within {0:?}")]
    StorageNotReady(Duration),

    #[error("dependency client: {0}")]
    Dependency(#[from] DependencyError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Wait for `store` to answer a ping within `timeout`.
pub async fn wait_for_storage(store: &dyn ProductStore, timeout: Duration) -> Result<(), StartupError> {
    match tokio::time::timeout(timeout, store.ping()).await {
        Ok(Ok(())) => {
            tracing::info!("Product storage ready");
            Ok(())
        }
        Ok(Err(e)) => Err(StartupError::Storage(e)),
        Err(_) => Err(StartupError::StorageNotReady(timeout)),
    }
}

/// Bring the service up and serve until a shutdown signal arrives.
pub async fn run(config: AppConfig) -> Result<(), StartupError> {
    let store: Arc<dyn ProductStore> = store::open(&config.storage)?;
    wait_for_storage(
        store.as_ref(),
        Duration::from_millis(config.storage.ready_timeout_ms),
    )
    .await?;

    let metrics_handle = if config.observability.metrics_enabled {
        let handle = metrics::init_metrics();
        metrics::spawn_upkeep(handle.clone(), METRICS_UPKEEP);
        Some(handle)
    } else {
        None
    };

    let addr = config.listener.bind_address.clone();
    let server = HttpServer::new(config, store, metrics_handle)?;
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    server.run(listener, shutdown).await.map_err(StartupError::Serve)
}
