//! Product service.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────┐
//!                          │                 PRODUCT SERVICE                  │
//!                          │                                                  │
//!     Client Request       │  ┌─────────┐    ┌──────────┐    ┌────────────┐   │
//!     ─────────────────────┼─▶│  http   │───▶│ dispatch │───▶│  product   │   │
//!                          │  │ server  │    │ + binder │    │  handlers  │   │
//!                          │  └─────────┘    └──────────┘    └─────┬──────┘   │
//!                          │                                       │          │
//!                          │                  ┌────────────────────┤          │
//!                          │                  ▼                    ▼          │
//!                          │          ┌──────────────┐     ┌──────────────┐   │
//!                          │          │  resilience  │     │ ProductStore │   │
//!                          │          │ breaker+retry│     │  (storage)   │   │
//!                          │          └──────┬───────┘     └──────────────┘   │
//!                          │                 ▼                                │
//!                          │          ┌──────────────┐                        │
//!                          │          │  dependency  │────────────────────────┼──▶ Dependency
//!                          │          │    client    │   traceparent/baggage  │    Service
//!                          │          └──────────────┘                        │
//!                          │                                                  │
//!                          │  config · observability · lifecycle              │
//!                          └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use product_service::config;
use product_service::lifecycle;
use product_service::observability::logging;

#[derive(Parser)]
#[command(name = "product-service")]
#[command(about = "Product HTTP service with a resilient dependency client", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "PRODUCT_SERVICE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _telemetry = match logging::init(&config.observability) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        dependency = %config.dependency.base_url,
        storage = %config.storage.endpoint,
        request_timeout_ms = config.timeouts.request_ms,
        "product-service starting"
    );

    match lifecycle::run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal startup or runtime error");
            ExitCode::FAILURE
        }
    }
}
