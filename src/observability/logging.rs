//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` wins over the configured level when set
//! - Spans also go to the trace collector when one is configured

use thiserror::Error;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry};

use super::telemetry::{self, TelemetryError, TelemetryGuard};
use crate::config::{LogFormat, ObservabilityConfig};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("global subscriber already installed: {0}")]
    Init(#[from] TryInitError),
}

/// Default filter directives for a configured level.
pub fn default_directives(level: &str) -> String {
    format!("product_service={level},tower_http={level}")
}

/// Initialize the global tracing subscriber.
///
/// Returns the span exporter guard when a trace collector is configured; keep
/// it alive for the life of the process. Fails if a global subscriber is
/// already installed.
pub fn init(config: &ObservabilityConfig) -> Result<Option<TelemetryGuard>, LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directives(&config.log_level).into());

    let (otel, guard) = match telemetry::layer::<Layered<EnvFilter, Registry>>(config)? {
        Some((layer, guard)) => (Some(layer), Some(guard)),
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(otel);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?,
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }

    if let Some(guard) = &guard {
        tracing::info!(endpoint = %guard.endpoint(), "Exporting spans to trace collector");
    }
    Ok(guard)
}
