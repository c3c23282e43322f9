//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! constraints. Every problem is reported, not just the first one.

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::AppConfig;
use crate::observability::telemetry::traces_url;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a loaded configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::new("listener.max_body_size", "must be greater than 0"));
    }

    match Url::parse(&config.dependency.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            "dependency.base_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(
            "dependency.base_url",
            format!("'{}' is not a URL: {}", config.dependency.base_url, e),
        )),
    }
    if !config.dependency.probe_path.starts_with('/') {
        errors.push(ValidationError::new("dependency.probe_path", "must start with '/'"));
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.connect_ms", timeouts.connect_ms),
        ("timeouts.response_header_ms", timeouts.response_header_ms),
        ("timeouts.attempt_ms", timeouts.attempt_ms),
        ("timeouts.request_ms", timeouts.request_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    let breaker = &config.circuit_breaker;
    if breaker.name.trim().is_empty() {
        errors.push(ValidationError::new("circuit_breaker.name", "must not be empty"));
    }
    if breaker.max_probe_requests == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.max_probe_requests",
            "must be at least 1",
        ));
    }
    if breaker.open_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.open_timeout_ms",
            "must be greater than 0",
        ));
    }
    if breaker.min_requests == 0 {
        errors.push(ValidationError::new("circuit_breaker.min_requests", "must be at least 1"));
    }
    if !(breaker.failure_ratio > 0.0 && breaker.failure_ratio <= 1.0) {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_ratio",
            format!("{} is outside (0.0, 1.0]", breaker.failure_ratio),
        ));
    }

    let retry = &config.retry;
    if retry.min_delay_ms > retry.max_delay_ms {
        errors.push(ValidationError::new(
            "retry.min_delay_ms",
            format!(
                "{} exceeds retry.max_delay_ms ({})",
                retry.min_delay_ms, retry.max_delay_ms
            ),
        ));
    }

    if config.storage.bucket.trim().is_empty() {
        errors.push(ValidationError::new("storage.bucket", "must not be empty"));
    }
    if config.storage.operation_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "storage.operation_timeout_ms",
            "must be greater than 0",
        ));
    }

    if let Some(endpoint) = &config.observability.trace_collector_endpoint {
        if let Err(e) = traces_url(endpoint) {
            errors.push(ValidationError::new(
                "observability.trace_collector_endpoint",
                e.to_string(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
