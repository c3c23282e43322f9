//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the product service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address, body limits).
    pub listener: ListenerConfig,

    /// Outbound HTTP dependency consulted before product lookups.
    pub dependency: DependencyConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Circuit breaker guarding the outbound dependency.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration for the outbound dependency.
    pub retry: RetryConfig,

    /// Product storage settings.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 1024 * 1024,
        }
    }
}

impl ListenerConfig {
    /// Replace the port of the bind address, keeping the host part.
    pub fn set_port(&mut self, port: &str) {
        let host = self
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        self.bind_address = format!("{}:{}", host, port);
    }
}

/// Outbound dependency configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DependencyConfig {
    /// Base URL of the dependency (e.g., "http://localhost:9000").
    pub base_url: String,

    /// Path called as the dependency check before each product lookup.
    pub probe_path: String,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            probe_path: "/random-error".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
///
/// Every value is in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Outbound connection establishment timeout.
    pub connect_ms: u64,

    /// Outbound TLS handshake budget (folded into the connect phase).
    pub handshake_ms: u64,

    /// Time allowed between sending a request and reading response data.
    pub response_header_ms: u64,

    /// Timeout for a single outbound attempt.
    pub attempt_ms: u64,

    /// Overall deadline for one inbound request.
    pub request_ms: u64,

    /// TCP keepalive for pooled outbound connections.
    pub keepalive_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 30_000,
            handshake_ms: 10_000,
            response_header_ms: 10_000,
            attempt_ms: 10_000,
            request_ms: 3_000,
            keepalive_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms + self.handshake_ms)
    }

    pub fn response_header(&self) -> Duration {
        Duration::from_millis(self.response_header_ms)
    }

    pub fn attempt(&self) -> Duration {
        Duration::from_millis(self.attempt_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Name of the guarded dependency (used in events and metrics).
    pub name: String,

    /// Calls let through while half-open.
    pub max_probe_requests: u32,

    /// Rolling window in the closed state; counts reset when it expires.
    /// Zero keeps counts until the next state change.
    pub interval_ms: u64,

    /// How long the breaker stays open before probing.
    pub open_timeout_ms: u64,

    /// Minimum calls in the window before the failure ratio is evaluated.
    pub min_requests: u32,

    /// Failure ratio (0.0 to 1.0) that trips the breaker.
    pub failure_ratio: f64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "http-client".to_string(),
            max_probe_requests: 3,
            interval_ms: 5_000,
            open_timeout_ms: 10_000,
            min_requests: 3,
            failure_ratio: 0.6,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt. Defaults to 2, so a dependency call
    /// makes up to 3 attempts; set 0 for single-shot calls with no retrying.
    pub max_retries: u32,

    /// Lower bound of the backoff delay in milliseconds.
    pub min_delay_ms: u64,

    /// Upper bound of the backoff delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay_ms: 100,
            max_delay_ms: 10_000,
        }
    }
}

/// Product storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage endpoint. `memory://` selects the in-process store.
    pub endpoint: String,

    pub username: String,

    pub password: String,

    /// Bucket (or collection) holding product documents.
    pub bucket: String,

    /// Timeout for a single storage operation in milliseconds.
    pub operation_timeout_ms: u64,

    /// How long startup waits for storage to become ready, in milliseconds.
    pub ready_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "memory://".to_string(),
            username: String::new(),
            password: String::new(),
            bucket: "products".to_string(),
            operation_timeout_ms: 3_000,
            ready_timeout_ms: 3_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Serve Prometheus metrics on `/metrics`.
    pub metrics_enabled: bool,

    /// Trace collector endpoint handed to the exporter, if any.
    pub trace_collector_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            trace_collector_endpoint: None,
        }
    }
}
