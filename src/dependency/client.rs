//! HTTP client for the outbound dependency.
//!
//! # Responsibilities
//! - Issue one GET attempt against the dependency base URL
//! - Propagate `traceparent` / `baggage` on every attempt
//! - Classify the result for the retry policy
//!
//! # Design Decisions
//! - Connection pooling and keepalive are left to reqwest
//! - The TLS handshake budget is folded into the connect timeout
//! - 429 and 5xx (except 501) become errors so they can be retried;
//!   every other status is handed back to the caller unchanged

use std::time::Duration;

use axum::body::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::config::{DependencyConfig, TimeoutConfig};
use crate::observability::TraceContext;

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("invalid dependency url: {0}")]
    InvalidUrl(String),

    #[error("failed to connect to dependency: {0}")]
    Connect(String),

    #[error("dependency did not answer within {0:?}")]
    Timeout(Duration),

    #[error("dependency answered {status}")]
    Status { status: StatusCode },

    #[error("dependency transport error: {0}")]
    Transport(String),
}

impl DependencyError {
    /// Failures a fresh attempt may not hit again.
    pub fn is_retryable(&self) -> bool {
        match self {
            DependencyError::Connect(_)
            | DependencyError::Timeout(_)
            | DependencyError::Transport(_) => true,
            DependencyError::Status { status } => is_retryable_status(*status),
            DependencyError::InvalidUrl(_) => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DependencyError::Timeout(_))
    }

    fn from_reqwest(err: reqwest::Error, attempt_timeout: Duration) -> Self {
        if err.is_timeout() {
            DependencyError::Timeout(attempt_timeout)
        } else if err.is_connect() {
            DependencyError::Connect(err.to_string())
        } else if err.is_builder() {
            DependencyError::InvalidUrl(err.to_string())
        } else {
            DependencyError::Transport(err.to_string())
        }
    }
}

/// Statuses worth another attempt.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
}

/// A dependency answer that was not classified as a failure.
#[derive(Debug, Clone)]
pub struct DependencyResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct DependencyClient {
    http: reqwest::Client,
    base_url: Url,
    attempt_timeout: Duration,
}

impl DependencyClient {
    pub fn new(config: &DependencyConfig, timeouts: &TimeoutConfig) -> Result<Self, DependencyError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| DependencyError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        let http = reqwest::Client::builder()
            .connect_timeout(timeouts.connect())
            .read_timeout(timeouts.response_header())
            .timeout(timeouts.attempt())
            .tcp_keepalive(timeouts.keepalive())
            .pool_idle_timeout(timeouts.keepalive())
            .build()
            .map_err(|e| DependencyError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            attempt_timeout: timeouts.attempt(),
        })
    }

    /// One GET attempt against `path`, capped at `limit` (never more than the
    /// configured attempt timeout).
    pub async fn get(
        &self,
        trace: &TraceContext,
        path: &str,
        limit: Duration,
    ) -> Result<DependencyResponse, DependencyError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| DependencyError::InvalidUrl(format!("{}: {}", path, e)))?;
        let limit = limit.min(self.attempt_timeout);

        let mut headers = HeaderMap::new();
        trace.inject(&mut headers);

        tracing::debug!(url = %url, trace_id = %trace.trace_id(), "Calling dependency");

        let response = self
            .http
            .get(url)
            .headers(headers)
            .timeout(limit)
            .send()
            .await
            .map_err(|e| DependencyError::from_reqwest(e, limit))?;

        let status = response.status();
        if is_retryable_status(status) {
            return Err(DependencyError::Status { status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DependencyError::from_reqwest(e, limit))?;

        Ok(DependencyResponse { status, body })
    }
}
