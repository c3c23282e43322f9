//! Service-level error taxonomy.
//!
//! Every failure a handler can produce is classified here; the HTTP layer
//! turns the class into a status code (see `http::response`).

use axum::http::StatusCode;
use thiserror::Error;

use crate::dependency::DependencyError;
use crate::http::request::BindingError;
use crate::product::store::StoreError;
use crate::resilience::{InvokeError, RetryError};

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed inbound data.
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// Domain lookup miss.
    #[error("{0}")]
    NotFound(String),

    /// The dependency is presumed unhealthy.
    #[error("circuit breaker '{name}' is open")]
    BreakerOpen { name: String },

    #[error("circuit breaker '{name}' has no probe slots left")]
    TooManyProbes { name: String },

    /// The dependency kept failing.
    #[error("dependency failed after {attempts} attempts: {message}")]
    RetryExhausted {
        attempts: u32,
        timed_out: bool,
        message: String,
    },

    /// The dependency failed in a way retrying cannot fix.
    #[error("dependency call failed: {0}")]
    Dependency(String),

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("request cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Binding(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::BreakerOpen { .. } | ServiceError::TooManyProbes { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::RetryExhausted { timed_out: true, .. } => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::RetryExhausted { .. } | ServiceError::Dependency(_) => {
                StatusCode::BAD_GATEWAY
            }
            ServiceError::DeadlineExceeded | ServiceError::Cancelled => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to clients.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<InvokeError<DependencyError>> for ServiceError {
    fn from(err: InvokeError<DependencyError>) -> Self {
        match err {
            InvokeError::BreakerOpen { name } => ServiceError::BreakerOpen { name },
            InvokeError::TooManyProbes { name } => ServiceError::TooManyProbes { name },
            InvokeError::Retry(RetryError::Exhausted { attempts, source }) => {
                ServiceError::RetryExhausted {
                    attempts,
                    timed_out: source.is_timeout(),
                    message: source.to_string(),
                }
            }
            InvokeError::Retry(RetryError::NonRetryable { source }) => {
                ServiceError::Dependency(source.to_string())
            }
            InvokeError::Retry(RetryError::Cancelled { .. }) => ServiceError::Cancelled,
            InvokeError::Retry(RetryError::DeadlineExceeded { .. }) => {
                ServiceError::DeadlineExceeded
            }
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ServiceError::NotFound(err.to_string()),
            StoreError::Timeout(_) => ServiceError::DeadlineExceeded,
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::BindSource;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ServiceError::Binding(BindingError::new(BindSource::Body, "bad json")),
                400,
            ),
            (ServiceError::NotFound("product not found".into()), 404),
            (ServiceError::BreakerOpen { name: "x".into() }, 503),
            (ServiceError::TooManyProbes { name: "x".into() }, 503),
            (
                ServiceError::RetryExhausted {
                    attempts: 3,
                    timed_out: false,
                    message: "503".into(),
                },
                502,
            ),
            (
                ServiceError::RetryExhausted {
                    attempts: 3,
                    timed_out: true,
                    message: "slow".into(),
                },
                504,
            ),
            (ServiceError::Dependency("bad url".into()), 502),
            (ServiceError::DeadlineExceeded, 504),
            (ServiceError::Cancelled, 504),
            (ServiceError::Internal("disk on fire".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.status().as_u16(), status, "{:?}", err);
        }
    }

    #[test]
    fn test_invoke_errors_classify() {
        let timed_out: ServiceError = InvokeError::Retry(RetryError::Exhausted {
            attempts: 2,
            source: DependencyError::Timeout(Duration::from_secs(1)),
        })
        .into();
        assert_eq!(timed_out.status(), StatusCode::GATEWAY_TIMEOUT);

        let open: ServiceError = InvokeError::<DependencyError>::BreakerOpen {
            name: "http-client".into(),
        }
        .into();
        assert_eq!(open.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_store_errors_classify() {
        let missing: ServiceError = StoreError::NotFound { id: "x".into() }.into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.public_message(), "product not found");

        let broken: ServiceError = StoreError::Backend("connection reset".into()).into();
        assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(broken.public_message(), "internal server error");
    }
}
