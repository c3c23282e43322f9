//! Retry logic.
//!
//! # Responsibilities
//! - Re-invoke a failed attempt up to `max_retries` times
//! - Wait a linearly growing, jittered delay between attempts
//! - Stop as soon as the caller cancels or the request deadline passes
//!
//! # Design Decisions
//! - `max_retries = 0` means exactly one attempt
//! - Eligibility is a predicate over the error, supplied by the caller
//! - The terminal error is always the last observed failure, a
//!   non-retryable failure, or the cancellation itself

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use super::backoff::calculate_backoff;
use crate::config::RetryConfig;
use crate::context::RequestContext;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed; carries the last failure.
    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// An attempt failed in a way retrying cannot fix.
    #[error("non-retryable failure: {source}")]
    NonRetryable {
        #[source]
        source: E,
    },

    /// The caller went away.
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    /// The request deadline passed.
    #[error("deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u32 },
}

impl<E> RetryError<E> {
    /// Failure the dependency itself produced, if any.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable { source } => {
                Some(source)
            }
            RetryError::Cancelled { .. } | RetryError::DeadlineExceeded { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    dependency: String,
    max_retries: u32,
    min_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, dependency: impl Into<String>) -> Self {
        Self {
            dependency: dependency.into(),
            max_retries: config.max_retries,
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    fn delay_for(&self, retry: u32) -> Duration {
        calculate_backoff(
            retry,
            self.min_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
        )
    }

    /// Run `attempt` until it succeeds, fails for good, or the caller stops waiting.
    ///
    /// `attempt` receives the 1-based attempt number.
    pub async fn run<F, Fut, T, E, P>(
        &self,
        ctx: &RequestContext,
        mut attempt: F,
        is_retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempts = 0u32;
        loop {
            if ctx.is_cancelled() {
                return Err(RetryError::Cancelled { attempts });
            }
            if ctx.is_expired() {
                return Err(RetryError::DeadlineExceeded { attempts });
            }

            attempts += 1;
            let result = tokio::select! {
                biased;
                _ = ctx.cancellation().cancelled() => {
                    return Err(RetryError::Cancelled { attempts });
                }
                _ = ctx.expired() => {
                    return Err(RetryError::DeadlineExceeded { attempts });
                }
                result = attempt(attempts) => result,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !is_retryable(&error) {
                return Err(RetryError::NonRetryable { source: error });
            }
            if attempts >= self.max_attempts() {
                return Err(RetryError::Exhausted {
                    attempts,
                    source: error,
                });
            }

            let delay = self.delay_for(attempts);
            tracing::warn!(
                dependency = %self.dependency,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying dependency call"
            );
            metrics::record_retry(&self.dependency);

            tokio::select! {
                biased;
                _ = ctx.cancellation().cancelled() => {
                    return Err(RetryError::Cancelled { attempts });
                }
                _ = ctx.expired() => {
                    return Err(RetryError::DeadlineExceeded { attempts });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
