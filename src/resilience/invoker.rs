//! Resilient invocation of an outbound dependency.
//!
//! # Data Flow
//! ```text
//! invoke(ctx, call)
//!     → child trace span (dependency_call)
//!     → circuit_breaker.rs (fail fast when open)
//!     → retries.rs (attempt loop with backoff, cancellation aware)
//!     → call(trace, attempt)
//! ```
//!
//! # Design Decisions
//! - A rejected call never reaches the retry loop
//! - The span and the latency metric are closed on every exit path,
//!   including when the caller drops the future
//! - A call the caller abandoned does not count against the dependency

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::Instrument;

use super::circuit_breaker::{BreakerError, CallOutcome, CircuitBreaker};
use super::retries::{RetryError, RetryPolicy};
use crate::context::RequestContext;
use crate::observability::{metrics, TraceContext};

#[derive(Debug, Error)]
pub enum InvokeError<E> {
    #[error("circuit breaker '{name}' is open")]
    BreakerOpen { name: String },

    #[error("circuit breaker '{name}' has no probe slots left")]
    TooManyProbes { name: String },

    #[error(transparent)]
    Retry(RetryError<E>),
}

impl<E> InvokeError<E> {
    fn outcome(&self) -> &'static str {
        match self {
            InvokeError::BreakerOpen { .. } => "breaker_open",
            InvokeError::TooManyProbes { .. } => "too_many_probes",
            InvokeError::Retry(RetryError::Exhausted { .. }) => "exhausted",
            InvokeError::Retry(RetryError::NonRetryable { .. }) => "non_retryable",
            InvokeError::Retry(RetryError::Cancelled { .. }) => "cancelled",
            InvokeError::Retry(RetryError::DeadlineExceeded { .. }) => "deadline_exceeded",
        }
    }
}

impl<E> From<BreakerError<RetryError<E>>> for InvokeError<E> {
    fn from(err: BreakerError<RetryError<E>>) -> Self {
        match err {
            BreakerError::Open { name } => InvokeError::BreakerOpen { name },
            BreakerError::TooManyProbes { name } => InvokeError::TooManyProbes { name },
            BreakerError::Inner(e) => InvokeError::Retry(e),
        }
    }
}

/// How a finished retry loop counts for the breaker.
fn classify<E>(err: &RetryError<E>) -> CallOutcome {
    match err {
        RetryError::Cancelled { .. } => CallOutcome::Ignored,
        RetryError::DeadlineExceeded { attempts: 0 } => CallOutcome::Ignored,
        _ => CallOutcome::Failure,
    }
}

/// Records latency and outcome when dropped.
struct CallRecord<'a> {
    dependency: &'a str,
    start: Instant,
    outcome: &'static str,
}

impl Drop for CallRecord<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        metrics::record_dependency_call(self.dependency, self.outcome, elapsed);
        tracing::debug!(
            dependency = %self.dependency,
            outcome = self.outcome,
            elapsed_ms = elapsed.as_millis() as u64,
            "Dependency call finished"
        );
    }
}

/// Circuit breaker + retry policy + trace propagation around one dependency.
#[derive(Clone)]
pub struct ResilientInvoker {
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl fmt::Debug for ResilientInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientInvoker")
            .field("breaker", &self.breaker.name())
            .field("max_attempts", &self.retry.max_attempts())
            .finish()
    }
}

impl ResilientInvoker {
    pub fn new(breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self { breaker, retry }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run `call` as `breaker.execute(retry.run(call))` under a child span.
    ///
    /// `call` receives the child trace context to propagate and the 1-based
    /// attempt number. The child is derived once, so every attempt carries
    /// the same span.
    pub async fn invoke<F, Fut, T, E, P>(
        &self,
        ctx: &RequestContext,
        mut call: F,
        is_retryable: P,
    ) -> Result<T, InvokeError<E>>
    where
        F: FnMut(TraceContext, u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let trace = ctx.trace().child();
        let span = tracing::info_span!(
            "dependency_call",
            dependency = %self.breaker.name(),
            trace_id = %trace.trace_id(),
            span_id = %trace.span_id(),
            parent_span_id = %ctx.trace().span_id(),
        );

        async {
            let mut record = CallRecord {
                dependency: self.breaker.name(),
                start: Instant::now(),
                outcome: "abandoned",
            };

            let per_attempt = |attempt: u32| call(trace.clone(), attempt);
            let retry = &self.retry;
            let result = self
                .breaker
                .execute_classified(move || retry.run(ctx, per_attempt, is_retryable), classify)
                .await
                .map_err(InvokeError::from);

            record.outcome = match &result {
                Ok(_) => "success",
                Err(e) => e.outcome(),
            };
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, RetryConfig};
    use crate::resilience::circuit_breaker::{CircuitState, MockClock};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Error)]
    #[error("dependency down")]
    struct Down;

    fn invoker(max_retries: u32) -> (ResilientInvoker, MockClock) {
        let clock = MockClock::new();
        let breaker = CircuitBreaker::with_clock(
            &CircuitBreakerConfig {
                name: "invoker-test".to_string(),
                ..CircuitBreakerConfig::default()
            },
            Arc::new(clock.clone()),
        );
        let retry = RetryPolicy::new(
            &RetryConfig {
                max_retries,
                min_delay_ms: 1,
                max_delay_ms: 2,
            },
            "invoker-test",
        );
        (ResilientInvoker::new(Arc::new(breaker), retry), clock)
    }

    #[tokio::test]
    async fn test_success_passes_through_with_child_trace() {
        let (invoker, _clock) = invoker(2);
        let ctx = RequestContext::background();
        let seen = Mutex::new(Vec::new());

        let value = invoker
            .invoke(
                &ctx,
                |trace, _| {
                    seen.lock().unwrap().push(trace);
                    async { Ok::<_, Down>(42) }
                },
                |_| true,
            )
            .await
            .unwrap();

        assert_eq!(value, 42);
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].trace_id(), ctx.trace().trace_id());
        assert_eq!(seen[0].parent_span_id(), Some(ctx.trace().span_id()));
    }

    #[tokio::test]
    async fn test_retries_share_one_child_span() {
        let (invoker, _clock) = invoker(2);
        let ctx = RequestContext::background();
        let seen = Mutex::new(Vec::new());

        invoker
            .invoke(
                &ctx,
                |trace, attempt| {
                    seen.lock().unwrap().push(trace);
                    async move {
                        if attempt < 3 {
                            Err(Down)
                        } else {
                            Ok(())
                        }
                    }
                },
                |_| true,
            )
            .await
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|t| t.span_id() == seen[0].span_id()));
        assert_ne!(seen[0].span_id(), ctx.trace().span_id());
        assert_eq!(seen[0].parent_span_id(), Some(ctx.trace().span_id()));
    }

    #[tokio::test]
    async fn test_exhausted_retry_counts_once_against_breaker() {
        let (invoker, _clock) = invoker(2);
        let attempts = AtomicU32::new(0);

        let err = invoker
            .invoke(
                &RequestContext::background(),
                |_, _| {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(Down) }
                },
                |_| true,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            InvokeError::Retry(RetryError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(invoker.breaker().counts().total_failures, 1);
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits_before_retry() {
        let (invoker, _clock) = invoker(0);
        let ctx = RequestContext::background();
        for _ in 0..3 {
            let _ = invoker
                .invoke(&ctx, |_, _| async { Err::<(), _>(Down) }, |_| true)
                .await;
        }
        assert_eq!(invoker.breaker().state(), CircuitState::Open);

        let attempts = AtomicU32::new(0);
        let err = invoker
            .invoke(
                &ctx,
                |_, _| {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, Down>(()) }
                },
                |_| true,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, InvokeError::BreakerOpen { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_is_not_a_breaker_failure() {
        let (invoker, _clock) = invoker(0);
        let ctx = RequestContext::background();
        ctx.cancellation().cancel();

        for _ in 0..5 {
            let err = invoker
                .invoke(&ctx, |_, _| async { Err::<(), _>(Down) }, |_| true)
                .await
                .unwrap_err();
            assert!(matches!(err, InvokeError::Retry(RetryError::Cancelled { .. })));
        }
        assert_eq!(invoker.breaker().state(), CircuitState::Closed);
        assert_eq!(invoker.breaker().counts().requests, 0);
    }

    #[tokio::test]
    async fn test_dropped_invocation_releases_breaker_slot() {
        let (invoker, _clock) = invoker(0);
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            invoker.invoke(
                &RequestContext::background(),
                |_, _| futures_util::future::pending::<Result<(), Down>>(),
                |_| true,
            ),
        )
        .await;

        assert!(abandoned.is_err());
        assert_eq!(invoker.breaker().counts().requests, 0);
    }
}
