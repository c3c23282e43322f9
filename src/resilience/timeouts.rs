//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound a single operation by a fixed limit
//! - Shrink that limit to whatever is left of the request deadline
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Timed-out dependency calls surface as 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::context::RequestContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {0:?}")]
pub struct TimeoutError(pub Duration);

/// The smaller of `limit` and the time left on the request deadline.
pub fn effective_timeout(ctx: &RequestContext, limit: Duration) -> Duration {
    match ctx.remaining() {
        Some(left) => left.min(limit),
        None => limit,
    }
}

/// Run `fut`, giving up after `limit` or at the request deadline.
pub async fn with_timeout<F, T>(
    ctx: &RequestContext,
    limit: Duration,
    fut: F,
) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    let limit = effective_timeout(ctx, limit);
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| TimeoutError(limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::TraceContext;

    #[tokio::test]
    async fn test_deadline_shrinks_limit() {
        let ctx = RequestContext::new(TraceContext::new_root(), Duration::from_millis(50));
        assert!(effective_timeout(&ctx, Duration::from_secs(10)) <= Duration::from_millis(50));
        assert_eq!(
            effective_timeout(&RequestContext::background(), Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn test_times_out_slow_operation() {
        let ctx = RequestContext::background();
        let slow = with_timeout(&ctx, Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;
        assert_eq!(slow, Err(TimeoutError(Duration::from_millis(10))));

        let fast = with_timeout(&ctx, Duration::from_secs(1), async { 7 }).await;
        assert_eq!(fast, Ok(7));
    }
}
