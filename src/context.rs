//! Per-request execution context.
//!
//! Carries the trace context, the caller's cancellation signal and the
//! overall deadline through every call made on behalf of one inbound request.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::observability::TraceContext;

#[derive(Debug, Clone)]
pub struct RequestContext {
    trace: TraceContext,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Context for an inbound request that must finish within `budget`.
    pub fn new(trace: TraceContext, budget: Duration) -> Self {
        Self {
            trace,
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + budget),
        }
    }

    /// Root context with no deadline, for background work and tests.
    pub fn background() -> Self {
        Self {
            trace: TraceContext::new_root(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| d <= Instant::now())
    }

    /// Time left before the deadline. `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Resolves when the deadline passes; never resolves without one.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
