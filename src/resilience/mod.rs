//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency:
//!     → invoker.rs (child span, metrics, composition)
//!     → circuit_breaker.rs (fail fast if the dependency is presumed down)
//!     → retries.rs (retry eligible failures with backoff.rs delays)
//!     → timeouts.rs (every attempt is bounded by the request deadline)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - One breaker per dependency, owned by the invoker and shared explicitly
//! - Cancellation is checked before every attempt and during every backoff

pub mod backoff;
pub mod circuit_breaker;
pub mod invoker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{
    BreakerError, CallOutcome, CircuitBreaker, CircuitState, Clock, Counts, MockClock,
    StateChange, SystemClock,
};
pub use invoker::{InvokeError, ResilientInvoker};
pub use retries::{RetryError, RetryPolicy};
pub use timeouts::{with_timeout, TimeoutError};
