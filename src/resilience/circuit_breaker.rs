//! Circuit breaker guarding one named dependency.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: dependency assumed down, requests fail fast
//! - Half-Open: a limited number of probes test whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: requests >= min_requests and failures/requests >= failure_ratio
//! Open → Half-Open: after open_timeout
//! Half-Open → Closed: max_probe_requests consecutive successes
//! Half-Open → Open: any probe fails
//! ```
//!
//! # Design Decisions
//! - One instance per dependency, shared by every task calling it
//! - Counts live in a rolling window that is cleared on every state change
//!   and, while closed, every `interval`
//! - Each state change starts a new generation; results of calls admitted in
//!   an older generation are discarded
//! - Time comes from a [`Clock`] so transitions can be tested without sleeping

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Source of monotonic time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced time for tests.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed += by;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Breaker state. The discriminant is exported as the `circuit_breaker_state` gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts for the current window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    /// Give back the admission of a call whose result does not count.
    fn on_ignored(&mut self) {
        self.requests = self.requests.saturating_sub(1);
    }
}

/// How a finished call is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
    /// Neither success nor failure; the admission is returned.
    Ignored,
}

/// Notification emitted on every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub name: String,
    pub from: CircuitState,
    pub to: CircuitState,
}

type Listener = Arc<dyn Fn(&StateChange) + Send + Sync>;

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker is open; the call was not attempted.
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    /// The breaker is half-open and all probe slots are taken.
    #[error("circuit breaker '{name}' is half-open and has no probe slots left")]
    TooManyProbes { name: String },

    /// The call was attempted and failed.
    #[error(transparent)]
    Inner(E),
}

struct Inner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    /// End of the current window (closed) or of the open period (open).
    expiry: Option<Instant>,
}

pub struct CircuitBreaker {
    name: String,
    max_probe_requests: u32,
    interval: Duration,
    open_timeout: Duration,
    min_requests: u32,
    failure_ratio: f64,
    clock: Arc<dyn Clock>,
    listeners: Vec<Listener>,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("counts", &self.counts())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let interval = Duration::from_millis(config.interval_ms);
        let now = clock.now();
        Self {
            name: config.name.clone(),
            max_probe_requests: config.max_probe_requests.max(1),
            interval,
            open_timeout: Duration::from_millis(config.open_timeout_ms),
            min_requests: config.min_requests,
            failure_ratio: config.failure_ratio,
            clock,
            listeners: Vec::new(),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry: (!interval.is_zero()).then(|| now + interval),
            }),
        }
    }

    /// Register a state change observer.
    pub fn on_state_change<F>(mut self, listener: F) -> Self
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, applying any time-based transition that is due.
    pub fn state(&self) -> CircuitState {
        let mut changes = Vec::new();
        let state = {
            let mut inner = self.lock();
            self.current_state(&mut inner, self.clock.now(), &mut changes);
            inner.state
        };
        self.emit(changes);
        state
    }

    /// Counts of the current window.
    pub fn counts(&self) -> Counts {
        let mut changes = Vec::new();
        let counts = {
            let mut inner = self.lock();
            self.current_state(&mut inner, self.clock.now(), &mut changes);
            inner.counts
        };
        self.emit(changes);
        counts
    }

    /// Run `call` through the breaker, counting every error as a failure.
    pub async fn execute<F, Fut, T, E>(&self, call: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_classified(call, |_| CallOutcome::Failure).await
    }

    /// Run `call` through the breaker; `classify` decides how an error counts.
    ///
    /// A call whose future is dropped before completing is recorded as
    /// [`CallOutcome::Ignored`].
    pub async fn execute_classified<F, Fut, T, E, C>(
        &self,
        call: F,
        classify: C,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&E) -> CallOutcome,
    {
        let generation = self.before_call()?;
        let mut guard = Admission {
            breaker: self,
            generation,
            settled: false,
        };

        let result = call().await;
        let outcome = match &result {
            Ok(_) => CallOutcome::Success,
            Err(e) => classify(e),
        };
        guard.settle(outcome);

        result.map_err(BreakerError::Inner)
    }

    fn before_call<E>(&self) -> Result<u64, BreakerError<E>> {
        let mut changes = Vec::new();
        let admitted = {
            let mut inner = self.lock();
            self.current_state(&mut inner, self.clock.now(), &mut changes);
            match inner.state {
                CircuitState::Open => Err(BreakerError::Open {
                    name: self.name.clone(),
                }),
                CircuitState::HalfOpen if inner.counts.requests >= self.max_probe_requests => {
                    Err(BreakerError::TooManyProbes {
                        name: self.name.clone(),
                    })
                }
                _ => {
                    inner.counts.on_request();
                    Ok(inner.generation)
                }
            }
        };
        self.emit(changes);

        if admitted.is_err() {
            metrics::record_breaker_rejection(&self.name);
            tracing::debug!(name = %self.name, "Circuit breaker rejected call");
        }
        admitted
    }

    fn after_call(&self, generation: u64, outcome: CallOutcome) {
        let mut changes = Vec::new();
        {
            let mut inner = self.lock();
            let now = self.clock.now();
            self.current_state(&mut inner, now, &mut changes);
            // results from an older generation are dropped
            if inner.generation == generation {
                match outcome {
                    CallOutcome::Success => self.on_success(&mut inner, now, &mut changes),
                    CallOutcome::Failure => self.on_failure(&mut inner, now, &mut changes),
                    CallOutcome::Ignored => inner.counts.on_ignored(),
                }
            }
        }
        self.emit(changes);
    }

    fn on_success(&self, inner: &mut Inner, now: Instant, changes: &mut Vec<StateChange>) {
        inner.counts.on_success();
        if inner.state == CircuitState::HalfOpen
            && inner.counts.consecutive_successes >= self.max_probe_requests
        {
            self.set_state(inner, CircuitState::Closed, now, changes);
        }
    }

    fn on_failure(&self, inner: &mut Inner, now: Instant, changes: &mut Vec<StateChange>) {
        inner.counts.on_failure();
        match inner.state {
            CircuitState::Closed if self.ready_to_trip(&inner.counts) => {
                self.set_state(inner, CircuitState::Open, now, changes);
            }
            CircuitState::HalfOpen => self.set_state(inner, CircuitState::Open, now, changes),
            _ => {}
        }
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.min_requests
            && counts.requests > 0
            && f64::from(counts.total_failures) / f64::from(counts.requests) >= self.failure_ratio
    }

    /// Apply time-based transitions.
    fn current_state(&self, inner: &mut Inner, now: Instant, changes: &mut Vec<StateChange>) {
        match (inner.state, inner.expiry) {
            (CircuitState::Closed, Some(expiry)) if expiry <= now => {
                self.new_generation(inner, now);
            }
            (CircuitState::Open, Some(expiry)) if expiry <= now => {
                self.set_state(inner, CircuitState::HalfOpen, now, changes);
            }
            _ => {}
        }
    }

    fn set_state(
        &self,
        inner: &mut Inner,
        to: CircuitState,
        now: Instant,
        changes: &mut Vec<StateChange>,
    ) {
        if inner.state == to {
            return;
        }
        let from = inner.state;
        inner.state = to;
        self.new_generation(inner, now);
        changes.push(StateChange {
            name: self.name.clone(),
            from,
            to,
        });
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed => (!self.interval.is_zero()).then(|| now + self.interval),
            CircuitState::Open => Some(now + self.open_timeout),
            CircuitState::HalfOpen => None,
        };
    }

    /// Publish state changes outside the lock.
    fn emit(&self, changes: Vec<StateChange>) {
        for change in changes {
            tracing::info!(
                name = %change.name,
                from = %change.from,
                to = %change.to,
                "Circuit breaker state changed"
            );
            metrics::record_breaker_transition(&change.name, change.from, change.to);
            for listener in &self.listeners {
                if catch_unwind(AssertUnwindSafe(|| listener(&change))).is_err() {
                    tracing::warn!(name = %change.name, "Circuit breaker listener panicked");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Records the call's outcome, or `Ignored` if the call never finished.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl Admission<'_> {
    fn settle(&mut self, outcome: CallOutcome) {
        self.settled = true;
        self.breaker.after_call(self.generation, outcome);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.after_call(self.generation, CallOutcome::Ignored);
        }
    }
}
