//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): inbound requests by method, route, status
//! - `http_request_duration_seconds` (histogram): inbound latency
//! - `circuit_breaker_transitions_total` (counter): state changes by name, from, to
//! - `circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `circuit_breaker_rejections_total` (counter): calls refused by an open breaker
//! - `dependency_retries_total` (counter): retry attempts per dependency
//! - `dependency_call_duration_seconds` (histogram): outbound latency by outcome
//!
//! # Design Decisions
//! - `metrics` facade; the Prometheus recorder is installed once per process
//! - Rendering happens on the `/metrics` route of the main listener

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::resilience::circuit_breaker::CircuitState;

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder (first call) and return its handle.
pub fn init_metrics() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            let builder = match PrometheusBuilder::new()
                .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), LATENCY_BUCKETS)
            {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(error = %e, "Falling back to default histogram buckets");
                    PrometheusBuilder::new()
                }
            };
            let recorder = builder.build_recorder();
            let handle = recorder.handle();
            if let Err(e) = metrics::set_global_recorder(recorder) {
                tracing::warn!(error = %e, "Global metrics recorder already installed");
            }
            handle
        })
        .clone()
}

/// Periodically drain histogram buffers so rendering stays cheap.
pub fn spawn_upkeep(handle: PrometheusHandle, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            handle.run_upkeep();
        }
    })
}

pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_breaker_transition(name: &str, from: CircuitState, to: CircuitState) {
    counter!(
        "circuit_breaker_transitions_total",
        "name" => name.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    gauge!("circuit_breaker_state", "name" => name.to_string()).set(to as u8 as f64);
}

pub fn record_breaker_rejection(name: &str) {
    counter!("circuit_breaker_rejections_total", "name" => name.to_string()).increment(1);
}

pub fn record_retry(dependency: &str) {
    counter!("dependency_retries_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_dependency_call(dependency: &str, outcome: &'static str, elapsed: Duration) {
    histogram!(
        "dependency_call_duration_seconds",
        "dependency" => dependency.to_string(),
        "outcome" => outcome
    )
    .record(elapsed.as_secs_f64());
}
