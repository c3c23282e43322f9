//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → tracing.rs (trace context carried across inbound and outbound calls)
//!     → telemetry.rs (span export to an OTLP collector, when configured)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape on /metrics)
//!     → Downstream services (traceparent + baggage headers)
//!     → Trace collector (OTLP over HTTP)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Trace context is passed explicitly, never through thread-locals
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod telemetry;
pub mod tracing;

pub use self::tracing::{SpanId, TraceContext, TraceId};
