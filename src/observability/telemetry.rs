//! Span export to an OpenTelemetry collector.
//!
//! # Design Decisions
//! - Export is enabled only when `trace_collector_endpoint` is set
//! - OTLP over HTTP with protobuf bodies, batched on the tokio runtime
//! - Every span is sampled; the collector decides what to keep
//! - Exported spans join the trace carried in `traceparent`, so they line up
//!   with what downstream services receive

use opentelemetry::trace::{
    SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    TracerProvider as _,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{Config, Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use thiserror::Error;
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::registry::LookupSpan;
use url::Url;

use crate::config::ObservabilityConfig;
use crate::observability::TraceContext;

/// `service.name` reported on every exported span.
pub const SERVICE_NAME: &str = "product-service";

const TRACES_PATH: &str = "/v1/traces";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid trace collector endpoint '{endpoint}': {message}")]
    Endpoint { endpoint: String, message: String },

    #[error("failed to build span exporter: {0}")]
    Exporter(String),
}

/// Keeps the tracer provider alive; flushes pending spans on drop.
pub struct TelemetryGuard {
    provider: TracerProvider,
    endpoint: Url,
}

impl TelemetryGuard {
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("Failed to flush spans to {}: {}", self.endpoint, e);
        }
    }
}

/// Resolve the collector address to the OTLP traces URL.
///
/// A bare `host:port` is taken as plain HTTP, and an empty path becomes
/// `/v1/traces`.
pub fn traces_url(endpoint: &str) -> Result<Url, TelemetryError> {
    let invalid = |message: String| TelemetryError::Endpoint {
        endpoint: endpoint.to_string(),
        message,
    };

    let endpoint = endpoint.trim();
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };
    let mut url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    if url.path() == "/" {
        url.set_path(TRACES_PATH);
    }
    Ok(url)
}

/// Build the OpenTelemetry layer when a collector is configured.
///
/// Must be called from within a tokio runtime; the batch exporter runs on it.
pub fn layer<S>(
    config: &ObservabilityConfig,
) -> Result<Option<(OpenTelemetryLayer<S, Tracer>, TelemetryGuard)>, TelemetryError>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let Some(endpoint) = config.trace_collector_endpoint.as_deref() else {
        return Ok(None);
    };
    let endpoint = traces_url(endpoint)?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint.as_str())
        .build()
        .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    #[allow(deprecated)]
    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    SERVICE_NAME,
                )])),
        )
        .build();

    let tracer = provider.tracer(SERVICE_NAME);
    let layer = tracing_opentelemetry::layer().with_tracer(tracer);
    Ok(Some((layer, TelemetryGuard { provider, endpoint })))
}

/// The remote parent for the server span of `trace`.
///
/// This is the caller's span when the request carried one. Otherwise it is
/// the span id this service advertises in its own `traceparent`.
pub fn remote_parent(trace: &TraceContext) -> Context {
    let span_id = trace.parent_span_id().unwrap_or_else(|| trace.span_id());
    let flags = if trace.is_sampled() {
        TraceFlags::SAMPLED
    } else {
        TraceFlags::default()
    };
    let span_context = SpanContext::new(
        TraceId::from_bytes(trace.trace_id().to_bytes()),
        SpanId::from_bytes(span_id.to_bytes()),
        flags,
        true,
        TraceState::default(),
    );
    Context::new().with_remote_span_context(span_context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};
    use tracing_subscriber::Registry;

    #[test]
    fn test_traces_url_defaults() {
        assert_eq!(
            traces_url("collector:4318").unwrap().as_str(),
            "http://collector:4318/v1/traces"
        );
        assert_eq!(
            traces_url("https://otel.example.com").unwrap().as_str(),
            "https://otel.example.com/v1/traces"
        );
        assert_eq!(
            traces_url("http://otel.example.com/custom/traces").unwrap().as_str(),
            "http://otel.example.com/custom/traces"
        );
    }

    #[test]
    fn test_traces_url_rejects_bad_endpoints() {
        assert!(traces_url("ftp://collector:21").is_err());
        assert!(traces_url("http://").is_err());
        assert!(traces_url("not a url at all").is_err());
    }

    #[test]
    fn test_no_layer_without_collector() {
        let config = ObservabilityConfig::default();
        assert!(layer::<Registry>(&config).unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_layer_installed_for_configured_collector() {
        let config = ObservabilityConfig {
            trace_collector_endpoint: Some("127.0.0.1:4318".to_string()),
            ..ObservabilityConfig::default()
        };

        let (_layer, guard) = layer::<Registry>(&config)
            .unwrap()
            .expect("collector is configured");
        assert_eq!(guard.endpoint().as_str(), "http://127.0.0.1:4318/v1/traces");
    }

    #[test]
    fn test_invalid_collector_is_an_error() {
        let config = ObservabilityConfig {
            trace_collector_endpoint: Some("ftp://collector".to_string()),
            ..ObservabilityConfig::default()
        };
        assert!(matches!(
            layer::<Registry>(&config),
            Err(TelemetryError::Endpoint { .. })
        ));
    }

    #[test]
    fn test_remote_parent_is_the_callers_span() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "traceparent",
            HeaderValue::from_static("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
        );
        let trace = TraceContext::from_headers(&headers);

        let cx = remote_parent(&trace);
        let parent = cx.span().span_context().clone();
        assert!(parent.is_remote());
        assert!(parent.is_sampled());
        assert_eq!(parent.trace_id().to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(parent.span_id().to_string(), "00f067aa0ba902b7");
    }

    #[test]
    fn test_remote_parent_of_root_trace_uses_advertised_span() {
        let trace = TraceContext::new_root();
        let cx = remote_parent(&trace);
        let parent = cx.span().span_context().clone();
        assert_eq!(parent.trace_id().to_string(), trace.trace_id().to_string());
        assert_eq!(parent.span_id().to_string(), trace.span_id().to_string());
    }
}
