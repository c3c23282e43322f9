//! Generic request dispatch.
//!
//! # Data Flow
//! ```text
//! axum route
//!     → Dispatcher::dispatch
//!         → TraceContext::from_headers + RequestContext (deadline, cancellation)
//!         → request.rs (bind body, path, query, headers)
//!         → Handler::handle
//!         → response.rs (status + JSON)
//! ```
//!
//! # Design Decisions
//! - Binding failures never reach the handler
//! - The request context is cancelled when the client goes away
//!   (the dispatch future is dropped)
//! - Nothing from one request is kept after its response is built

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::request::{bind_request, Bindable};
use super::response::json;
use crate::context::RequestContext;
use crate::error::ServiceError;
use crate::observability::{metrics, telemetry};
use crate::observability::tracing::TRACEPARENT;
use crate::observability::TraceContext;

/// Business logic behind one route.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    type Request: Bindable;
    type Response: Serialize + Send;

    /// Status returned on success.
    const STATUS: StatusCode = StatusCode::OK;

    async fn handle(
        &self,
        ctx: &RequestContext,
        request: Self::Request,
    ) -> Result<Self::Response, ServiceError>;
}

/// Limits applied to every dispatched request.
#[derive(Debug, Clone, Copy)]
pub struct DispatchLimits {
    pub max_body_size: usize,
    pub request_timeout: Duration,
}

pub struct Dispatcher<H> {
    handler: Arc<H>,
    route: &'static str,
    limits: DispatchLimits,
}

impl<H> Clone for Dispatcher<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            route: self.route,
            limits: self.limits,
        }
    }
}

impl<H: Handler> Dispatcher<H> {
    pub fn new(handler: Arc<H>, route: &'static str, limits: DispatchLimits) -> Self {
        Self {
            handler,
            route,
            limits,
        }
    }

    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().to_string();

        let trace = TraceContext::from_headers(request.headers());
        let ctx = RequestContext::new(trace, self.limits.request_timeout);
        let _cancel_on_drop = ctx.cancellation().clone().drop_guard();

        let span = tracing::info_span!(
            "request",
            route = self.route,
            method = %method,
            trace_id = %ctx.trace().trace_id(),
            span_id = %ctx.trace().span_id(),
        );
        span.set_parent(telemetry::remote_parent(ctx.trace()));

        let mut response = match self.run(&ctx, request).instrument(span).await {
            Ok(body) => json(H::STATUS, body),
            Err(e) => e.into_response(),
        };

        if let Ok(value) = HeaderValue::from_str(&ctx.trace().traceparent()) {
            response.headers_mut().insert(TRACEPARENT, value);
        }
        metrics::record_request(&method, self.route, response.status().as_u16(), start);
        response
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        request: Request<Body>,
    ) -> Result<H::Response, ServiceError> {
        let bound = bind_request::<H::Request>(request, self.limits.max_body_size).await?;
        self.handler.handle(ctx, bound).await
    }
}
