//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Assemble the product handlers and their collaborators
//! - Create the Axum Router (products, healthcheck, metrics)
//! - Wire up middleware (request ID, tracing, body limit, timeout)
//! - Serve on a listener until shutdown is triggered

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::dispatch::{DispatchLimits, Dispatcher};
use crate::config::AppConfig;
use crate::dependency::{DependencyClient, DependencyError};
use crate::lifecycle::Shutdown;
use crate::product::{CreateProductHandler, GetProductHandler, ProductStore};
use crate::resilience::{CircuitBreaker, ResilientInvoker, RetryPolicy};

/// Extra time the outer timeout layer allows beyond the request deadline.
const TIMEOUT_GRACE: Duration = Duration::from_secs(1);

/// Application state injected into handlers.
#[derive(Clone, Default)]
pub struct AppState {
    pub metrics: Option<PrometheusHandle>,
}

/// HTTP server for the product service.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
    breaker: Arc<CircuitBreaker>,
}

impl HttpServer {
    /// Build the server around `store`, guarding the dependency with a
    /// fresh circuit breaker.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ProductStore>,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self, DependencyError> {
        let breaker = Arc::new(CircuitBreaker::new(&config.circuit_breaker));
        Self::with_breaker(config, store, metrics, breaker)
    }

    /// Build the server with a caller-supplied breaker.
    pub fn with_breaker(
        config: AppConfig,
        store: Arc<dyn ProductStore>,
        metrics: Option<PrometheusHandle>,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, DependencyError> {
        let client = DependencyClient::new(&config.dependency, &config.timeouts)?;
        let retry = RetryPolicy::new(&config.retry, config.circuit_breaker.name.clone());
        let invoker = ResilientInvoker::new(Arc::clone(&breaker), retry);
        let store_timeout = Duration::from_millis(config.storage.operation_timeout_ms);

        let limits = DispatchLimits {
            max_body_size: config.listener.max_body_size,
            request_timeout: config.timeouts.request(),
        };
        let get_product = Dispatcher::new(
            Arc::new(GetProductHandler::new(
                invoker,
                client,
                config.dependency.probe_path.clone(),
                Arc::clone(&store),
                store_timeout,
            )),
            "/products/{id}",
            limits,
        );
        let create_product = Dispatcher::new(
            Arc::new(CreateProductHandler::new(store, store_timeout)),
            "/products",
            limits,
        );

        let state = AppState {
            metrics: metrics.filter(|_| config.observability.metrics_enabled),
        };
        let router = Self::build_router(&config, state, get_product, create_product);

        Ok(Self {
            router,
            config,
            breaker,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &AppConfig,
        state: AppState,
        get_product: Dispatcher<GetProductHandler>,
        create_product: Dispatcher<CreateProductHandler>,
    ) -> Router {
        Router::new()
            .route(
                "/products/{id}",
                get(move |request: Request| async move { get_product.dispatch(request).await }),
            )
            .route(
                "/products",
                post(move |request: Request| async move { create_product.dispatch(request).await }),
            )
            .route("/healthcheck", get(healthcheck))
            .route("/metrics", get(render_metrics))
            .with_state(state)
            .layer(TimeoutLayer::new(config.timeouts.request() + TIMEOUT_GRACE))
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_size))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// A handle to the router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Serve on `listener` until `shutdown` is triggered, then drain.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            dependency = %self.config.dependency.base_url,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn healthcheck() -> &'static str {
    "OK"
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
