//! Product endpoints.
//!
//! - `CreateProductHandler`: assigns a fresh UUID and stores the product
//! - `GetProductHandler`: checks the outbound dependency through the
//!   resilient invoker, then reads the product from the store

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::Product;
use super::store::{ProductStore, StoreError};
use crate::context::RequestContext;
use crate::dependency::{DependencyClient, DependencyError};
use crate::error::ServiceError;
use crate::http::dispatch::Handler;
use crate::http::request::{bind_json, BindSource, Bindable, BindingError, Params};
use crate::resilience::{with_timeout, ResilientInvoker};

/// Longest accepted product id, in bytes.
const MAX_ID_LEN: usize = 250;

#[derive(Debug, Default)]
pub struct GetProductRequest {
    pub id: String,
}

impl Bindable for GetProductRequest {
    fn bind_path(&mut self, params: &Params) -> Result<(), BindingError> {
        if let Some(id) = params.get("id") {
            if id.trim().is_empty() || id.len() > MAX_ID_LEN {
                return Err(BindingError::new(
                    BindSource::Path,
                    format!("id must be 1 to {} bytes", MAX_ID_LEN),
                ));
            }
            self.id = id.to_string();
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetProductResponse {
    pub product: Product,
}

#[derive(Debug, Default)]
pub struct CreateProductRequest {
    pub name: String,
}

#[derive(Deserialize)]
struct CreateProductBody {
    name: Option<String>,
}

impl Bindable for CreateProductRequest {
    fn bind_body(&mut self, body: &[u8]) -> Result<(), BindingError> {
        if let Some(name) = bind_json::<CreateProductBody>(body)?.and_then(|b| b.name) {
            self.name = name;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateProductResponse {
    pub id: String,
}

/// Run a store operation under the storage timeout and the request deadline.
async fn bounded<T, F>(ctx: &RequestContext, limit: Duration, op: F) -> Result<T, ServiceError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    match with_timeout(ctx, limit, op).await {
        Ok(result) => result.map_err(ServiceError::from),
        Err(elapsed) => Err(StoreError::Timeout(elapsed.0).into()),
    }
}

pub struct CreateProductHandler {
    store: Arc<dyn ProductStore>,
    store_timeout: Duration,
}

impl CreateProductHandler {
    pub fn new(store: Arc<dyn ProductStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }
}

#[async_trait]
impl Handler for CreateProductHandler {
    type Request = CreateProductRequest;
    type Response = CreateProductResponse;

    const STATUS: StatusCode = StatusCode::CREATED;

    async fn handle(
        &self,
        ctx: &RequestContext,
        request: CreateProductRequest,
    ) -> Result<CreateProductResponse, ServiceError> {
        if request.name.trim().is_empty() {
            return Err(BindingError::new(BindSource::Body, "name is required").into());
        }

        let product = Product::new(Uuid::new_v4().to_string(), request.name);
        bounded(ctx, self.store_timeout, self.store.create(ctx, &product)).await?;

        tracing::info!(id = %product.id, trace_id = %ctx.trace().trace_id(), "Product created");
        Ok(CreateProductResponse { id: product.id })
    }
}

pub struct GetProductHandler {
    invoker: ResilientInvoker,
    client: DependencyClient,
    probe_path: String,
    store: Arc<dyn ProductStore>,
    store_timeout: Duration,
}

impl GetProductHandler {
    pub fn new(
        invoker: ResilientInvoker,
        client: DependencyClient,
        probe_path: impl Into<String>,
        store: Arc<dyn ProductStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            invoker,
            client,
            probe_path: probe_path.into(),
            store,
            store_timeout,
        }
    }

    /// Guarded dependency check that precedes every lookup.
    async fn check_dependency(&self, ctx: &RequestContext) -> Result<(), ServiceError> {
        let client = &self.client;
        let path = self.probe_path.as_str();

        let response = self
            .invoker
            .invoke(
                ctx,
                |trace, _attempt| {
                    let limit = ctx.remaining().unwrap_or(Duration::MAX);
                    async move { client.get(&trace, path, limit).await }
                },
                DependencyError::is_retryable,
            )
            .await?;

        tracing::debug!(
            status = response.status.as_u16(),
            bytes = response.body.len(),
            "Dependency check passed"
        );
        Ok(())
    }
}

#[async_trait]
impl Handler for GetProductHandler {
    type Request = GetProductRequest;
    type Response = GetProductResponse;

    async fn handle(
        &self,
        ctx: &RequestContext,
        request: GetProductRequest,
    ) -> Result<GetProductResponse, ServiceError> {
        if request.id.is_empty() {
            return Err(BindingError::new(BindSource::Path, "id is required").into());
        }

        self.check_dependency(ctx).await?;

        let product = bounded(ctx, self.store_timeout, self.store.get(ctx, &request.id)).await?;
        Ok(GetProductResponse { product })
    }
}
