//! Product storage capability.
//!
//! The service talks to storage only through [`ProductStore`]. The default
//! adapter keeps products in process memory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use super::model::Product;
use crate::config::StorageConfig;
use crate::context::RequestContext;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("product not found")]
    NotFound { id: String },

    #[error("product {id} already exists")]
    AlreadyExists { id: String },

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage error: {0}")]
    Backend(String),
}

/// Persistence for products, owned by the storage collaborator.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn create(&self, ctx: &RequestContext, product: &Product) -> Result<(), StoreError>;

    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Product, StoreError>;

    /// Succeeds once the store can serve requests.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Products kept in a concurrent map, one map per bucket.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    bucket: String,
    products: Arc<DashMap<String, Product>>,
}

impl InMemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            products: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn create(&self, _ctx: &RequestContext, product: &Product) -> Result<(), StoreError> {
        match self.products.entry(product.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                id: product.id.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(product.clone());
                tracing::debug!(bucket = %self.bucket, id = %product.id, "Stored product");
                Ok(())
            }
        }
    }

    async fn get(&self, _ctx: &RequestContext, id: &str) -> Result<Product, StoreError> {
        self.products
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Open the store selected by `storage.endpoint`.
pub fn open(config: &StorageConfig) -> Result<Arc<dyn ProductStore>, StoreError> {
    if config.endpoint.starts_with("memory://") {
        tracing::info!(bucket = %config.bucket, "Using in-memory product store");
        return Ok(Arc::new(InMemoryStore::new(config.bucket.clone())));
    }
    Err(StoreError::Unavailable(format!(
        "no adapter for storage endpoint {}",
        config.endpoint
    )))
}
