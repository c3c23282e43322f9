//! Product domain.
//!
//! # Data Flow
//! ```text
//! POST /products      → CreateProductHandler → ProductStore::create
//! GET  /products/{id} → GetProductHandler    → ResilientInvoker (dependency check)
//!                                            → ProductStore::get
//! ```

pub mod handlers;
pub mod model;
pub mod store;

pub use handlers::{
    CreateProductHandler, CreateProductRequest, CreateProductResponse, GetProductHandler,
    GetProductRequest, GetProductResponse,
};
pub use model::Product;
pub use store::{InMemoryStore, ProductStore, StoreError};
