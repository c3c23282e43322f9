//! Product service library.
//!
//! A small HTTP service whose product lookups consult an outbound dependency
//! through a circuit breaker and a bounded retry policy before reading
//! storage.

pub mod config;
pub mod context;
pub mod dependency;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod product;
pub mod resilience;

pub use config::AppConfig;
pub use context::RequestContext;
pub use error::ServiceError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
