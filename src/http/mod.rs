//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, request ID, tracing, limits)
//!     → dispatch.rs (per-request context, handler call)
//!     → request.rs (bind body, path, query, headers)
//!     → response.rs (status mapping, JSON)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;

pub use dispatch::{DispatchLimits, Dispatcher, Handler};
pub use request::{BindSource, Bindable, BindingError, Params};
pub use server::HttpServer;
