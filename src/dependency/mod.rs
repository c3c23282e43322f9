//! Outbound dependencies.
//!
//! # Data Flow
//! ```text
//! product handler
//!     → resilience::ResilientInvoker (breaker + retry + span)
//!     → client.rs (one HTTP attempt, trace headers injected)
//!     → dependency service
//! ```

pub mod client;

pub use client::{DependencyClient, DependencyError, DependencyResponse};
