//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (PORT, DEPENDENCY_BASE_URL, ...)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → handed to constructors at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, load_config, ConfigError};
pub use schema::{
    AppConfig, CircuitBreakerConfig, DependencyConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, RetryConfig, StorageConfig, TimeoutConfig,
};
