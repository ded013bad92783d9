//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → dependency registry builds one guard per dependency
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → registry reconfigures existing guards in place
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Dependencies override whole sections of `[defaults]`
//! - Validation separates syntactic (serde) from semantic checks
//! - Reload never resets breaker or limiter counters

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, BulkheadConfig, CircuitBreakerConfig, DependencyConfig, FallbackConfig,
    GatewayConfig, ListenerConfig, ObservabilityConfig, RateLimitConfig, ResilienceConfig,
    RetryConfig, RouteConfig, TimeoutConfig,
};
