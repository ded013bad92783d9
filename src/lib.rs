//! Resilience gateway library.
//!
//! Per-dependency circuit breaking, fixed-window rate limiting, bulkhead
//! isolation and backoff retries, exposed through an HTTP gateway.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::{DependencyRegistry, Orchestrator, ResilienceError};
