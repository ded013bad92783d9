//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → server.rs (route match by path prefix)
//!     → dependency guard (breaker, limiter, bulkhead, retries)
//!     → cache.rs (last good payload for fallback)
//!     → response.rs (outcome → status code)
//!     → Send to client
//! ```

pub mod cache;
pub mod request;
pub mod response;
pub mod server;

pub use cache::{ResponseCache, UpstreamPayload};
pub use request::{RequestId, RequestIdExt, RequestIdLayer, X_REQUEST_ID};
pub use server::HttpServer;
