//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call to a dependency:
//!     → registry.rs (look up the dependency's guard)
//!     → orchestrator.rs
//!         → circuit_breaker.rs (fail fast while open)
//!         → rate_limit.rs (fixed-window admission)
//!         → bulkhead.rs (bounded in-flight permits)
//!         → retries.rs + backoff.rs (attempts with exponential delay)
//!         → hooks.rs (fallback / compensation on the payload)
//! ```
//!
//! # Design Decisions
//! - One guard per dependency, no global state
//! - The breaker is the single source of "dependency unavailable"
//! - Locks guard counters only; nothing is held across an await
//! - All state is process-local and lost on restart

pub mod backoff;
pub mod bulkhead;
pub mod circuit_breaker;
pub mod error;
pub mod hooks;
pub mod orchestrator;
pub mod rate_limit;
pub mod registry;
pub mod retries;

pub use bulkhead::{Bulkhead, BulkheadPermit};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use error::{ErrorKind, HookError, NetworkError, ResilienceError};
pub use hooks::{CallHooks, CallOutcome, Compensation, CompensationReport, Fallback};
pub use orchestrator::{DependencySnapshot, Orchestrator};
pub use rate_limit::RateLimiter;
pub use registry::DependencyRegistry;
pub use retries::{retry_with_backoff, RetryPolicy};
