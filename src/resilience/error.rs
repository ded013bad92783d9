//! Error taxonomy for protected calls.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single attempt against the protected dependency.
///
/// Every variant is transient from the resilience layer's point of view and
/// is therefore retried by the backoff retrier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    /// Connection could not be established or was reset.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Upstream answered with a non-success status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Attempt exceeded the configured call timeout.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Structured outcome of a rejected or failed orchestrated call.
#[derive(Debug, Clone, Error)]
pub enum ResilienceError {
    /// Breaker is open; the network was not touched.
    #[error("circuit open for dependency '{dependency}'")]
    CircuitOpen {
        dependency: String,
        /// Time left until the breaker admits a probe call.
        retry_after: Option<Duration>,
    },

    /// Admission denied by the fixed-window rate limiter.
    #[error("rate limit exceeded for dependency '{dependency}'")]
    RateLimited {
        dependency: String,
        /// Time left in the current window.
        retry_after: Duration,
    },

    /// No bulkhead permit became available within the configured wait.
    #[error("bulkhead full for dependency '{dependency}' after waiting {waited:?}")]
    BulkheadFull { dependency: String, waited: Duration },

    /// All attempts failed; carries the last attempt's error.
    #[error("dependency '{dependency}' failed after {attempts} attempts: {last}")]
    RetryExhausted {
        dependency: String,
        attempts: u32,
        #[source]
        last: NetworkError,
    },
}

/// Stable classification of [`ResilienceError`] used for logs and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CircuitOpen,
    RateLimited,
    BulkheadFull,
    RetryExhausted,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::BulkheadFull => "bulkhead_full",
            ErrorKind::RetryExhausted => "retry_exhausted",
        }
    }
}

impl ResilienceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResilienceError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            ResilienceError::RateLimited { .. } => ErrorKind::RateLimited,
            ResilienceError::BulkheadFull { .. } => ErrorKind::BulkheadFull,
            ResilienceError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
        }
    }

    /// Name of the dependency that produced the error.
    pub fn dependency(&self) -> &str {
        match self {
            ResilienceError::CircuitOpen { dependency, .. }
            | ResilienceError::RateLimited { dependency, .. }
            | ResilienceError::BulkheadFull { dependency, .. }
            | ResilienceError::RetryExhausted { dependency, .. } => dependency,
        }
    }

    /// Hint for when the caller may try again, if one is known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ResilienceError::CircuitOpen { retry_after, .. } => *retry_after,
            ResilienceError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Failure reported by a post-processing or compensation hook.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
