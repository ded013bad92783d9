//! Retry logic.
//!
//! # Responsibilities
//! - Re-run a unit of work up to `max_attempts` times
//! - Sleep with exponential backoff between failed attempts
//! - Optionally bound each attempt with a time limit
//!
//! The retrier never touches breaker, limiter or bulkhead state; it only
//! surfaces the final attempt's error.

use std::future::Future;
use std::time::Duration;

use crate::config::schema::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::{calculate_backoff, with_jitter};
use crate::resilience::error::NetworkError;

/// Per-invocation retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_interval: Duration,
    /// Growth factor applied after each failed attempt (>= 1).
    pub multiplier: f64,
    /// Upper bound on a single delay. `None` lets the delay grow unbounded.
    pub max_interval: Option<Duration>,
    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
    /// Time limit for a single attempt.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(100),
            multiplier: 2.0,
            max_interval: None,
            jitter: false,
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Build a policy from its config section and the optional call timeout.
    pub fn from_config(config: &RetryConfig, call_timeout: Option<Duration>) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            multiplier: config.multiplier.max(1.0),
            max_interval: config.max_interval_ms.map(Duration::from_millis),
            jitter: config.jitter,
            attempt_timeout: call_timeout,
        }
    }

    /// Delay before the attempt following the `failed_attempt`-th failure.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let delay = calculate_backoff(
            failed_attempt,
            self.initial_interval,
            self.multiplier,
            self.max_interval,
        );
        if self.jitter {
            with_jitter(delay)
        } else {
            delay
        }
    }
}

/// Run `work` under `policy`, sleeping between failed attempts.
///
/// Returns the first success, or the last attempt's error once every attempt
/// has failed. No sleep follows the final attempt.
pub async fn retry_with_backoff<F, Fut, T>(
    dependency: &str,
    policy: &RetryPolicy,
    mut work: F,
) -> Result<T, NetworkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NetworkError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, work()).await {
                Ok(result) => result,
                Err(_) => Err(NetworkError::Timeout(limit)),
            },
            None => work().await,
        };

        match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(dependency, attempt, "Call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts => {
                tracing::warn!(dependency, attempts = attempt, error = %e, "Retries exhausted");
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                tracing::info!(dependency, attempt, delay = ?delay, error = %e, "Retrying call");
                metrics::record_retry(dependency);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
