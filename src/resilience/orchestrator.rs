//! Resilient call orchestration for a single dependency.
//!
//! # Call Order
//! ```text
//! call(work)
//!     → circuit breaker gate      (open → CircuitOpen, nothing else touched)
//!     → rate limiter admission    (full window → RateLimited)
//!     → bulkhead permit           (waits while saturated)
//!     → retrier runs work         (backoff between failed attempts)
//!     → breaker records exactly one success or failure
//!     → fallback / compensation on the successful payload
//!     → permit released on drop
//! ```
//!
//! Cancelling the returned future releases the permit and records nothing.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::schema::ResilienceConfig;
use crate::observability::metrics;
use crate::resilience::bulkhead::{Bulkhead, BulkheadSnapshot};
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreaker};
use crate::resilience::error::{NetworkError, ResilienceError};
use crate::resilience::hooks::{CallHooks, CallOutcome, CompensationReport};
use crate::resilience::rate_limit::{RateLimiter, RateLimiterSnapshot};
use crate::resilience::retries::{retry_with_backoff, RetryPolicy};

/// Retry settings as reported by [`DependencySnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct RetrySnapshot {
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    pub max_interval_ms: Option<u64>,
    pub attempt_timeout_ms: Option<u64>,
}

/// Point-in-time view of every guard protecting a dependency.
#[derive(Debug, Clone, Serialize)]
pub struct DependencySnapshot {
    pub name: String,
    pub circuit_breaker: BreakerSnapshot,
    pub rate_limiter: RateLimiterSnapshot,
    pub bulkhead: BulkheadSnapshot,
    pub retry: RetrySnapshot,
    pub open_on_exhaustion: bool,
}

/// Composes breaker, limiter, bulkhead and retrier around outbound calls to
/// one named dependency.
#[derive(Debug)]
pub struct Orchestrator {
    name: String,
    breaker: CircuitBreaker,
    limiter: RateLimiter,
    bulkhead: Bulkhead,
    policy: ArcSwap<RetryPolicy>,
    open_on_exhaustion: AtomicBool,
}

impl Orchestrator {
    pub fn new(name: impl Into<String>, config: &ResilienceConfig) -> Self {
        let name = name.into();
        let policy = RetryPolicy::from_config(&config.retry, config.call_timeout());

        tracing::info!(
            dependency = %name,
            max_failures = config.circuit_breaker.max_failures,
            rate_limit = config.rate_limit.limit,
            bulkhead_capacity = config.bulkhead.capacity,
            max_attempts = policy.max_attempts,
            "Dependency guard initialized"
        );

        Self {
            breaker: CircuitBreaker::from_config(name.clone(), &config.circuit_breaker),
            limiter: RateLimiter::from_config(name.clone(), &config.rate_limit),
            bulkhead: Bulkhead::from_config(name.clone(), &config.bulkhead),
            policy: ArcSwap::from_pointee(policy),
            open_on_exhaustion: AtomicBool::new(config.open_on_exhaustion),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }

    pub fn retry_policy(&self) -> Arc<RetryPolicy> {
        self.policy.load_full()
    }

    /// Run `work` through every guard and return its payload.
    pub async fn call<F, Fut, T>(&self, work: F) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NetworkError>>,
    {
        self.call_with(work, &CallHooks::default())
            .await
            .map(CallOutcome::into_inner)
    }

    /// Run `work` through every guard, then apply `hooks` to the payload.
    pub async fn call_with<F, Fut, T>(
        &self,
        work: F,
        hooks: &CallHooks<T>,
    ) -> Result<CallOutcome<T>, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NetworkError>>,
    {
        let start = Instant::now();

        if self.breaker.is_open() {
            tracing::debug!(dependency = %self.name, "Circuit open, failing fast");
            return Err(self.rejected(
                ResilienceError::CircuitOpen {
                    dependency: self.name.clone(),
                    retry_after: self.breaker.remaining_open(),
                },
                start,
            ));
        }

        if let Err(retry_after) = self.limiter.try_admit() {
            return Err(self.rejected(
                ResilienceError::RateLimited {
                    dependency: self.name.clone(),
                    retry_after,
                },
                start,
            ));
        }

        let _permit = match self.bulkhead.acquire().await {
            Ok(permit) => permit,
            Err(e) => return Err(self.rejected(e, start)),
        };

        let policy = self.policy.load_full();

        match retry_with_backoff(&self.name, &policy, work).await {
            Ok(payload) => {
                self.breaker.record_success();

                if let Some(substitute) = hooks.fallback.as_ref().and_then(|f| f.apply(&payload)) {
                    tracing::info!(dependency = %self.name, "Payload signalled an error, serving fallback");
                    metrics::record_call(&self.name, "fallback", start);
                    return Ok(CallOutcome::Fallback(substitute));
                }

                if let Some(compensation) = &hooks.compensation {
                    let result = match compensation.run(&self.name, &payload) {
                        CompensationReport::Committed => None,
                        CompensationReport::Compensated { .. } => Some("compensated"),
                        CompensationReport::Failed { .. } => Some("failed"),
                    };
                    if let Some(result) = result {
                        metrics::record_compensation(&self.name, result);
                    }
                }

                metrics::record_call(&self.name, "success", start);
                Ok(CallOutcome::Success(payload))
            }
            Err(last) => {
                self.breaker.record_failure();
                if self.open_on_exhaustion.load(Ordering::Relaxed) {
                    self.breaker.trip();
                }

                let err = ResilienceError::RetryExhausted {
                    dependency: self.name.clone(),
                    attempts: policy.max_attempts.max(1),
                    last,
                };
                metrics::record_call(&self.name, err.kind().as_str(), start);
                Err(err)
            }
        }
    }

    fn rejected(&self, err: ResilienceError, start: Instant) -> ResilienceError {
        metrics::record_call(&self.name, err.kind().as_str(), start);
        err
    }

    /// Apply new settings in place. Counters and in-flight permits survive;
    /// bulkhead capacity only changes on restart.
    pub fn reconfigure(&self, config: &ResilienceConfig) {
        self.breaker.reconfigure(&config.circuit_breaker);
        self.limiter.reconfigure(&config.rate_limit);
        self.policy
            .store(Arc::new(RetryPolicy::from_config(&config.retry, config.call_timeout())));
        self.open_on_exhaustion
            .store(config.open_on_exhaustion, Ordering::Relaxed);

        if config.bulkhead.capacity.max(1) != self.bulkhead.capacity() {
            tracing::warn!(
                dependency = %self.name,
                current = self.bulkhead.capacity(),
                requested = config.bulkhead.capacity,
                "Bulkhead capacity change requires a restart"
            );
        }

        tracing::info!(dependency = %self.name, "Dependency guard reconfigured");
    }

    pub fn snapshot(&self) -> DependencySnapshot {
        let policy = self.policy.load();
        DependencySnapshot {
            name: self.name.clone(),
            circuit_breaker: self.breaker.snapshot(),
            rate_limiter: self.limiter.snapshot(),
            bulkhead: self.bulkhead.snapshot(),
            retry: RetrySnapshot {
                max_attempts: policy.max_attempts,
                initial_interval_ms: policy.initial_interval.as_millis() as u64,
                multiplier: policy.multiplier,
                max_interval_ms: policy.max_interval.map(|d| d.as_millis() as u64),
                attempt_timeout_ms: policy.attempt_timeout.map(|d| d.as_millis() as u64),
            },
            open_on_exhaustion: self.open_on_exhaustion.load(Ordering::Relaxed),
        }
    }
}
