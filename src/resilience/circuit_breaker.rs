//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//!
//! There is no tracked Half-Open state. The first `is_open()` check after
//! `reset_timeout` has elapsed closes the breaker and admits that call; its
//! outcome decides whether the breaker opens again.
//!
//! # State Transitions
//! ```text
//! Closed → Open:   failure_count reaches max_failures
//! Open → Closed:   is_open() called more than reset_timeout after opened_at
//! any → Closed:    record_success()
//! ```
//!
//! # Invariants
//! - `opened_at` is set iff `failure_count >= max_failures`, including
//!   right after a reload changes `max_failures`
//! - `failure_count` is 0 whenever the breaker closes on timeout or success

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::schema::CircuitBreakerConfig;
use crate::observability::metrics;

/// Mutable breaker state, guarded by a single mutex.
#[derive(Debug, Clone)]
struct CircuitState {
    failure_count: u32,
    opened_at: Option<Instant>,
    max_failures: u32,
    reset_timeout: Duration,
}

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
    pub max_failures: u32,
    pub reset_timeout_ms: u64,
    /// How long the breaker has been open, in milliseconds.
    pub open_for_ms: Option<u64>,
}

/// Failure-counting circuit breaker for a single dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(CircuitState {
                failure_count: 0,
                opened_at: None,
                max_failures: max_failures.max(1),
                reset_timeout,
            }),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self::new(name, config.max_failures, Duration::from_millis(config.reset_timeout_ms))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, CircuitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gate a call. Returns `true` when the call must be rejected.
    pub fn is_open(&self) -> bool {
        let mut state = self.lock();
        if state.failure_count < state.max_failures {
            return false;
        }

        let now = Instant::now();
        let Some(opened_at) = state.opened_at else {
            state.opened_at = Some(now);
            let failures = state.failure_count;
            drop(state);

            tracing::warn!(dependency = %self.name, failures, "Circuit opened");
            metrics::record_circuit_state(&self.name, true);
            return true;
        };

        if now.duration_since(opened_at) > state.reset_timeout {
            state.failure_count = 0;
            state.opened_at = None;
            drop(state);

            tracing::info!(dependency = %self.name, "Circuit closed after reset timeout, admitting probe call");
            metrics::record_circuit_state(&self.name, false);
            return false;
        }

        true
    }

    /// Count one failed call.
    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.failure_count = state.failure_count.saturating_add(1);

        if state.failure_count >= state.max_failures && state.opened_at.is_none() {
            state.opened_at = Some(Instant::now());
            let failures = state.failure_count;
            drop(state);

            tracing::warn!(dependency = %self.name, failures, "Circuit opened");
            metrics::record_circuit_state(&self.name, true);
        }
    }

    /// Count one successful call. Always closes the breaker.
    pub fn record_success(&self) {
        let mut state = self.lock();
        let was_open = state.opened_at.is_some();
        state.failure_count = 0;
        state.opened_at = None;
        drop(state);

        if was_open {
            tracing::info!(dependency = %self.name, "Circuit closed after successful call");
            metrics::record_circuit_state(&self.name, false);
        }
    }

    /// Force the breaker open now.
    pub fn trip(&self) {
        let mut state = self.lock();
        state.failure_count = state.failure_count.max(state.max_failures);
        state.opened_at = Some(Instant::now());
        drop(state);

        tracing::warn!(dependency = %self.name, "Circuit tripped");
        metrics::record_circuit_state(&self.name, true);
    }

    /// Time until an open breaker admits a probe call. `None` when closed.
    pub fn remaining_open(&self) -> Option<Duration> {
        let state = self.lock();
        state.opened_at.map(|opened_at| {
            state.reset_timeout.saturating_sub(Instant::now().duration_since(opened_at))
        })
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Apply new thresholds without touching the failure count.
    ///
    /// The open/closed state is re-derived against the new threshold: an
    /// open breaker whose count is now below it closes, a closed breaker
    /// whose count now reaches it opens and starts its cool-down.
    pub fn reconfigure(&self, config: &CircuitBreakerConfig) {
        let mut state = self.lock();
        state.max_failures = config.max_failures.max(1);
        state.reset_timeout = Duration::from_millis(config.reset_timeout_ms);

        let reached = state.failure_count >= state.max_failures;
        let opened = match (reached, state.opened_at.is_some()) {
            (false, true) => {
                state.opened_at = None;
                Some(false)
            }
            (true, false) => {
                state.opened_at = Some(Instant::now());
                Some(true)
            }
            _ => None,
        };
        let failures = state.failure_count;
        let max_failures = state.max_failures;
        drop(state);

        match opened {
            Some(true) => {
                tracing::warn!(dependency = %self.name, failures, max_failures, "Circuit opened by new threshold");
                metrics::record_circuit_state(&self.name, true);
            }
            Some(false) => {
                tracing::info!(dependency = %self.name, failures, max_failures, "Circuit closed by new threshold");
                metrics::record_circuit_state(&self.name, false);
            }
            None => {}
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock();
        let open_for_ms = state
            .opened_at
            .map(|at| Instant::now().duration_since(at).as_millis() as u64);

        BreakerSnapshot {
            state: if state.opened_at.is_some() { BreakerState::Open } else { BreakerState::Closed },
            failure_count: state.failure_count,
            max_failures: state.max_failures,
            reset_timeout_ms: state.reset_timeout.as_millis() as u64,
            open_for_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("users", 3, Duration::from_secs(60))
    }

    /// Run `f` against a throwaway Prometheus recorder and render it.
    fn rendered(f: impl FnOnce()) -> String {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        ::metrics::with_local_recorder(&recorder, f);
        handle.render()
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold_and_stays_open() {
        let cb = breaker();

        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_open());

        cb.record_failure();
        assert!(cb.is_open());
        assert_eq!(cb.snapshot().state, BreakerState::Open);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cb.is_open());

        // Elapsed must strictly exceed the timeout
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closes_once_after_reset_timeout() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }
        assert!(cb.is_open());

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(!cb.is_open());
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.snapshot().state, BreakerState::Closed);
        assert_eq!(cb.remaining_open(), None);

        // Probe fails: a full new threshold is needed before reopening
        cb.record_failure();
        assert!(!cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_success_resets_from_any_state() {
        let cb = breaker();
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);

        for _ in 0..5 {
            cb.record_failure();
        }
        assert!(cb.is_open());
        cb.record_success();
        assert!(!cb.is_open());
        assert_eq!(cb.failure_count(), 0);
        assert!(cb.snapshot().open_for_ms.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opened_at_is_stamped_when_threshold_reached() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }

        // No is_open() call in between: the cool-down starts at the third failure.
        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(cb.remaining_open(), Some(Duration::from_secs(15)));
        assert_eq!(cb.snapshot().open_for_ms, Some(45_000));

        tokio::time::advance(Duration::from_secs(16)).await;
        assert!(!cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trip_forces_open() {
        let cb = breaker();
        cb.trip();
        assert!(cb.is_open());
        assert_eq!(cb.failure_count(), 3);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_keeps_counters() {
        let cb = breaker();
        cb.record_failure();
        cb.record_failure();

        cb.reconfigure(&CircuitBreakerConfig {
            max_failures: 2,
            reset_timeout_ms: 1_000,
        });

        assert_eq!(cb.failure_count(), 2);
        assert!(cb.is_open());
        tokio::time::advance(Duration::from_millis(1_001)).await;
        assert!(!cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_raising_threshold_closes_then_reopens_at_new_limit() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }
        assert!(cb.is_open());

        let output = rendered(|| {
            cb.reconfigure(&CircuitBreakerConfig {
                max_failures: 5,
                reset_timeout_ms: 60_000,
            })
        });
        assert!(output.contains(r#"gateway_circuit_open{dependency="users"} 0"#));

        assert!(!cb.is_open());
        assert_eq!(cb.failure_count(), 3);
        assert_eq!(cb.snapshot().state, BreakerState::Closed);
        assert_eq!(cb.remaining_open(), None);

        tokio::time::advance(Duration::from_secs(120)).await;
        cb.record_failure();
        assert!(!cb.is_open());
        cb.record_failure();

        assert!(cb.is_open());
        assert_eq!(cb.failure_count(), 5);
        assert_eq!(cb.remaining_open(), Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lowering_threshold_opens_immediately() {
        let cb = breaker();
        cb.record_failure();
        cb.record_failure();

        let output = rendered(|| {
            cb.reconfigure(&CircuitBreakerConfig {
                max_failures: 2,
                reset_timeout_ms: 10_000,
            })
        });
        assert!(output.contains(r#"gateway_circuit_open{dependency="users"} 1"#));

        // Cool-down starts at the reload, not at the next gate check.
        assert_eq!(cb.snapshot().state, BreakerState::Open);
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cb.remaining_open(), Some(Duration::from_secs(6)));
        assert!(cb.is_open());

        tokio::time::advance(Duration::from_millis(6_001)).await;
        assert!(!cb.is_open());
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_open_stamp_reports_opened() {
        let cb = breaker();
        cb.lock().failure_count = 3;

        let mut open = false;
        let output = rendered(|| open = cb.is_open());

        assert!(open);
        assert!(output.contains(r#"gateway_circuit_open{dependency="users"} 1"#));
        assert_eq!(cb.snapshot().state, BreakerState::Open);
        assert_eq!(cb.remaining_open(), Some(Duration::from_secs(60)));
    }
}
