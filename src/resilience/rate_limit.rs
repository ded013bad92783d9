//! Fixed-window rate limiter.
//!
//! Time is cut into consecutive windows of `window` length starting at the
//! first call. Each admitted call increments the window's counter; once the
//! counter reaches `limit` further calls are rejected until the next window
//! begins, at which point the counter returns to 0.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::schema::RateLimitConfig;
use crate::observability::metrics;

#[derive(Debug)]
struct RateLimiterState {
    count: u32,
    limit: u32,
    window: Duration,
    window_start: Instant,
}

impl RateLimiterState {
    /// Move `window_start` forward to the window containing `now`.
    fn roll(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.window_start);
        if elapsed < self.window {
            return;
        }
        let windows_passed = elapsed.as_nanos() / self.window.as_nanos().max(1);
        let advance = self.window.as_nanos().saturating_mul(windows_passed);
        self.window_start += Duration::from_nanos(u64::try_from(advance).unwrap_or(u64::MAX));
        self.count = 0;
    }
}

/// Point-in-time view of a limiter.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterSnapshot {
    pub count: u32,
    pub limit: u32,
    pub window_ms: u64,
}

/// Process-local admission control for one dependency.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    state: Mutex<RateLimiterState>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, limit: u32, window: Duration) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(RateLimiterState {
                count: 0,
                limit: limit.max(1),
                window: window.max(Duration::from_millis(1)),
                window_start: Instant::now(),
            }),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &RateLimitConfig) -> Self {
        Self::new(name, config.limit, Duration::from_millis(config.window_ms))
    }

    fn lock(&self) -> MutexGuard<'_, RateLimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit one call if the current window still has room.
    ///
    /// A rejection carries the time left in the window that rejected it.
    pub fn try_admit(&self) -> Result<(), Duration> {
        let mut state = self.lock();
        let now = Instant::now();
        state.roll(now);

        if state.count >= state.limit {
            let limit = state.limit;
            let retry_after = (state.window_start + state.window).saturating_duration_since(now);
            drop(state);
            tracing::warn!(dependency = %self.name, limit, retry_after = ?retry_after, "Rate limit exceeded");
            metrics::record_rate_limited(&self.name);
            return Err(retry_after);
        }

        state.count += 1;
        Ok(())
    }

    pub fn reconfigure(&self, config: &RateLimitConfig) {
        let mut state = self.lock();
        state.limit = config.limit.max(1);
        state.window = Duration::from_millis(config.window_ms).max(Duration::from_millis(1));
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let mut state = self.lock();
        state.roll(Instant::now());
        RateLimiterSnapshot {
            count: state.count,
            limit: state.limit,
            window_ms: state.window.as_millis() as u64,
        }
    }
}
