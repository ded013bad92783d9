//! Exponential backoff with optional cap and jitter.

use std::time::Duration;
use rand::Rng;

/// Delay to wait after the `attempt`-th failed attempt (1-based).
///
/// `initial * multiplier^(attempt - 1)`, clamped to `max` when one is given.
/// Growth is unbounded otherwise; values past `Duration::MAX` saturate.
pub fn calculate_backoff(
    attempt: u32,
    initial: Duration,
    multiplier: f64,
    max: Option<Duration>,
) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let secs = initial.as_secs_f64() * multiplier.powi(exponent);
    let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);

    match max {
        Some(cap) => delay.min(cap),
        None => delay,
    }
}

/// Add up to 10% random jitter on top of `delay`.
pub fn with_jitter(delay: Duration) -> Duration {
    let jitter_range = delay.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    delay.saturating_add(Duration::from_millis(jitter))
}
