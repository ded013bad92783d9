//! Fallback and compensation hooks applied to successful payloads.
//!
//! - A [`Fallback`] inspects a payload that the dependency returned
//!   successfully and, when it signals an application-level error, supplies
//!   a substitute payload.
//! - A [`Compensation`] runs a post-processing step on a good payload. When
//!   that step fails, an idempotent compensate action is run instead of
//!   failing the call.

use std::fmt;
use std::sync::Arc;

use crate::resilience::error::HookError;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type Supplier<T> = Arc<dyn Fn(&T) -> T + Send + Sync>;
type Step<T> = Arc<dyn Fn(&T) -> Result<(), HookError> + Send + Sync>;
type Compensate<T> = Arc<dyn Fn(&T, &HookError) -> Result<(), HookError> + Send + Sync>;

/// How many times a failing compensate action is re-invoked in total.
pub const COMPENSATION_ATTEMPTS: u32 = 3;

/// Result of an orchestrated call that reached the dependency successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    /// Payload returned by the dependency.
    Success(T),
    /// Substitute payload served because the dependency's payload signalled an error.
    Fallback(T),
}

impl<T> CallOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            CallOutcome::Success(v) | CallOutcome::Fallback(v) => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, CallOutcome::Fallback(_))
    }
}

/// Substitutes payloads that signal an application-level error.
pub struct Fallback<T> {
    signals_error: Predicate<T>,
    substitute: Supplier<T>,
}

impl<T> Fallback<T> {
    /// `signals_error` decides whether a payload is unusable; `substitute`
    /// produces the payload to serve instead (it sees the rejected one).
    pub fn new<P, S>(signals_error: P, substitute: S) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
        S: Fn(&T) -> T + Send + Sync + 'static,
    {
        Self {
            signals_error: Arc::new(signals_error),
            substitute: Arc::new(substitute),
        }
    }

    /// Fallback that always serves `value`.
    pub fn constant<P>(signals_error: P, value: T) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        Self::new(signals_error, move |_| value.clone())
    }

    /// Returns the substitute when `payload` signals an error.
    pub fn apply(&self, payload: &T) -> Option<T> {
        if (self.signals_error)(payload) {
            Some((self.substitute)(payload))
        } else {
            None
        }
    }
}

impl<T> Clone for Fallback<T> {
    fn clone(&self) -> Self {
        Self {
            signals_error: Arc::clone(&self.signals_error),
            substitute: Arc::clone(&self.substitute),
        }
    }
}

impl<T> fmt::Debug for Fallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback").finish_non_exhaustive()
    }
}

/// What happened when a compensation hook ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensationReport {
    /// Post-processing step succeeded.
    Committed,
    /// Step failed and the compensate action succeeded on the given attempt.
    Compensated { attempts: u32 },
    /// Step failed and every compensate attempt failed too.
    Failed { step: HookError, last: HookError },
}

/// Post-processing step with an idempotent compensate action.
pub struct Compensation<T> {
    step: Step<T>,
    compensate: Compensate<T>,
}

impl<T> Compensation<T> {
    pub fn new<S, C>(step: S, compensate: C) -> Self
    where
        S: Fn(&T) -> Result<(), HookError> + Send + Sync + 'static,
        C: Fn(&T, &HookError) -> Result<(), HookError> + Send + Sync + 'static,
    {
        Self {
            step: Arc::new(step),
            compensate: Arc::new(compensate),
        }
    }

    /// Run the step and, if it fails, the compensate action.
    ///
    /// The compensate action may run up to [`COMPENSATION_ATTEMPTS`] times.
    /// Nothing here is ever turned into an error for the caller.
    pub fn run(&self, dependency: &str, payload: &T) -> CompensationReport {
        let step_err = match (self.step)(payload) {
            Ok(()) => return CompensationReport::Committed,
            Err(e) => e,
        };

        tracing::warn!(dependency, error = %step_err, "Post-processing failed, compensating");

        let mut last = None;
        for attempt in 1..=COMPENSATION_ATTEMPTS {
            match (self.compensate)(payload, &step_err) {
                Ok(()) => {
                    tracing::info!(dependency, attempt, "Compensation applied");
                    return CompensationReport::Compensated { attempts: attempt };
                }
                Err(e) => {
                    tracing::warn!(dependency, attempt, error = %e, "Compensation attempt failed");
                    last = Some(e);
                }
            }
        }

        let last = last.unwrap_or_else(|| HookError::new("compensation never ran"));
        tracing::error!(dependency, step_error = %step_err, error = %last, "Compensation gave up");
        CompensationReport::Failed { step: step_err, last }
    }
}

impl<T> Clone for Compensation<T> {
    fn clone(&self) -> Self {
        Self {
            step: Arc::clone(&self.step),
            compensate: Arc::clone(&self.compensate),
        }
    }
}

impl<T> fmt::Debug for Compensation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compensation").finish_non_exhaustive()
    }
}

/// Optional hooks for a single orchestrated call.
#[derive(Debug)]
pub struct CallHooks<T> {
    pub fallback: Option<Fallback<T>>,
    pub compensation: Option<Compensation<T>>,
}

impl<T> Default for CallHooks<T> {
    fn default() -> Self {
        Self {
            fallback: None,
            compensation: None,
        }
    }
}

impl<T> Clone for CallHooks<T> {
    fn clone(&self) -> Self {
        Self {
            fallback: self.fallback.clone(),
            compensation: self.compensation.clone(),
        }
    }
}

impl<T> CallHooks<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, fallback: Fallback<T>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_compensation(mut self, compensation: Compensation<T>) -> Self {
        self.compensation = Some(compensation);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_fallback_only_applies_to_error_payloads() {
        let fallback = Fallback::constant(|p: &String| p.contains("\"error\""), "cached".to_string());

        assert_eq!(fallback.apply(&r#"{"error":"boom"}"#.to_string()), Some("cached".to_string()));
        assert_eq!(fallback.apply(&r#"{"id":1}"#.to_string()), None);
    }

    #[test]
    fn test_compensation_committed_when_step_succeeds() {
        let compensated = Arc::new(AtomicU32::new(0));
        let seen = compensated.clone();
        let hook = Compensation::new(
            |_: &u32| Ok(()),
            move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );

        assert_eq!(hook.run("users", &7), CompensationReport::Committed);
        assert_eq!(compensated.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_compensation_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let hook = Compensation::new(
            |_: &u32| Err(HookError::new("write failed")),
            move |_, step_err| {
                assert_eq!(step_err.to_string(), "write failed");
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(HookError::new("busy"))
                } else {
                    Ok(())
                }
            },
        );

        assert_eq!(hook.run("users", &7), CompensationReport::Compensated { attempts: 2 });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_compensation_gives_up_after_fixed_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let hook = Compensation::new(
            |_: &u32| Err(HookError::new("write failed")),
            move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Err(HookError::new("still broken"))
            },
        );

        let report = hook.run("users", &7);
        assert_eq!(
            report,
            CompensationReport::Failed {
                step: HookError::new("write failed"),
                last: HookError::new("still broken"),
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), COMPENSATION_ATTEMPTS);
    }
}
