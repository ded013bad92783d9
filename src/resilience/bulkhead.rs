//! Bulkhead isolation via a bounded permit pool.
//!
//! A permit is an RAII guard: it returns to the pool when dropped, which
//! covers normal completion, errors, panics and cancellation of the task
//! holding it. Waiters are served in FIFO order.

use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::schema::BulkheadConfig;
use crate::observability::metrics;
use crate::resilience::error::ResilienceError;

/// Point-in-time view of a bulkhead.
#[derive(Debug, Clone, Serialize)]
pub struct BulkheadSnapshot {
    pub in_use: usize,
    pub capacity: usize,
}

/// Caps the number of concurrently in-flight calls to one dependency.
#[derive(Debug)]
pub struct Bulkhead {
    name: Arc<str>,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    max_wait: Option<Duration>,
}

impl Bulkhead {
    pub fn new(name: impl Into<String>, capacity: usize, max_wait: Option<Duration>) -> Self {
        let name: String = name.into();
        let capacity = capacity.max(1);
        Self {
            name: Arc::from(name),
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            max_wait,
        }
    }

    pub fn from_config(name: impl Into<String>, config: &BulkheadConfig) -> Self {
        Self::new(name, config.capacity, config.max_wait_ms.map(Duration::from_millis))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Wait for a permit.
    ///
    /// Without `max_wait` this only returns once a permit is free. With it,
    /// waiting longer than `max_wait` yields [`ResilienceError::BulkheadFull`].
    pub async fn acquire(&self) -> Result<BulkheadPermit, ResilienceError> {
        let start = Instant::now();
        let acquire = self.semaphore.clone().acquire_owned();

        let permit = match self.max_wait {
            Some(limit) => match tokio::time::timeout(limit, acquire).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(dependency = %self.name, max_wait = ?limit, "Bulkhead timeout waiting for permit");
                    return Err(self.full(start));
                }
            },
            None => acquire.await,
        };

        // The semaphore is never closed while the bulkhead is alive.
        let permit = permit.map_err(|_| self.full(start))?;

        let waited = start.elapsed();
        if !waited.is_zero() {
            tracing::debug!(dependency = %self.name, waited = ?waited, "Bulkhead permit acquired after waiting");
        }

        let in_use = self.in_use();
        metrics::record_bulkhead_in_use(&self.name, in_use);

        Ok(BulkheadPermit {
            _permit: permit,
            name: self.name.clone(),
            semaphore: self.semaphore.clone(),
            capacity: self.capacity,
        })
    }

    fn full(&self, start: Instant) -> ResilienceError {
        ResilienceError::BulkheadFull {
            dependency: self.name.to_string(),
            waited: start.elapsed(),
        }
    }

    pub fn snapshot(&self) -> BulkheadSnapshot {
        BulkheadSnapshot {
            in_use: self.in_use(),
            capacity: self.capacity,
        }
    }
}

/// A held bulkhead slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
    name: Arc<str>,
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Drop for BulkheadPermit {
    fn drop(&mut self) {
        // `_permit` is released after this body runs, hence the -1.
        let in_use = self.capacity - self.semaphore.available_permits();
        metrics::record_bulkhead_in_use(&self.name, in_use.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_never_exceeds_capacity_under_load() {
        let bulkhead = Arc::new(Bulkhead::new("users", 3, None));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let bulkhead = bulkhead.clone();
                let current = current.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let _permit = bulkhead.acquire().await.unwrap();
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in futures_util::future::join_all(tasks).await {
            task.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(bulkhead.in_use(), 0);
        assert_eq!(bulkhead.snapshot().capacity, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_release_without_max_wait() {
        let bulkhead = Arc::new(Bulkhead::new("users", 1, None));
        let held = bulkhead.acquire().await.unwrap();
        assert_eq!(bulkhead.in_use(), 1);

        let waiter = {
            let bulkhead = bulkhead.clone();
            tokio::spawn(async move { bulkhead.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(bulkhead.in_use(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_rejects_with_bulkhead_full() {
        let bulkhead = Bulkhead::new("users", 1, Some(Duration::from_millis(200)));
        let _held = bulkhead.acquire().await.unwrap();

        let err = bulkhead.acquire().await.unwrap_err();
        match err {
            ResilienceError::BulkheadFull { dependency, waited } => {
                assert_eq!(dependency, "users");
                assert_eq!(waited, Duration::from_millis(200));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_and_holder_release_permits() {
        let bulkhead = Arc::new(Bulkhead::new("users", 1, None));

        let holder = {
            let bulkhead = bulkhead.clone();
            tokio::spawn(async move {
                let _permit = bulkhead.acquire().await.unwrap();
                std::future::pending::<()>().await;
            })
        };
        while bulkhead.in_use() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(bulkhead.in_use(), 1);

        holder.abort();
        let _ = holder.await;
        assert_eq!(bulkhead.in_use(), 0);
        assert!(bulkhead.acquire().await.is_ok());
    }
}
