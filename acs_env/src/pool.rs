//! Bounded worker pool for fire-and-forget work.
//!
//! Every asynchronous unit of work (strategy ticks, scenario steps, journey
//! legs) goes through one `WorkerPool`. Submission never blocks: when the
//! pool already has `limit` tasks in flight the new task is dropped, logged
//! and reported to the caller as [`EnvError::PoolSaturated`].

use crate::error::EnvError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, warn};

/// Shared, cloneable handle to the bounded worker pool.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    limit: usize,
    stats: Arc<PoolStats>,
}

/// Counters kept by the pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    panicked: AtomicU64,
}

impl PoolStats {
    /// Tasks accepted into the pool.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Tasks rejected because the pool was saturated.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Tasks that panicked while running.
    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }
}

impl WorkerPool {
    /// Creates a pool allowing at most `limit` tasks in flight.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            stats: Arc::new(PoolStats::default()),
        }
    }

    /// Maximum number of tasks in flight.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of tasks currently occupying a slot.
    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Submits a task without waiting for it to finish.
    ///
    /// The slot is released when the task completes, including when it
    /// panics. A panic is logged and does not affect other tasks.
    pub fn submit<F>(&self, name: &str, task: F) -> Result<(), EnvError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                let err = EnvError::PoolSaturated {
                    task: name.to_string(),
                    in_flight: self.in_flight(),
                    limit: self.limit,
                };
                warn!("{}", err);
                return Err(err);
            }
        };

        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        let stats = Arc::clone(&self.stats);
        let name = name.to_string();
        tokio::spawn(async move {
            // The inner task isolates panics; the outer one owns the slot.
            let result = tokio::spawn(task).await;
            if let Err(join_err) = result {
                if join_err.is_panic() {
                    stats.panicked.fetch_add(1, Ordering::Relaxed);
                    error!("Worker task '{}' panicked", name);
                } else {
                    warn!("Worker task '{}' was cancelled", name);
                }
            }
            drop(permit);
        });

        Ok(())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("limit", &self.limit)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pool_runs_submitted_task() {
        let pool = WorkerPool::new(2);
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        pool.submit("count", async move {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_drops_past_limit() {
        let pool = WorkerPool::new(1);

        pool.submit("slow", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        })
        .unwrap();
        tokio::task::yield_now().await;

        let err = pool.submit("rejected", async {}).unwrap_err();
        assert!(matches!(err, EnvError::PoolSaturated { limit: 1, .. }));
        assert_eq!(pool.stats().dropped(), 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(pool.submit("after", async {}).is_ok());
    }

    #[tokio::test]
    async fn test_pool_survives_panicking_task() {
        let pool = WorkerPool::new(1);

        pool.submit("boom", async {
            panic!("strategy exploded");
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.stats().panicked(), 1);
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.submit("next", async {}).is_ok());
    }
}
