//! Bounded task pool shared by all queries

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default number of tasks allowed to run at once
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Runs dispatch tasks with at most `capacity` in flight across all queries
pub struct TaskScheduler {
    /// Execution permits
    permits: Arc<Semaphore>,
    /// Pool size
    capacity: usize,
    /// Tasks spawned since start
    spawned: AtomicU64,
}

impl TaskScheduler {
    /// Create a scheduler with the given pool size (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            spawned: AtomicU64::new(0),
        }
    }

    /// Create with the default pool size
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }

    /// Spawn `task` into `set`; it starts running once a permit is free
    pub fn spawn<T, F>(&self, set: &mut JoinSet<T>, task: F)
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.spawned.fetch_add(1, Ordering::Relaxed);
        set.spawn(async move {
            // The semaphore is never closed, so acquisition only fails on shutdown
            let _permit = permits.acquire_owned().await.ok();
            task.await
        });
    }

    /// Pool size
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks currently holding a permit
    pub fn running_count(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Tasks spawned since start
    pub fn spawned_count(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_capacity_bounds_concurrency() {
        let scheduler = TaskScheduler::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut set = JoinSet::new();

        for i in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            scheduler.spawn(&mut set, async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                i
            });
        }

        let mut results = Vec::new();
        while let Some(result) = set.join_next().await {
            results.push(result.unwrap());
        }
        results.sort();

        assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(scheduler.spawned_count(), 6);
        assert_eq!(scheduler.running_count(), 0);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let scheduler = TaskScheduler::new(0);
        assert_eq!(scheduler.capacity(), 1);
        assert_eq!(TaskScheduler::default().capacity(), DEFAULT_POOL_SIZE);
    }
}
