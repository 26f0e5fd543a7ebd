use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
#[error("worker pool is closed")]
pub struct PoolClosed;

/// Bounds how many runs execute at once.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free slot, then drive `job` to completion while holding it.
    pub async fn run<F, T>(&self, job: F) -> Result<T, PoolClosed>
    where
        F: Future<Output = T>,
    {
        let _permit = self.permits.acquire().await.map_err(|_| PoolClosed)?;
        debug!(available = self.available(), "Worker slot acquired");
        Ok(job.await)
    }

    /// Stop admitting new jobs. Jobs holding a slot finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_capacity() {
        let pool = WorkerPool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..6).map(|_| {
            let pool = pool.clone();
            let active = active.clone();
            let peak = peak.clone();
            async move {
                pool.run(async {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }
        });
        let results = futures::future::join_all(jobs).await;

        assert!(results.iter().all(Result::is_ok));
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn closed_pools_refuse_work() {
        let pool = WorkerPool::new(1);
        pool.close();
        assert!(pool.run(async { 1 }).await.is_err());
    }
}
