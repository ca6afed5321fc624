//! Fixed-capacity worker pool for connection handlers.
//!
//! At most `capacity` jobs run at once. Extra submissions wait in a queue
//! until a slot frees up; with a queue limit set, submissions beyond it are
//! rejected with `PoolSaturated` instead. Nothing submitted successfully is
//! ever dropped: `shutdown` waits for queued and running jobs alike.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use ferry_core::TransferError;

/// Live counters, shared with whoever wants to observe the pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    capacity: usize,
    busy: AtomicUsize,
    queued: AtomicUsize,
}

impl PoolStats {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }
}

/// Decrements `busy` even if the job panics.
struct BusySlot(Arc<PoolStats>);

impl BusySlot {
    fn enter(stats: Arc<PoolStats>) -> Self {
        stats.busy.fetch_add(1, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for BusySlot {
    fn drop(&mut self) {
        self.0.busy.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct WorkerPool {
    slots: Arc<Semaphore>,
    /// 0 = unbounded.
    queue_limit: usize,
    stats: Arc<PoolStats>,
    tasks: JoinSet<()>,
}

impl WorkerPool {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize, queue_limit: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            queue_limit,
            stats: Arc::new(PoolStats {
                capacity,
                ..PoolStats::default()
            }),
            tasks: JoinSet::new(),
        }
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        self.stats.clone()
    }

    /// Queue `job` to run in the next free slot.
    pub fn submit<F>(&mut self, job: F) -> Result<(), TransferError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.reap();

        let queued = self.stats.queued.fetch_add(1, Ordering::SeqCst);
        if self.queue_limit > 0 && queued >= self.queue_limit && self.slots.available_permits() == 0
        {
            self.stats.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(TransferError::PoolSaturated { queued });
        }

        let slots = self.slots.clone();
        let stats = self.stats.clone();
        self.tasks.spawn(async move {
            // The semaphore is never closed, so acquire only fails if that changes.
            let Ok(_permit) = slots.acquire_owned().await else {
                stats.queued.fetch_sub(1, Ordering::SeqCst);
                return;
            };
            stats.queued.fetch_sub(1, Ordering::SeqCst);
            let _slot = BusySlot::enter(stats);
            job.await;
        });
        Ok(())
    }

    /// Collect finished jobs so the join set does not grow without bound.
    fn reap(&mut self) {
        while let Some(res) = self.tasks.try_join_next() {
            log_join(res);
        }
    }

    /// Accept nothing further and wait for every queued and running job.
    pub async fn shutdown(mut self) {
        let pending = self.tasks.len();
        if pending > 0 {
            tracing::info!(pending, "draining worker pool");
        }
        while let Some(res) = self.tasks.join_next().await {
            log_join(res);
        }
    }
}

fn log_join(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            tracing::error!(error = %e, "connection handler panicked");
        }
    }
}
