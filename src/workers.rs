//! Bounded CPU worker pool.
//!
//! # Responsibilities
//! - Keep CPU-bound work (image quantization, large-document parsing)
//!   off the I/O scheduler
//! - Bound concurrency to the logical core count via a semaphore
//!
//! The I/O loop never calls into CPU-bound stages directly; it awaits a
//! pool slot, then awaits the blocking task's completion.

use std::sync::Arc;

use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
}

impl WorkerPool {
    /// Pool bounded to `size` concurrent tasks.
    pub fn new(size: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Pool sized to the logical core count.
    pub fn with_core_count() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(cores)
    }

    /// Run a CPU-bound closure on the blocking pool, waiting for a slot
    /// first so at most `size` closures run at once.
    pub async fn run<F, T>(&self, work: F) -> T
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .expect("worker pool semaphore closed");
        tokio::task::spawn_blocking(work)
            .await
            .expect("worker task panicked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_work_and_returns_result() {
        let pool = WorkerPool::new(2);
        let out = pool.run(|| 21 * 2).await;
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn bounds_concurrency() {
        let pool = WorkerPool::new(1);
        let peak = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            let peak = peak.clone();
            let active = active.clone();
            handles.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
