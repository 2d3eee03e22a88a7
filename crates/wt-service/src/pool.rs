//! Bounded pool for CPU-bound surrogate work.
//!
//! Fits and candidate scoring run on a dedicated rayon pool; async callers
//! await the outcome over a oneshot channel so the runtime keeps serving
//! other sessions meanwhile.

use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::oneshot;
use tracing::error;

use wt_types::{config_error, internal_error, WtResult};

pub struct FitWorkerPool {
    pool: ThreadPool,
    threads: usize,
}

impl FitWorkerPool {
    pub fn new(threads: usize) -> WtResult<Self> {
        if threads == 0 {
            return Err(config_error!("worker pool needs at least one thread"));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("wt-fit-{i}"))
            .panic_handler(|_| error!("surrogate worker task panicked"))
            .build()
            .map_err(|e| config_error!("failed to build worker pool: {e}"))?;
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `task` on the pool and await its output.
    ///
    /// A task that panics surfaces as an internal error. This relies on
    /// unwinding; the workspace release profile keeps `panic = "unwind"`.
    pub async fn run<T, F>(&self, task: F) -> WtResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            // Receiver gone means the caller stopped waiting.
            let _ = tx.send(task());
        });
        rx.await
            .map_err(|_| internal_error!("worker task ended without a result"))
    }

    /// Fire-and-forget variant used by background jobs.
    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_task_and_returns_output() {
        let pool = FitWorkerPool::new(2).unwrap();
        let value = pool.run(|| (1..=10).sum::<u32>()).await.unwrap();
        assert_eq!(value, 55);
        assert_eq!(pool.threads(), 2);
    }

    #[tokio::test]
    async fn panicking_task_is_an_internal_error() {
        let pool = FitWorkerPool::new(1).unwrap();
        let result: WtResult<u32> = pool.run(|| panic!("boom")).await;
        assert!(matches!(result, Err(wt_types::WtError::Internal(_))));

        // The pool survives the panic.
        assert_eq!(pool.run(|| 7).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn spawned_tasks_complete() {
        let pool = FitWorkerPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        for _ in 0..50 {
            if counter.load(Ordering::SeqCst) == 8 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn zero_threads_rejected() {
        assert!(FitWorkerPool::new(0).is_err());
    }
}
