//! Bounded worker pool.
//!
//! Every item runs as its own task; a semaphore caps how many run at once.
//! Results come back in input order whatever order the tasks finish in.
//! Items that have not started when the run is cancelled are skipped and
//! reported as `None`; items already running observe cancellation through
//! the gateway and solver themselves.

use std::future::Future;
use std::sync::Arc;

use dpacheck_core::CancelToken;
use tokio::sync::Semaphore;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    max_workers: usize,
    cancel: CancelToken,
}

impl WorkerPool {
    pub fn new(max_workers: usize, cancel: CancelToken) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            cancel,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run `worker` over `items`, at most `max_workers` at a time.
    ///
    /// `result[i]` belongs to `items[i]`; it is `None` when the item was
    /// skipped because of cancellation or its task panicked.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, worker: F) -> Vec<Option<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let worker = Arc::new(worker);
        let mut tasks = Vec::with_capacity(items.len());

        for item in items {
            let worker = Arc::clone(&worker);
            let sem = Arc::clone(&self.semaphore);
            let cancel = self.cancel.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    permit = sem.acquire_owned() => permit.ok()?,
                };
                if cancel.is_cancelled() {
                    return None;
                }
                Some(worker(item).await)
            }));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.into_iter().enumerate() {
            match task.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(index, error = %e, "worker task failed");
                    results.push(None);
                }
            }
        }
        results
    }
}
