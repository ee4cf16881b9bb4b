use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::app::{Result, StashError};

pub const DEFAULT_WORKERS: usize = 4;

/// Runs keyed fetches with bounded concurrency and returns them in input order.
pub struct ParallelFetcher {
    semaphore: Arc<Semaphore>,
    workers: usize,
}

impl ParallelFetcher {
    pub fn new() -> Self {
        Self::with_workers(DEFAULT_WORKERS)
    }

    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `task` for every key, at most `workers` at a time.
    ///
    /// Results come back in the order of `keys`, whatever order the tasks
    /// finish in. The first error cancels the tasks still pending and is
    /// returned.
    pub async fn run_ordered<T, F, Fut>(&self, keys: Vec<String>, task: F) -> Result<Vec<(String, T)>>
    where
        T: Send + 'static,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut set = JoinSet::new();

        for (slot, key) in keys.iter().enumerate() {
            let semaphore = self.semaphore.clone();
            let fut = task(key.clone());

            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| StashError::Other(format!("Semaphore error: {}", e)))?;
                fut.await.map(|value| (slot, value))
            });
        }

        let mut slots: Vec<Option<T>> = keys.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok((slot, value))) => slots[slot] = Some(value),
                Ok(Err(e)) => {
                    set.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("Task join error: {}", e);
                    set.abort_all();
                    return Err(StashError::Other(format!("Fetch task failed: {}", e)));
                }
            }
        }

        // Completion order is arbitrary; emit in input order
        Ok(keys
            .into_iter()
            .zip(slots)
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect())
    }
}

impl Default for ParallelFetcher {
    fn default() -> Self {
        Self::new()
    }
}
