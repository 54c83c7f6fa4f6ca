//! Bounded concurrent map that preserves input order.
//!
//! Each item runs on its own spawned task; a semaphore caps how many are in
//! flight. Results land in a pre-sized slot vector addressed by input index,
//! so completion order never leaks into output order. A task that panics or
//! exceeds the per-task timeout gets `fallback(&item)` in its slot and its
//! siblings are unaffected.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;

/// Emitted once per finished item, in completion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Number of items finished so far, including this one.
    pub current: usize,
    pub total: usize,
    /// Input position of the item that just finished.
    pub index: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct OrderedPool {
    concurrency: usize,
    task_timeout: Option<Duration>,
}

impl OrderedPool {
    pub fn new(concurrency: usize) -> Self {
        Self { concurrency: concurrency.max(1), task_timeout: None }
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub async fn map<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        task: F,
        fallback: impl Fn(&T) -> R,
        mut on_progress: impl FnMut(Progress),
    ) -> Vec<R>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = items.len();
        if total == 0 {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let task = Arc::new(task);
        let timeout = self.task_timeout;

        let mut pending = FuturesUnordered::new();
        for (index, item) in items.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let task = task.clone();
            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so a permit always arrives.
                let _permit = semaphore.acquire_owned().await.ok();
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, task(item)).await.ok(),
                    None => Some(task(item).await),
                }
            });
            pending.push(async move { (index, handle.await) });
        }

        let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
        let mut current = 0;
        while let Some((index, joined)) = pending.next().await {
            let value = match joined {
                Ok(Some(value)) => value,
                Ok(None) => {
                    tracing::warn!(index, timeout = ?timeout, "Task timed out, using fallback");
                    fallback(&items[index])
                }
                Err(e) => {
                    tracing::warn!(index, error = %e, "Task failed, using fallback");
                    fallback(&items[index])
                }
            };
            slots[index] = Some(value);
            current += 1;
            on_progress(Progress { current, total, index });
        }

        slots
            .into_iter()
            .zip(items.iter())
            .map(|(slot, item)| slot.unwrap_or_else(|| fallback(item)))
            .collect()
    }
}
