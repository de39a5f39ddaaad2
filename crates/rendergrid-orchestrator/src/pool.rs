//! Fixed-size dispatch pool: a semaphore bounding a `JoinSet`.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// Runs at most `size` tasks at once.
///
/// Each task holds an owned permit for its whole lifetime, so capacity
/// returns exactly when a task finishes, panics included.
pub struct DispatchPool<T> {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<T>,
    size: usize,
}

impl<T: Send + 'static> DispatchPool<T> {
    /// Pool sized `min(ceiling, parallelism)`, never below 1.
    pub fn new(ceiling: u32, parallelism: Option<u32>) -> Self {
        let size = parallelism.map_or(ceiling, |p| p.min(ceiling)).max(1) as usize;
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            tasks: JoinSet::new(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn has_capacity(&self) -> bool {
        self.semaphore.available_permits() > 0
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start `task` if a slot is free. Hands the task back when full.
    pub fn try_spawn<F>(&mut self, task: F) -> Result<(), F>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
            return Err(task);
        };
        self.tasks.spawn(async move {
            let _permit = permit;
            task.await
        });
        Ok(())
    }

    /// Wait for a slot, then start `task`.
    pub async fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        // Never closed, so this only waits.
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok();
        self.tasks.spawn(async move {
            let _permit = permit;
            task.await
        });
    }

    /// Next finished task, or `None` when nothing is running.
    pub async fn join_next(&mut self) -> Option<Result<T, JoinError>> {
        self.tasks.join_next().await
    }
}
