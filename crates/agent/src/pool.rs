//! Bounded worker pool for model and tool calls.
//!
//! Every call runs on its own tokio task while holding one semaphore permit,
//! so at most `size` calls are in flight. A call that outlives its deadline
//! is aborted and reported as [`PoolError::Timeout`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("worker task failed: {0}")]
    Join(String),

    #[error("worker pool is closed")]
    Closed,
}

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// A pool with `size` permits (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by a running call.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `fut` on a pooled task and wait at most `deadline` for it.
    ///
    /// The deadline starts once a permit is acquired. On expiry the task is
    /// aborted at its next await point.
    pub async fn run<F, T>(&self, deadline: Duration, fut: F) -> Result<T, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let handle = tokio::spawn(async move {
            let _permit = permit;
            fut.await
        });
        let abort = handle.abort_handle();

        match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(PoolError::Join(e.to_string())),
            Err(_) => {
                abort.abort();
                warn!(deadline_ms = deadline.as_millis() as u64, "Pooled call timed out; aborted");
                Err(PoolError::Timeout(deadline))
            }
        }
    }

    /// Submit fire-and-forget work. The returned handle may be awaited or dropped.
    pub fn spawn_detached<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            fut.await;
        })
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(4)
    }
}
