//! Timeout wrapper for queue stores
//!
//! Bounds every call on the wrapped store so no request can hang on a
//! stalled backend. An elapsed call surfaces as `StoreError::Timeout`.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::store::{QueueStore, StoreError};
use crate::task::{Pagination, QueueStats, TaskRecord, TaskState};

/// Queue store wrapper enforcing a per-call deadline
#[derive(Debug)]
pub struct TimeoutStore<S: QueueStore> {
    inner: S,
    timeout: Duration,
}

impl<S: QueueStore> TimeoutStore<S> {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Wrap with the default 5s deadline
    pub fn wrap(inner: S) -> Self {
        Self::new(inner, Self::DEFAULT_TIMEOUT)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, StoreError>> + Send,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    op = op,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Queue store call timed out"
                );
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl<S: QueueStore> QueueStore for TimeoutStore<S> {
    async fn queues(&self) -> Result<Vec<String>, StoreError> {
        self.bounded("queues", self.inner.queues()).await
    }

    async fn list_tasks(
        &self,
        queue: &str,
        state: TaskState,
        page: Pagination,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        self.bounded("list_tasks", self.inner.list_tasks(queue, state, page))
            .await
    }

    async fn current_stats(&self, queue: &str) -> Result<QueueStats, StoreError> {
        self.bounded("current_stats", self.inner.current_stats(queue))
            .await
    }

    async fn cancel_active(&self, task_id: &str) -> Result<(), StoreError> {
        self.bounded("cancel_active", self.inner.cancel_active(task_id))
            .await
    }

    async fn delete_by_key(&self, queue: &str, key: &str) -> Result<(), StoreError> {
        self.bounded("delete_by_key", self.inner.delete_by_key(queue, key))
            .await
    }

    async fn delete_all(&self, queue: &str, state: TaskState) -> Result<u64, StoreError> {
        self.bounded("delete_all", self.inner.delete_all(queue, state))
            .await
    }
}
