//! Queue Store Trait

use crate::task::{Pagination, QueueStats, TaskRecord, TaskState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True when the target queue or task does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::QueueNotFound(_) | Self::TaskNotFound(_))
    }
}

/// Operations the inspector needs from the queue engine.
///
/// Implementations must be safe to share across concurrent requests.
/// None of these calls is transactional with another: a listing and a
/// stats read may observe different instants.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Names of every known queue
    async fn queues(&self) -> Result<Vec<String>, StoreError>;

    /// One page of tasks in `state`, in the store's listing order
    async fn list_tasks(
        &self,
        queue: &str,
        state: TaskState,
        page: Pagination,
    ) -> Result<Vec<TaskRecord>, StoreError>;

    /// Current aggregate counters for a queue
    async fn current_stats(&self, queue: &str) -> Result<QueueStats, StoreError>;

    /// Signal cancellation to an active task.
    /// Success means the signal was accepted, not that the task stopped.
    async fn cancel_active(&self, task_id: &str) -> Result<(), StoreError>;

    /// Delete one task by key. A missing task is `TaskNotFound`.
    async fn delete_by_key(&self, queue: &str, key: &str) -> Result<(), StoreError>;

    /// Delete every task in `state`, returning how many were removed
    async fn delete_all(&self, queue: &str, state: TaskState) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S: QueueStore + ?Sized> QueueStore for Arc<S> {
    async fn queues(&self) -> Result<Vec<String>, StoreError> {
        (**self).queues().await
    }

    async fn list_tasks(
        &self,
        queue: &str,
        state: TaskState,
        page: Pagination,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        (**self).list_tasks(queue, state, page).await
    }

    async fn current_stats(&self, queue: &str) -> Result<QueueStats, StoreError> {
        (**self).current_stats(queue).await
    }

    async fn cancel_active(&self, task_id: &str) -> Result<(), StoreError> {
        (**self).cancel_active(task_id).await
    }

    async fn delete_by_key(&self, queue: &str, key: &str) -> Result<(), StoreError> {
        (**self).delete_by_key(queue, key).await
    }

    async fn delete_all(&self, queue: &str, state: TaskState) -> Result<u64, StoreError> {
        (**self).delete_all(queue, state).await
    }
}
