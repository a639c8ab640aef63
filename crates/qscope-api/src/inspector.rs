//! Task inspector
//!
//! Query and mutation operations over a shared `QueueStore` handle. The
//! inspector holds no mutable state of its own; any serialization of
//! conflicting operations happens in the store.

use futures::stream::{self, StreamExt};
use qscope_queue::{Pagination, QueueStore, StoreError, TaskState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::views::{QueueIndex, QueueStatsView, TaskListing, TaskView};

/// Tuning for batch deletions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum number of per-key deletions in flight
    pub concurrency: usize,
    /// Keys still unresolved when this elapses are reported as failed
    pub deadline: Option<Duration>,
}

impl BatchOptions {
    pub const DEFAULT_CONCURRENCY: usize = 8;
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(25);
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: Self::DEFAULT_CONCURRENCY,
            deadline: Some(Self::DEFAULT_DEADLINE),
        }
    }
}

/// Outcome of a batch deletion.
///
/// Every distinct input key lands in exactly one of the two lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchDeleteResult {
    pub deleted_keys: Vec<String>,
    pub failed_keys: Vec<String>,
}

#[derive(Clone)]
pub struct TaskInspector {
    store: Arc<dyn QueueStore>,
}

impl TaskInspector {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// One page of tasks in `state` plus the queue's current counters.
    ///
    /// The listing is fetched before the stats and the two reads are not
    /// atomic. Either failure fails the whole call.
    pub async fn list_tasks(
        &self,
        queue: &str,
        state: TaskState,
        page: Pagination,
    ) -> Result<TaskListing, StoreError> {
        let records = self.store.list_tasks(queue, state, page).await?;
        let stats = self.store.current_stats(queue).await?;

        let tasks: Vec<TaskView> = records.iter().map(TaskView::from).collect();

        tracing::debug!(
            queue = %queue,
            state = %state,
            size = page.size,
            page = page.page,
            count = tasks.len(),
            "Listed tasks"
        );

        Ok(TaskListing {
            tasks,
            stats: stats.into(),
        })
    }

    pub async fn queue_stats(&self, queue: &str) -> Result<QueueStatsView, StoreError> {
        Ok(self.store.current_stats(queue).await?.into())
    }

    /// Counters for every known queue, in name order.
    /// A queue removed between the two reads is left out.
    pub async fn all_queue_stats(&self) -> Result<QueueIndex, StoreError> {
        let names = self.store.queues().await?;
        let mut queues = Vec::with_capacity(names.len());

        for name in names {
            match self.store.current_stats(&name).await {
                Ok(stats) => queues.push(stats.into()),
                Err(e) if e.is_not_found() => {
                    tracing::debug!(queue = %name, "Queue disappeared while listing");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(QueueIndex { queues })
    }

    /// Signal an active task to stop. Success means the signal was
    /// accepted, not that the task has stopped.
    pub async fn cancel(&self, task_id: &str) -> Result<(), StoreError> {
        self.store.cancel_active(task_id).await?;
        tracing::info!(task_id = %task_id, "Cancellation requested");
        Ok(())
    }

    pub async fn delete_task(&self, queue: &str, key: &str) -> Result<(), StoreError> {
        self.store.delete_by_key(queue, key).await?;
        tracing::info!(queue = %queue, key = %key, "Task deleted");
        Ok(())
    }

    /// Delete each key independently.
    ///
    /// There is no rollback: a failure on one key never stops the others.
    /// Duplicate keys are attempted once.
    pub async fn batch_delete(
        &self,
        queue: &str,
        keys: Vec<String>,
        options: BatchOptions,
    ) -> BatchDeleteResult {
        let mut seen = HashSet::new();
        let keys: Vec<String> = keys
            .into_iter()
            .filter(|key| seen.insert(key.clone()))
            .collect();

        let mut result = BatchDeleteResult::default();
        if keys.is_empty() {
            return result;
        }

        let mut unresolved: HashSet<String> = keys.iter().cloned().collect();
        let store = &self.store;

        let mut outcomes = stream::iter(keys.iter().cloned().map(|key| async move {
            let outcome = store.delete_by_key(queue, &key).await;
            (key, outcome)
        }))
        .buffer_unordered(options.concurrency.max(1));

        let drain = async {
            while let Some((key, outcome)) = outcomes.next().await {
                unresolved.remove(&key);
                match outcome {
                    Ok(()) => result.deleted_keys.push(key),
                    Err(e) => {
                        tracing::warn!(queue = %queue, key = %key, error = %e, "Batch delete failed for key");
                        result.failed_keys.push(key);
                    }
                }
            }
        };

        match options.deadline {
            Some(deadline) => {
                if tokio::time::timeout(deadline, drain).await.is_err() {
                    tracing::warn!(
                        queue = %queue,
                        deadline_ms = deadline.as_millis() as u64,
                        "Batch delete deadline elapsed"
                    );
                }
            }
            None => drain.await,
        }
        drop(outcomes);

        // Anything not confirmed before the deadline counts as failed
        result.failed_keys.extend(
            keys.into_iter()
                .filter(|key| unresolved.contains(key)),
        );

        tracing::info!(
            queue = %queue,
            deleted = result.deleted_keys.len(),
            failed = result.failed_keys.len(),
            "Batch delete finished"
        );

        result
    }

    /// Remove every task in `state`. Returns how many were removed.
    pub async fn clear_all(&self, queue: &str, state: TaskState) -> Result<u64, StoreError> {
        let cleared = self.store.delete_all(queue, state).await?;
        tracing::info!(queue = %queue, state = %state, cleared, "Cleared tasks");
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use qscope_queue::{MemoryQueue, QueueStats, TaskDetail, TaskRecord};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory store with injectable per-key failures and delays
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryQueue,
        failing: HashSet<String>,
        stalled: HashSet<String>,
        fail_listing: bool,
        fail_stats: bool,
        stats_calls: AtomicUsize,
        delete_calls: AtomicUsize,
    }

    #[async_trait]
    impl QueueStore for FlakyStore {
        async fn queues(&self) -> Result<Vec<String>, StoreError> {
            self.inner.queues().await
        }

        async fn list_tasks(
            &self,
            queue: &str,
            state: TaskState,
            page: Pagination,
        ) -> Result<Vec<TaskRecord>, StoreError> {
            if self.fail_listing {
                return Err(StoreError::Backend("listing unavailable".into()));
            }
            self.inner.list_tasks(queue, state, page).await
        }

        async fn current_stats(&self, queue: &str) -> Result<QueueStats, StoreError> {
            self.stats_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_stats {
                return Err(StoreError::Backend("stats unavailable".into()));
            }
            self.inner.current_stats(queue).await
        }

        async fn cancel_active(&self, task_id: &str) -> Result<(), StoreError> {
            self.inner.cancel_active(task_id).await
        }

        async fn delete_by_key(&self, queue: &str, key: &str) -> Result<(), StoreError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(key) {
                return Err(StoreError::Backend(format!("cannot delete {key}")));
            }
            if self.stalled.contains(key) {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            self.inner.delete_by_key(queue, key).await
        }

        async fn delete_all(&self, queue: &str, state: TaskState) -> Result<u64, StoreError> {
            self.inner.delete_all(queue, state).await
        }
    }

    fn dead_task() -> TaskRecord {
        TaskRecord::new(
            "default",
            "email:send",
            json!({}),
            TaskDetail::Dead {
                last_failed_at: Utc::now(),
                last_error: "boom".into(),
            },
        )
    }

    async fn seeded(n: usize) -> (FlakyStore, Vec<String>) {
        let store = FlakyStore::default();
        let mut keys = Vec::new();
        for _ in 0..n {
            keys.push(store.inner.insert(dead_task()).await);
        }
        (store, keys)
    }

    fn sorted(mut keys: Vec<String>) -> Vec<String> {
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn test_batch_partial_failure_keeps_going() {
        let (mut store, keys) = seeded(3).await;
        store.failing.insert(keys[1].clone());
        let store = Arc::new(store);
        let inspector = TaskInspector::new(store.clone());

        let result = inspector
            .batch_delete("default", keys.clone(), BatchOptions::default())
            .await;

        assert_eq!(
            sorted(result.deleted_keys),
            sorted(vec![keys[0].clone(), keys[2].clone()])
        );
        assert_eq!(result.failed_keys, vec![keys[1].clone()]);
        assert_eq!(store.inner.current_stats("default").await.unwrap().dead, 1);
    }

    #[tokio::test]
    async fn test_batch_empty_input() {
        let (store, _) = seeded(1).await;
        let store = Arc::new(store);
        let inspector = TaskInspector::new(store.clone());

        let result = inspector
            .batch_delete("default", Vec::new(), BatchOptions::default())
            .await;

        assert_eq!(result, BatchDeleteResult::default());
        assert_eq!(store.delete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_duplicates_resolve_once() {
        let (store, keys) = seeded(1).await;
        let store = Arc::new(store);
        let inspector = TaskInspector::new(store.clone());

        let input = vec![keys[0].clone(), keys[0].clone(), "d:missing".to_string()];
        let result = inspector
            .batch_delete("default", input, BatchOptions::default())
            .await;

        assert_eq!(result.deleted_keys, vec![keys[0].clone()]);
        assert_eq!(result.failed_keys, vec!["d:missing".to_string()]);
        assert_eq!(store.delete_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_batch_deadline_reports_unresolved_as_failed() {
        let (mut store, keys) = seeded(4).await;
        store.stalled.insert(keys[2].clone());
        let inspector = TaskInspector::new(Arc::new(store));

        let options = BatchOptions {
            concurrency: 1,
            deadline: Some(Duration::from_millis(100)),
        };
        let result = inspector
            .batch_delete("default", keys.clone(), options)
            .await;

        // Serial processing stalls on the third key; the fourth never starts
        assert_eq!(result.deleted_keys, vec![keys[0].clone(), keys[1].clone()]);
        assert_eq!(result.failed_keys, vec![keys[2].clone(), keys[3].clone()]);
    }

    #[tokio::test]
    async fn test_batch_deadline_partition_with_parallel_deletes() {
        let (mut store, keys) = seeded(6).await;
        for i in [1, 3, 5] {
            store.stalled.insert(keys[i].clone());
        }
        let inspector = TaskInspector::new(Arc::new(store));

        let options = BatchOptions {
            concurrency: 4,
            deadline: Some(Duration::from_millis(200)),
        };
        let mut input = keys.clone();
        input.push(keys[3].clone());
        let result = inspector.batch_delete("default", input, options).await;

        let deleted: HashSet<&String> = result.deleted_keys.iter().collect();
        let failed: HashSet<&String> = result.failed_keys.iter().collect();
        let all: HashSet<&String> = keys.iter().collect();

        assert!(deleted.is_disjoint(&failed));
        assert_eq!(deleted.union(&failed).copied().collect::<HashSet<_>>(), all);
        assert_eq!(result.deleted_keys.len() + result.failed_keys.len(), keys.len());
        assert_eq!(
            sorted(result.failed_keys.clone()),
            sorted(vec![keys[1].clone(), keys[3].clone(), keys[5].clone()])
        );
    }

    #[tokio::test]
    async fn test_listing_failure_skips_stats() {
        let store = Arc::new(FlakyStore {
            fail_listing: true,
            ..Default::default()
        });
        store.inner.create_queue("default").await;
        let inspector = TaskInspector::new(store.clone());

        let err = inspector
            .list_tasks("default", TaskState::Dead, Pagination::default())
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(store.stats_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stats_failure_fails_whole_listing() {
        let store = FlakyStore {
            fail_stats: true,
            ..Default::default()
        };
        store.inner.insert(dead_task()).await;
        let store = Arc::new(store);
        let inspector = TaskInspector::new(store.clone());

        let err = inspector
            .list_tasks("default", TaskState::Dead, Pagination::default())
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Backend(msg) if msg == "stats unavailable"));
        assert_eq!(store.stats_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listing_pairs_tasks_with_stats() {
        let (store, keys) = seeded(2).await;
        let inspector = TaskInspector::new(Arc::new(store));

        let listing = inspector
            .list_tasks("default", TaskState::Dead, Pagination::default())
            .await
            .unwrap();
        assert_eq!(listing.tasks.len(), 2);
        assert!(listing.tasks.iter().all(|t| keys.iter().any(|k| k == t.key())));
        assert_eq!(listing.stats.dead, 2);

        let empty = inspector
            .list_tasks("default", TaskState::Retry, Pagination::default())
            .await
            .unwrap();
        assert!(empty.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_with_nothing_to_clear() {
        let store = FlakyStore::default();
        store.inner.create_queue("default").await;
        let inspector = TaskInspector::new(Arc::new(store));

        assert_eq!(
            inspector
                .clear_all("default", TaskState::Scheduled)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_all_queue_stats() {
        let store = FlakyStore::default();
        store.inner.create_queue("low").await;
        store.inner.insert(dead_task()).await;
        let inspector = TaskInspector::new(Arc::new(store));

        let index = inspector.all_queue_stats().await.unwrap();
        let names: Vec<_> = index.queues.iter().map(|q| q.queue.as_str()).collect();
        assert_eq!(names, vec!["default", "low"]);
        assert_eq!(index.queues[0].dead, 1);
    }
}
