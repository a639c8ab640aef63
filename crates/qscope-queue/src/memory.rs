//! In-memory queue store
//!
//! Holds every queue's tasks in a single map guarded by a `RwLock`.
//! Used by the development server and as the default store in tests.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{QueueStore, StoreError};
use crate::task::{Pagination, QueueStats, TaskDetail, TaskRecord, TaskState};

#[derive(Debug, Default)]
struct QueueEntry {
    /// Insertion order is the listing order for active and pending tasks
    tasks: Vec<TaskRecord>,
    processed: u64,
    failed: u64,
    paused: bool,
}

impl QueueEntry {
    fn stats(&self, name: &str) -> QueueStats {
        let mut counts: HashMap<TaskState, u64> = HashMap::new();
        for task in &self.tasks {
            *counts.entry(task.state()).or_default() += 1;
        }
        let count = |state: TaskState| counts.get(&state).copied().unwrap_or(0);

        QueueStats {
            queue: name.to_string(),
            size: self.tasks.len() as u64,
            active: count(TaskState::Active),
            pending: count(TaskState::Pending),
            scheduled: count(TaskState::Scheduled),
            retry: count(TaskState::Retry),
            dead: count(TaskState::Dead),
            processed: self.processed,
            failed: self.failed,
            paused: self.paused,
            timestamp: Utc::now(),
        }
    }
}

/// Fixture used to pre-populate a `MemoryQueue`
#[derive(Debug, Default, Deserialize)]
pub struct MemorySeed {
    #[serde(default)]
    pub queues: Vec<QueueSeed>,
}

#[derive(Debug, Deserialize)]
pub struct QueueSeed {
    pub name: String,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub processed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Arc<RwLock<HashMap<String, QueueEntry>>>,
    cancellations: Arc<RwLock<HashSet<String>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a seed fixture.
    /// Task queue names are overridden by the queue they are listed under.
    pub async fn from_seed(seed: MemorySeed) -> Self {
        let store = Self::new();
        for queue in seed.queues {
            store.create_queue(&queue.name).await;
            store
                .set_counters(&queue.name, queue.processed, queue.failed)
                .await;
            store.set_paused(&queue.name, queue.paused).await;
            for mut task in queue.tasks {
                task.queue = queue.name.clone();
                store.insert(task).await;
            }
        }
        store
    }

    /// Register an empty queue (no-op if it already exists)
    pub async fn create_queue(&self, name: &str) {
        let mut queues = self.queues.write().await;
        queues.entry(name.to_string()).or_default();
    }

    /// Insert a task, creating its queue on demand.
    ///
    /// The id is generated when empty and the key is always re-derived
    /// from state and id. A record with the same key is replaced.
    pub async fn insert(&self, mut record: TaskRecord) -> String {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        record.key = TaskRecord::key_for(record.state(), &record.id);
        let key = record.key.clone();

        let mut queues = self.queues.write().await;
        let entry = queues.entry(record.queue.clone()).or_default();
        match entry.tasks.iter_mut().find(|t| t.key == key) {
            Some(existing) => *existing = record,
            None => entry.tasks.push(record),
        }
        key
    }

    pub async fn set_counters(&self, queue: &str, processed: u64, failed: u64) {
        let mut queues = self.queues.write().await;
        let entry = queues.entry(queue.to_string()).or_default();
        entry.processed = processed;
        entry.failed = failed;
    }

    pub async fn set_paused(&self, queue: &str, paused: bool) {
        let mut queues = self.queues.write().await;
        queues.entry(queue.to_string()).or_default().paused = paused;
    }

    /// Whether a cancellation signal was accepted for this task id
    pub async fn cancel_requested(&self, task_id: &str) -> bool {
        self.cancellations.read().await.contains(task_id)
    }
}

fn page_bounds(page: Pagination) -> Option<(usize, usize)> {
    if page.size <= 0 || page.page < 1 {
        return None;
    }
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    Some((offset, limit))
}

#[async_trait]
impl QueueStore for MemoryQueue {
    async fn queues(&self) -> Result<Vec<String>, StoreError> {
        let queues = self.queues.read().await;
        let mut names: Vec<String> = queues.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn list_tasks(
        &self,
        queue: &str,
        state: TaskState,
        page: Pagination,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        let queues = self.queues.read().await;
        let entry = queues
            .get(queue)
            .ok_or_else(|| StoreError::QueueNotFound(queue.to_string()))?;

        let Some((offset, limit)) = page_bounds(page) else {
            return Ok(Vec::new());
        };

        let mut tasks: Vec<&TaskRecord> =
            entry.tasks.iter().filter(|t| t.state() == state).collect();

        // Scheduled and retry tasks come out soonest first, dead tasks most
        // recent failure first. Sorts are stable so ties keep insertion order.
        match state {
            TaskState::Scheduled | TaskState::Retry => tasks.sort_by_key(|t| match &t.detail {
                TaskDetail::Scheduled { next_process_at }
                | TaskDetail::Retry {
                    next_process_at, ..
                } => Some(*next_process_at),
                _ => None,
            }),
            TaskState::Dead => tasks.sort_by_key(|t| match &t.detail {
                TaskDetail::Dead { last_failed_at, .. } => {
                    std::cmp::Reverse(Some(*last_failed_at))
                }
                _ => std::cmp::Reverse(None),
            }),
            TaskState::Active | TaskState::Pending => {}
        }

        Ok(tasks
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn current_stats(&self, queue: &str) -> Result<QueueStats, StoreError> {
        let queues = self.queues.read().await;
        queues
            .get(queue)
            .map(|entry| entry.stats(queue))
            .ok_or_else(|| StoreError::QueueNotFound(queue.to_string()))
    }

    async fn cancel_active(&self, task_id: &str) -> Result<(), StoreError> {
        let is_active = {
            let queues = self.queues.read().await;
            queues.values().any(|entry| {
                entry
                    .tasks
                    .iter()
                    .any(|t| t.id == task_id && t.state() == TaskState::Active)
            })
        };

        if !is_active {
            return Err(StoreError::TaskNotFound(task_id.to_string()));
        }

        self.cancellations
            .write()
            .await
            .insert(task_id.to_string());
        tracing::debug!(task_id = %task_id, "Cancellation signal recorded");
        Ok(())
    }

    async fn delete_by_key(&self, queue: &str, key: &str) -> Result<(), StoreError> {
        let mut queues = self.queues.write().await;
        let entry = queues
            .get_mut(queue)
            .ok_or_else(|| StoreError::QueueNotFound(queue.to_string()))?;

        let index = entry
            .tasks
            .iter()
            .position(|t| t.key == key)
            .ok_or_else(|| StoreError::TaskNotFound(key.to_string()))?;

        if entry.tasks[index].state() == TaskState::Active {
            return Err(StoreError::FailedPrecondition(format!(
                "task {} is active; cancel it instead",
                key
            )));
        }

        entry.tasks.remove(index);
        Ok(())
    }

    async fn delete_all(&self, queue: &str, state: TaskState) -> Result<u64, StoreError> {
        if state == TaskState::Active {
            return Err(StoreError::FailedPrecondition(
                "active tasks cannot be deleted".to_string(),
            ));
        }

        let mut queues = self.queues.write().await;
        let entry = queues
            .get_mut(queue)
            .ok_or_else(|| StoreError::QueueNotFound(queue.to_string()))?;

        let before = entry.tasks.len();
        entry.tasks.retain(|t| t.state() != state);
        Ok((before - entry.tasks.len()) as u64)
    }
}
