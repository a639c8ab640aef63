//! Per-state task views
//!
//! Each task state has its own view struct, and each view is produced by
//! one pure mapping function. A view only ever carries the fields of its
//! own state.

use chrono::{DateTime, Utc};
use qscope_queue::{QueueStats, TaskDetail, TaskRecord, TaskState};
use serde::Serialize;
use utoipa::ToSchema;

/// Fields shared by every task view
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BaseTaskView {
    pub id: String,
    /// Key used to target this task in delete operations
    pub key: String,
    pub queue: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    pub max_retry: u32,
    pub retried: u32,
}

impl BaseTaskView {
    fn from_record(record: &TaskRecord) -> Self {
        Self {
            id: record.id.clone(),
            key: record.key.clone(),
            queue: record.queue.clone(),
            task_type: record.task_type.clone(),
            payload: record.payload.clone(),
            max_retry: record.max_retry,
            retried: record.retried,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ActiveTaskView {
    #[serde(flatten)]
    pub base: BaseTaskView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PendingTaskView {
    #[serde(flatten)]
    pub base: BaseTaskView,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ScheduledTaskView {
    #[serde(flatten)]
    pub base: BaseTaskView,
    pub next_process_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RetryTaskView {
    #[serde(flatten)]
    pub base: BaseTaskView,
    pub next_process_at: DateTime<Utc>,
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DeadTaskView {
    #[serde(flatten)]
    pub base: BaseTaskView,
    pub last_failed_at: DateTime<Utc>,
    pub error_message: String,
}

/// A task projected for its state
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum TaskView {
    Active(ActiveTaskView),
    Pending(PendingTaskView),
    Scheduled(ScheduledTaskView),
    Retry(RetryTaskView),
    Dead(DeadTaskView),
}

impl TaskView {
    pub fn state(&self) -> TaskState {
        match self {
            Self::Active(_) => TaskState::Active,
            Self::Pending(_) => TaskState::Pending,
            Self::Scheduled(_) => TaskState::Scheduled,
            Self::Retry(_) => TaskState::Retry,
            Self::Dead(_) => TaskState::Dead,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Active(v) => &v.base.key,
            Self::Pending(v) => &v.base.key,
            Self::Scheduled(v) => &v.base.key,
            Self::Retry(v) => &v.base.key,
            Self::Dead(v) => &v.base.key,
        }
    }
}

pub fn active_view(
    record: &TaskRecord,
    started_at: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
) -> ActiveTaskView {
    ActiveTaskView {
        base: BaseTaskView::from_record(record),
        started_at,
        deadline,
    }
}

pub fn pending_view(record: &TaskRecord) -> PendingTaskView {
    PendingTaskView {
        base: BaseTaskView::from_record(record),
    }
}

pub fn scheduled_view(record: &TaskRecord, next_process_at: DateTime<Utc>) -> ScheduledTaskView {
    ScheduledTaskView {
        base: BaseTaskView::from_record(record),
        next_process_at,
    }
}

pub fn retry_view(
    record: &TaskRecord,
    next_process_at: DateTime<Utc>,
    last_error: &str,
) -> RetryTaskView {
    RetryTaskView {
        base: BaseTaskView::from_record(record),
        next_process_at,
        error_message: last_error.to_string(),
    }
}

pub fn dead_view(
    record: &TaskRecord,
    last_failed_at: DateTime<Utc>,
    last_error: &str,
) -> DeadTaskView {
    DeadTaskView {
        base: BaseTaskView::from_record(record),
        last_failed_at,
        error_message: last_error.to_string(),
    }
}

impl From<&TaskRecord> for TaskView {
    fn from(record: &TaskRecord) -> Self {
        match &record.detail {
            TaskDetail::Active {
                started_at,
                deadline,
            } => TaskView::Active(active_view(record, *started_at, *deadline)),
            TaskDetail::Pending => TaskView::Pending(pending_view(record)),
            TaskDetail::Scheduled { next_process_at } => {
                TaskView::Scheduled(scheduled_view(record, *next_process_at))
            }
            TaskDetail::Retry {
                next_process_at,
                last_error,
                ..
            } => TaskView::Retry(retry_view(record, *next_process_at, last_error)),
            TaskDetail::Dead {
                last_failed_at,
                last_error,
            } => TaskView::Dead(dead_view(record, *last_failed_at, last_error)),
        }
    }
}

impl From<TaskRecord> for TaskView {
    fn from(record: TaskRecord) -> Self {
        TaskView::from(&record)
    }
}

/// Aggregate counters for one queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct QueueStatsView {
    pub queue: String,
    pub size: u64,
    pub active: u64,
    pub pending: u64,
    pub scheduled: u64,
    pub retry: u64,
    pub dead: u64,
    pub processed: u64,
    pub failed: u64,
    pub paused: bool,
    pub timestamp: DateTime<Utc>,
}

impl From<QueueStats> for QueueStatsView {
    fn from(stats: QueueStats) -> Self {
        Self {
            queue: stats.queue,
            size: stats.size,
            active: stats.active,
            pending: stats.pending,
            scheduled: stats.scheduled,
            retry: stats.retry,
            dead: stats.dead,
            processed: stats.processed,
            failed: stats.failed,
            paused: stats.paused,
            timestamp: stats.timestamp,
        }
    }
}

/// One page of tasks together with the queue's counters
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TaskListing {
    pub tasks: Vec<TaskView>,
    pub stats: QueueStatsView,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct QueueIndex {
    pub queues: Vec<QueueStatsView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn field_names(view: &TaskView) -> Vec<String> {
        let Value::Object(map) = serde_json::to_value(view).unwrap() else {
            panic!("view did not serialize to an object");
        };
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }

    fn record(detail: TaskDetail) -> TaskRecord {
        TaskRecord::new("default", "email:send", json!({ "to": "a@b.c" }), detail)
            .with_retries(2, 25)
    }

    const BASE: [&str; 7] = ["id", "key", "max_retry", "payload", "queue", "retried", "type"];

    fn expect_fields(view: &TaskView, extra: &[&str]) {
        let mut expected: Vec<String> = BASE.iter().chain(extra).map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(field_names(view), expected, "fields of {:?} view", view.state());
    }

    #[test]
    fn test_views_carry_only_their_state_fields() {
        let now = Utc::now();

        expect_fields(&TaskView::from(record(TaskDetail::Pending)), &[]);
        expect_fields(
            &TaskView::from(record(TaskDetail::Scheduled {
                next_process_at: now,
            })),
            &["next_process_at"],
        );
        expect_fields(
            &TaskView::from(record(TaskDetail::Retry {
                next_process_at: now,
                last_error: "timeout".into(),
                last_failed_at: Some(now),
            })),
            &["error_message", "next_process_at"],
        );
        expect_fields(
            &TaskView::from(record(TaskDetail::Dead {
                last_failed_at: now,
                last_error: "boom".into(),
            })),
            &["error_message", "last_failed_at"],
        );
        expect_fields(
            &TaskView::from(record(TaskDetail::Active {
                started_at: Some(now),
                deadline: None,
            })),
            &["started_at"],
        );
    }

    #[test]
    fn test_active_without_start_time_omits_it() {
        let view = TaskView::from(record(TaskDetail::Active {
            started_at: None,
            deadline: None,
        }));
        expect_fields(&view, &[]);
    }

    #[test]
    fn test_mapping_preserves_identity_and_payload() {
        let source = record(TaskDetail::Dead {
            last_failed_at: Utc::now(),
            last_error: "boom".into(),
        });
        let view = TaskView::from(&source);

        assert_eq!(view.state(), TaskState::Dead);
        assert_eq!(view.key(), source.key);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "email:send");
        assert_eq!(json["payload"]["to"], "a@b.c");
        assert_eq!(json["error_message"], "boom");
        assert_eq!(json["retried"], 2);
    }

    #[test]
    fn test_empty_listing_serializes_tasks_array() {
        let listing = TaskListing {
            tasks: Vec::new(),
            stats: QueueStatsView {
                queue: "default".into(),
                size: 0,
                active: 0,
                pending: 0,
                scheduled: 0,
                retry: 0,
                dead: 0,
                processed: 0,
                failed: 0,
                paused: false,
                timestamp: Utc::now(),
            },
        };

        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["tasks"], json!([]));
        assert_eq!(json["stats"]["queue"], "default");
    }
}
