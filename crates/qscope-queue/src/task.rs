//! Task definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Currently being processed by a worker
    Active,
    /// Waiting in queue, ready to be processed
    Pending,
    /// Waiting for its process time
    Scheduled,
    /// Failed, waiting for the next retry attempt
    Retry,
    /// Permanently failed after max retries
    Dead,
}

impl TaskState {
    pub const ALL: [TaskState; 5] = [
        TaskState::Active,
        TaskState::Pending,
        TaskState::Scheduled,
        TaskState::Retry,
        TaskState::Dead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Retry => "retry",
            Self::Dead => "dead",
        }
    }

    /// Prefix of the store-assigned task key for this state
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::Active => "a",
            Self::Pending => "p",
            Self::Scheduled => "s",
            Self::Retry => "r",
            Self::Dead => "d",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task state: {0}")]
pub struct ParseStateError(pub String);

impl FromStr for TaskState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ParseStateError(s.to_string()))
    }
}

/// State-specific metadata carried by a task record.
///
/// The record's state is derived from this value, so a record can never
/// claim one state while carrying another state's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TaskDetail {
    Active {
        #[serde(default)]
        started_at: Option<DateTime<Utc>>,
        #[serde(default)]
        deadline: Option<DateTime<Utc>>,
    },
    Pending,
    Scheduled {
        next_process_at: DateTime<Utc>,
    },
    Retry {
        next_process_at: DateTime<Utc>,
        last_error: String,
        #[serde(default)]
        last_failed_at: Option<DateTime<Utc>>,
    },
    Dead {
        last_failed_at: DateTime<Utc>,
        last_error: String,
    },
}

impl TaskDetail {
    pub fn state(&self) -> TaskState {
        match self {
            Self::Active { .. } => TaskState::Active,
            Self::Pending => TaskState::Pending,
            Self::Scheduled { .. } => TaskState::Scheduled,
            Self::Retry { .. } => TaskState::Retry,
            Self::Dead { .. } => TaskState::Dead,
        }
    }
}

/// A task as reported by the queue store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default)]
    pub id: String,
    /// Store-assigned key, unique within (queue, state)
    #[serde(default)]
    pub key: String,
    pub queue: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub max_retry: u32,
    #[serde(default)]
    pub retried: u32,
    #[serde(flatten)]
    pub detail: TaskDetail,
}

impl TaskRecord {
    /// Create a record with a fresh id and the key derived from it
    pub fn new(
        queue: impl Into<String>,
        task_type: impl Into<String>,
        payload: serde_json::Value,
        detail: TaskDetail,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let key = Self::key_for(detail.state(), &id);
        Self {
            id,
            key,
            queue: queue.into(),
            task_type: task_type.into(),
            payload,
            max_retry: 0,
            retried: 0,
            detail,
        }
    }

    pub fn with_retries(mut self, retried: u32, max_retry: u32) -> Self {
        self.retried = retried;
        self.max_retry = max_retry;
        self
    }

    pub fn state(&self) -> TaskState {
        self.detail.state()
    }

    /// Key format: `<state prefix>:<task id>`
    pub fn key_for(state: TaskState, id: &str) -> String {
        format!("{}:{}", state.key_prefix(), id)
    }
}

/// Aggregate counters for one queue at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue: String,
    /// Total number of tasks across all states
    pub size: u64,
    pub active: u64,
    pub pending: u64,
    pub scheduled: u64,
    pub retry: u64,
    pub dead: u64,
    /// Tasks processed since the counters were last reset
    pub processed: u64,
    /// Tasks that failed processing since the counters were last reset
    pub failed: u64,
    pub paused: bool,
    pub timestamp: DateTime<Utc>,
}

/// Page window requested from the store.
///
/// Values are carried through uninterpreted; bounds are the store's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub size: i64,
    /// 1-based page number
    pub page: i64,
}

impl Pagination {
    pub const DEFAULT_SIZE: i64 = 20;
    pub const DEFAULT_PAGE: i64 = 1;

    pub fn new(size: i64, page: i64) -> Self {
        Self { size, page }
    }

    /// Number of records to skip
    pub fn offset(&self) -> i64 {
        self.size.saturating_mul(self.page.saturating_sub(1))
    }

    /// Maximum number of records in the page
    pub fn limit(&self) -> i64 {
        self.size
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SIZE, Self::DEFAULT_PAGE)
    }
}
