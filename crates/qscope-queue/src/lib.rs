//! # qscope Queue
//!
//! Task model and the store port used by the qscope inspector.
//!
//! Features:
//! - State-tagged `TaskRecord` model (active, pending, scheduled, retry, dead)
//! - Pluggable `QueueStore` backend trait
//! - In-memory store for development and tests
//! - Timeout decorator bounding every store call

pub mod memory;
pub mod store;
pub mod task;
pub mod timeout;

pub use memory::{MemoryQueue, MemorySeed, QueueSeed};
pub use store::{QueueStore, StoreError};
pub use task::{Pagination, ParseStateError, QueueStats, TaskDetail, TaskRecord, TaskState};
pub use timeout::TimeoutStore;
