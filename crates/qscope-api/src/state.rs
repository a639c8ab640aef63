//! Application State
//!
//! Handlers share a single store handle through the inspector. Nothing
//! else is shared between requests.

use qscope_queue::QueueStore;
use std::sync::Arc;

use crate::inspector::{BatchOptions, TaskInspector};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    inspector: Arc<TaskInspector>,
    batch: BatchOptions,
}

impl AppState {
    pub fn new(store: Arc<dyn QueueStore>, batch: BatchOptions) -> Self {
        Self {
            inspector: Arc::new(TaskInspector::new(store)),
            batch,
        }
    }

    /// State with default batch tuning
    pub fn with_store(store: Arc<dyn QueueStore>) -> Self {
        Self::new(store, BatchOptions::default())
    }

    /// Get the task inspector (cloned Arc for sharing)
    pub fn inspector(&self) -> Arc<TaskInspector> {
        self.inspector.clone()
    }

    pub fn batch_options(&self) -> BatchOptions {
        self.batch
    }
}
