//! # qscope API
//!
//! HTTP inspection surface for background task queues.
//!
//! Features:
//! - Per-state task listings with queue stats
//! - Cancel, delete, batch delete and bulk clear
//! - Axum-based web server with graceful shutdown
//! - OpenAPI document

pub mod error;
pub mod extract;
pub mod inspector;
pub mod middleware;
pub mod pagination;
pub mod routes;
pub mod server;
pub mod state;
pub mod views;

pub use error::{ApiError, ApiResult};
pub use inspector::{BatchDeleteResult, BatchOptions, TaskInspector};
pub use pagination::{page_options, PageSelection};
pub use server::{init_tracing, QscopeServer, ServerConfig};
pub use state::AppState;
pub use views::{QueueStatsView, TaskListing, TaskView};
