//! API routes for queue inspection

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use qscope_queue::TaskState;
use serde::{Deserialize, Serialize};
use utoipa::OpenApi;

use crate::error::{ApiResult, ErrorBody, ErrorResponse};
use crate::extract::BoundedJson;
use crate::inspector::BatchDeleteResult;
use crate::pagination::PageSelection;
use crate::state::AppState;
use crate::views::{
    ActiveTaskView, BaseTaskView, DeadTaskView, PendingTaskView, QueueIndex, QueueStatsView,
    RetryTaskView, ScheduledTaskView, TaskListing, TaskView,
};

/// Health check response
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Basic health check handler (lightweight)
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Counters for every queue
#[utoipa::path(
    get,
    path = "/queues",
    responses(
        (status = 200, description = "Stats for all queues", body = QueueIndex),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn list_queues(State(state): State<AppState>) -> ApiResult<Json<QueueIndex>> {
    Ok(Json(state.inspector().all_queue_stats().await?))
}

#[utoipa::path(
    get,
    path = "/queues/{qname}",
    params(("qname" = String, Path, description = "Queue name")),
    responses(
        (status = 200, description = "Queue stats", body = QueueStatsView),
        (status = 404, description = "Queue not found", body = ErrorResponse)
    )
)]
pub async fn get_queue(
    State(state): State<AppState>,
    Path(qname): Path<String>,
) -> ApiResult<Json<QueueStatsView>> {
    Ok(Json(state.inspector().queue_stats(&qname).await?))
}

async fn listing(
    state: &AppState,
    qname: &str,
    task_state: TaskState,
    PageSelection(page): PageSelection,
) -> ApiResult<Json<TaskListing>> {
    let listing = state
        .inspector()
        .list_tasks(qname, task_state, page)
        .await?;
    Ok(Json(listing))
}

#[utoipa::path(
    get,
    path = "/queues/{qname}/tasks/active",
    params(
        ("qname" = String, Path, description = "Queue name"),
        ("size" = Option<i64>, Query, description = "Page size (default 20)"),
        ("page" = Option<i64>, Query, description = "Page number, 1-based (default 1)")
    ),
    responses(
        (status = 200, description = "Active tasks and queue stats", body = TaskListing),
        (status = 404, description = "Queue not found", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn list_active_tasks(
    State(state): State<AppState>,
    Path(qname): Path<String>,
    page: PageSelection,
) -> ApiResult<Json<TaskListing>> {
    listing(&state, &qname, TaskState::Active, page).await
}

#[utoipa::path(
    get,
    path = "/queues/{qname}/tasks/pending",
    params(
        ("qname" = String, Path, description = "Queue name"),
        ("size" = Option<i64>, Query, description = "Page size (default 20)"),
        ("page" = Option<i64>, Query, description = "Page number, 1-based (default 1)")
    ),
    responses(
        (status = 200, description = "Pending tasks and queue stats", body = TaskListing),
        (status = 404, description = "Queue not found", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn list_pending_tasks(
    State(state): State<AppState>,
    Path(qname): Path<String>,
    page: PageSelection,
) -> ApiResult<Json<TaskListing>> {
    listing(&state, &qname, TaskState::Pending, page).await
}

#[utoipa::path(
    get,
    path = "/queues/{qname}/tasks/scheduled",
    params(
        ("qname" = String, Path, description = "Queue name"),
        ("size" = Option<i64>, Query, description = "Page size (default 20)"),
        ("page" = Option<i64>, Query, description = "Page number, 1-based (default 1)")
    ),
    responses(
        (status = 200, description = "Scheduled tasks and queue stats", body = TaskListing),
        (status = 404, description = "Queue not found", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn list_scheduled_tasks(
    State(state): State<AppState>,
    Path(qname): Path<String>,
    page: PageSelection,
) -> ApiResult<Json<TaskListing>> {
    listing(&state, &qname, TaskState::Scheduled, page).await
}

#[utoipa::path(
    get,
    path = "/queues/{qname}/tasks/retry",
    params(
        ("qname" = String, Path, description = "Queue name"),
        ("size" = Option<i64>, Query, description = "Page size (default 20)"),
        ("page" = Option<i64>, Query, description = "Page number, 1-based (default 1)")
    ),
    responses(
        (status = 200, description = "Retry tasks and queue stats", body = TaskListing),
        (status = 404, description = "Queue not found", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn list_retry_tasks(
    State(state): State<AppState>,
    Path(qname): Path<String>,
    page: PageSelection,
) -> ApiResult<Json<TaskListing>> {
    listing(&state, &qname, TaskState::Retry, page).await
}

#[utoipa::path(
    get,
    path = "/queues/{qname}/tasks/dead",
    params(
        ("qname" = String, Path, description = "Queue name"),
        ("size" = Option<i64>, Query, description = "Page size (default 20)"),
        ("page" = Option<i64>, Query, description = "Page number, 1-based (default 1)")
    ),
    responses(
        (status = 200, description = "Dead tasks and queue stats", body = TaskListing),
        (status = 404, description = "Queue not found", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn list_dead_tasks(
    State(state): State<AppState>,
    Path(qname): Path<String>,
    page: PageSelection,
) -> ApiResult<Json<TaskListing>> {
    listing(&state, &qname, TaskState::Dead, page).await
}

/// Ask a running task to stop.
/// The queue segment is part of the path only; cancellation is by task id.
#[utoipa::path(
    post,
    path = "/queues/{qname}/tasks/active/{task_id}/cancel",
    params(
        ("qname" = String, Path, description = "Queue name"),
        ("task_id" = String, Path, description = "Task id")
    ),
    responses(
        (status = 204, description = "Cancellation signal accepted"),
        (status = 404, description = "No active task with this id", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn cancel_active_task(
    State(state): State<AppState>,
    Path((_qname, task_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.inspector().cancel(&task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/queues/{qname}/tasks/{task_key}",
    params(
        ("qname" = String, Path, description = "Queue name"),
        ("task_key" = String, Path, description = "Task key, e.g. `d:<id>`")
    ),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 404, description = "Queue or task not found", body = ErrorResponse),
        (status = 409, description = "Task is active", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn delete_task(
    State(state): State<AppState>,
    Path((qname, task_key)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.inspector().delete_task(&qname, &task_key).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear(state: &AppState, qname: &str, task_state: TaskState) -> ApiResult<StatusCode> {
    state.inspector().clear_all(qname, task_state).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/queues/{qname}/tasks/scheduled",
    params(("qname" = String, Path, description = "Queue name")),
    responses(
        (status = 204, description = "All scheduled tasks deleted"),
        (status = 404, description = "Queue not found", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn clear_scheduled_tasks(
    State(state): State<AppState>,
    Path(qname): Path<String>,
) -> ApiResult<StatusCode> {
    clear(&state, &qname, TaskState::Scheduled).await
}

#[utoipa::path(
    delete,
    path = "/queues/{qname}/tasks/retry",
    params(("qname" = String, Path, description = "Queue name")),
    responses(
        (status = 204, description = "All retry tasks deleted"),
        (status = 404, description = "Queue not found", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn clear_retry_tasks(
    State(state): State<AppState>,
    Path(qname): Path<String>,
) -> ApiResult<StatusCode> {
    clear(&state, &qname, TaskState::Retry).await
}

#[utoipa::path(
    delete,
    path = "/queues/{qname}/tasks/dead",
    params(("qname" = String, Path, description = "Queue name")),
    responses(
        (status = 204, description = "All dead tasks deleted"),
        (status = 404, description = "Queue not found", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn clear_dead_tasks(
    State(state): State<AppState>,
    Path(qname): Path<String>,
) -> ApiResult<StatusCode> {
    clear(&state, &qname, TaskState::Dead).await
}

/// Batch delete request
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(deny_unknown_fields)]
pub struct BatchDeleteRequest {
    #[serde(default)]
    pub task_keys: Vec<String>,
}

async fn batch_delete(
    state: &AppState,
    qname: &str,
    req: BatchDeleteRequest,
) -> ApiResult<Json<BatchDeleteResult>> {
    let result = state
        .inspector()
        .batch_delete(qname, req.task_keys, state.batch_options())
        .await;
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/queues/{qname}/tasks/dead/batch_delete",
    params(("qname" = String, Path, description = "Queue name")),
    request_body = BatchDeleteRequest,
    responses(
        (status = 200, description = "Per-key outcome", body = BatchDeleteResult),
        (status = 400, description = "Malformed or oversized body", body = ErrorResponse)
    )
)]
pub async fn batch_delete_dead_tasks(
    State(state): State<AppState>,
    Path(qname): Path<String>,
    BoundedJson(req): BoundedJson<BatchDeleteRequest>,
) -> ApiResult<Json<BatchDeleteResult>> {
    batch_delete(&state, &qname, req).await
}

#[utoipa::path(
    post,
    path = "/queues/{qname}/tasks/scheduled/batch_delete",
    params(("qname" = String, Path, description = "Queue name")),
    request_body = BatchDeleteRequest,
    responses(
        (status = 200, description = "Per-key outcome", body = BatchDeleteResult),
        (status = 400, description = "Malformed or oversized body", body = ErrorResponse)
    )
)]
pub async fn batch_delete_scheduled_tasks(
    State(state): State<AppState>,
    Path(qname): Path<String>,
    BoundedJson(req): BoundedJson<BatchDeleteRequest>,
) -> ApiResult<Json<BatchDeleteResult>> {
    batch_delete(&state, &qname, req).await
}

#[utoipa::path(
    post,
    path = "/queues/{qname}/tasks/retry/batch_delete",
    params(("qname" = String, Path, description = "Queue name")),
    request_body = BatchDeleteRequest,
    responses(
        (status = 200, description = "Per-key outcome", body = BatchDeleteResult),
        (status = 400, description = "Malformed or oversized body", body = ErrorResponse)
    )
)]
pub async fn batch_delete_retry_tasks(
    State(state): State<AppState>,
    Path(qname): Path<String>,
    BoundedJson(req): BoundedJson<BatchDeleteRequest>,
) -> ApiResult<Json<BatchDeleteResult>> {
    batch_delete(&state, &qname, req).await
}

#[derive(OpenApi)]
#[openapi(
    info(title = "qscope", description = "Task queue inspection API"),
    paths(
        health,
        list_queues,
        get_queue,
        list_active_tasks,
        list_pending_tasks,
        list_scheduled_tasks,
        list_retry_tasks,
        list_dead_tasks,
        cancel_active_task,
        delete_task,
        clear_scheduled_tasks,
        clear_retry_tasks,
        clear_dead_tasks,
        batch_delete_dead_tasks,
        batch_delete_scheduled_tasks,
        batch_delete_retry_tasks,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse, ErrorBody,
            QueueIndex, QueueStatsView,
            TaskListing, TaskView, BaseTaskView,
            ActiveTaskView, PendingTaskView, ScheduledTaskView, RetryTaskView, DeadTaskView,
            BatchDeleteRequest, BatchDeleteResult,
        )
    )
)]
pub struct ApiDoc;

/// Serve the OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the API router
pub fn api_router(state: AppState) -> Router {
    Router::new()
        // Documentation
        .route("/api-docs/openapi.json", get(openapi_json))
        // Public endpoints
        .route("/health", get(health))
        // Queues
        .route("/queues", get(list_queues))
        .route("/queues/{qname}", get(get_queue))
        // Listings and bulk clears
        .route("/queues/{qname}/tasks/active", get(list_active_tasks))
        .route("/queues/{qname}/tasks/pending", get(list_pending_tasks))
        .route(
            "/queues/{qname}/tasks/scheduled",
            get(list_scheduled_tasks).delete(clear_scheduled_tasks),
        )
        .route(
            "/queues/{qname}/tasks/retry",
            get(list_retry_tasks).delete(clear_retry_tasks),
        )
        .route(
            "/queues/{qname}/tasks/dead",
            get(list_dead_tasks).delete(clear_dead_tasks),
        )
        // Single-task mutations
        .route(
            "/queues/{qname}/tasks/active/{task_id}/cancel",
            post(cancel_active_task),
        )
        .route("/queues/{qname}/tasks/{task_key}", delete(delete_task))
        // Batch mutations
        .route(
            "/queues/{qname}/tasks/dead/batch_delete",
            post(batch_delete_dead_tasks),
        )
        .route(
            "/queues/{qname}/tasks/scheduled/batch_delete",
            post(batch_delete_scheduled_tasks),
        )
        .route(
            "/queues/{qname}/tasks/retry/batch_delete",
            post(batch_delete_retry_tasks),
        )
        // State
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let paths = doc["paths"].as_object().unwrap();

        for path in [
            "/health",
            "/queues",
            "/queues/{qname}",
            "/queues/{qname}/tasks/dead",
            "/queues/{qname}/tasks/{task_key}",
            "/queues/{qname}/tasks/active/{task_id}/cancel",
            "/queues/{qname}/tasks/retry/batch_delete",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
        assert!(paths["/queues/{qname}/tasks/dead"]["delete"].is_object());
    }

    #[test]
    fn test_batch_request_defaults_to_no_keys() {
        let req: BatchDeleteRequest = serde_json::from_str("{}").unwrap();
        assert!(req.task_keys.is_empty());
        assert!(serde_json::from_str::<BatchDeleteRequest>(r#"{"keys":[]}"#).is_err());
    }
}
