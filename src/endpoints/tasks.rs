//! Task endpoints.

use axum::{
    extract::{Path, Query as QueryParams, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::application::error::Result;
use crate::application::response::{ApiResponse, Pagination};
use crate::application::state::AppState;
use crate::context::RequestContext;
use crate::handlers::task::{
    AddTaskComment, AssignTask, ChangeTaskStatus, CreateTask, DeleteTask, GetTask,
    GetTaskStatistics, ListTaskComments, ListTasks, UpdateTask,
};
use crate::mediator::Mediator;
use crate::models::task::{Priority, TaskStatus};

/// Task routes under `/api/v1/tasks`.
pub fn task_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route(
            "/{task_id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/{task_id}/assign", patch(assign_task))
        .route("/{task_id}/status", patch(change_status))
        .route(
            "/{task_id}/comments",
            post(add_comment).get(list_comments),
        )
        .route("/reports/statistics", get(statistics))
        .with_state(state)
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateTaskRequest {
    pub project_id: Uuid,
    pub department_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub assigned_to_user_id: Option<Uuid>,
    #[schema(value_type = Option<String>)]
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub tags: Option<Vec<String>>,
    pub watchers: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateTaskRequest {
    /// Version the client last read; stale writes are rejected.
    pub version: i32,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    #[schema(value_type = Option<String>)]
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub tags: Option<Vec<String>>,
    pub watchers: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AssignTaskRequest {
    pub assigned_to_user_id: Uuid,
    pub version: Option<i32>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ChangeStatusRequest {
    pub status: TaskStatus,
    pub reason: Option<String>,
    pub version: Option<i32>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AddCommentRequest {
    pub content: String,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct ListTasksParams {
    pub status: Option<TaskStatus>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

// ============================================================================
// Handlers
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/v1/tasks",
    tag = "Tasks",
    responses((status = 200, description = "Paginated tasks"))
)]
async fn list_tasks(
    ctx: RequestContext,
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListTasksParams>,
) -> Result<Response> {
    let list = Mediator::new(state)
        .query(
            &ctx,
            ListTasks {
                status: params.status,
                page: params.page,
                page_size: params.page_size,
            },
        )
        .await?;

    let pagination = Pagination {
        page: list.page,
        page_size: list.page_size,
        total: list.total,
    };
    Ok(Json(ApiResponse::paginated(list.items, pagination)).into_response())
}

#[utoipa::path(
    post,
    path = "/api/v1/tasks",
    tag = "Tasks",
    request_body = CreateTaskRequest,
    responses((status = 201, description = "Task created"))
)]
async fn create_task(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Response> {
    let task = Mediator::new(state)
        .dispatch(
            &ctx,
            CreateTask {
                project_id: request.project_id,
                department_id: request.department_id,
                title: request.title,
                description: request.description,
                priority: request.priority,
                assigned_to_user_id: request.assigned_to_user_id,
                due_date: request.due_date,
                estimated_hours: request.estimated_hours,
                tags: request.tags,
                watchers: request.watchers,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(task))).into_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/tasks/{task_id}",
    tag = "Tasks",
    params(("task_id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task"),
        (status = 404, description = "Not found in this tenant")
    )
)]
async fn get_task(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Response> {
    let task = Mediator::new(state).query(&ctx, GetTask { task_id }).await?;
    Ok(Json(ApiResponse::new(task)).into_response())
}

#[utoipa::path(
    put,
    path = "/api/v1/tasks/{task_id}",
    tag = "Tasks",
    request_body = UpdateTaskRequest,
    params(("task_id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task updated"),
        (status = 409, description = "Concurrent modification")
    )
)]
async fn update_task(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(request): Json<UpdateTaskRequest>,
) -> Result<Response> {
    let task = Mediator::new(state)
        .dispatch(
            &ctx,
            UpdateTask {
                task_id,
                version: request.version,
                title: request.title,
                description: request.description,
                priority: request.priority,
                due_date: request.due_date,
                estimated_hours: request.estimated_hours,
                actual_hours: request.actual_hours,
                tags: request.tags,
                watchers: request.watchers,
            },
        )
        .await?;

    Ok(Json(ApiResponse::new(task)).into_response())
}

#[utoipa::path(
    delete,
    path = "/api/v1/tasks/{task_id}",
    tag = "Tasks",
    params(("task_id" = Uuid, Path, description = "Task id")),
    responses((status = 204, description = "Task soft-deleted"))
)]
async fn delete_task(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<StatusCode> {
    Mediator::new(state)
        .dispatch(&ctx, DeleteTask { task_id })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    patch,
    path = "/api/v1/tasks/{task_id}/assign",
    tag = "Tasks",
    request_body = AssignTaskRequest,
    params(("task_id" = Uuid, Path, description = "Task id")),
    responses((status = 200, description = "Task assigned"))
)]
async fn assign_task(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(request): Json<AssignTaskRequest>,
) -> Result<Response> {
    let task = Mediator::new(state)
        .dispatch(
            &ctx,
            AssignTask {
                task_id,
                assigned_to_user_id: request.assigned_to_user_id,
                version: request.version,
            },
        )
        .await?;

    Ok(Json(ApiResponse::new(task)).into_response())
}

#[utoipa::path(
    patch,
    path = "/api/v1/tasks/{task_id}/status",
    tag = "Tasks",
    request_body = ChangeStatusRequest,
    params(("task_id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Status changed"),
        (status = 409, description = "Transition rejected")
    )
)]
async fn change_status(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(request): Json<ChangeStatusRequest>,
) -> Result<Response> {
    let task = Mediator::new(state)
        .dispatch(
            &ctx,
            ChangeTaskStatus {
                task_id,
                status: request.status,
                reason: request.reason,
                version: request.version,
            },
        )
        .await?;

    Ok(Json(ApiResponse::new(task)).into_response())
}

#[utoipa::path(
    post,
    path = "/api/v1/tasks/{task_id}/comments",
    tag = "Tasks",
    request_body = AddCommentRequest,
    params(("task_id" = Uuid, Path, description = "Task id")),
    responses((status = 201, description = "Comment added"))
)]
async fn add_comment(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(request): Json<AddCommentRequest>,
) -> Result<Response> {
    let comment = Mediator::new(state)
        .dispatch(
            &ctx,
            AddTaskComment {
                task_id,
                content: request.content,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(comment))).into_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/tasks/{task_id}/comments",
    tag = "Tasks",
    params(("task_id" = Uuid, Path, description = "Task id")),
    responses((status = 200, description = "Comments, oldest first"))
)]
async fn list_comments(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Response> {
    let comments = Mediator::new(state)
        .query(&ctx, ListTaskComments { task_id })
        .await?;
    Ok(Json(ApiResponse::new(comments)).into_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/tasks/reports/statistics",
    tag = "Tasks",
    responses((status = 200, description = "Tenant task statistics"))
)]
async fn statistics(ctx: RequestContext, State(state): State<AppState>) -> Result<Response> {
    let stats = Mediator::new(state).query(&ctx, GetTaskStatistics).await?;
    Ok(Json(ApiResponse::new(stats)).into_response())
}
