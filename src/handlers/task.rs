//! Task commands and queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::config::CONFIG;
use crate::application::error::{AppError, Result};
use crate::application::state::AppState;
use crate::context::RequestContext;
use crate::domain::authorization;
use crate::domain::events::{self, DomainEvent};
use crate::domain::task::TaskAggregate;
use crate::mediator::{Command, Query, UnitOfWork};
use crate::models::audit_log::TargetType;
use crate::models::prelude::*;
use crate::models::task::{Priority, TaskStatus};
use crate::models::{StringSet, UuidSet};
use crate::services::cache::CacheService;

const MAX_TITLE_LEN: usize = 500;
const MAX_COMMENT_LEN: usize = 10_000;

// ==========================================================================
// DTOs
// ==========================================================================

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TaskResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub department_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assigned_to_user_id: Option<Uuid>,
    pub created_by_user_id: Uuid,
    pub watchers: Vec<Uuid>,
    pub tags: Vec<String>,
    #[schema(value_type = Option<String>)]
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub blocked_reason: Option<String>,
    pub version: i32,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl From<task::Model> for TaskResponse {
    fn from(task: task::Model) -> Self {
        Self {
            id: task.id,
            tenant_id: task.tenant_id,
            project_id: task.project_id,
            department_id: task.department_id,
            title: task.title,
            description: task.description,
            status: task.status,
            priority: task.priority,
            assigned_to_user_id: task.assigned_to_user_id,
            created_by_user_id: task.created_by_user_id,
            watchers: task.watchers.0,
            tags: task.tags.0,
            due_date: task.due_date,
            estimated_hours: task.estimated_hours,
            actual_hours: task.actual_hours,
            blocked_reason: task.blocked_reason,
            version: task.version,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TaskListResponse {
    pub items: Vec<TaskResponse>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CommentResponse {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl From<comment::Model> for CommentResponse {
    fn from(c: comment::Model) -> Self {
        Self {
            id: c.id,
            task_id: c.task_id,
            user_id: c.user_id,
            content: c.content,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TaskStatisticsResponse {
    pub total_tasks: u64,
    pub tasks_by_status: std::collections::BTreeMap<String, u64>,
    pub tasks_by_priority: std::collections::BTreeMap<String, u64>,
    pub overdue_tasks: u64,
}

// ==========================================================================
// Repository helpers
// ==========================================================================

fn live_tasks(tenant_id: Uuid) -> sea_orm::Select<task::Entity> {
    Task::find()
        .filter(task::Column::TenantId.eq(tenant_id))
        .filter(task::Column::IsDeleted.eq(false))
}

/// Load a task inside the tenant scope or answer `NOT_FOUND`. When the id
/// exists under another tenant the attempt is WARN-logged and audited, but
/// the response stays `NOT_FOUND` so the row's existence never leaks.
async fn load_task_or_not_found<C: ConnectionTrait>(
    db: &C,
    ctx: &RequestContext,
    state: &AppState,
    task_id: Uuid,
    for_update: bool,
) -> Result<task::Model> {
    let mut select = live_tasks(ctx.tenant_id).filter(task::Column::Id.eq(task_id));
    if for_update {
        select = select.lock_exclusive();
    }

    if let Some(task) = select.one(db).await? {
        return Ok(task);
    }

    // A same-tenant row that missed above is merely soft-deleted; only a
    // row under a different tenant marks a cross-tenant attempt.
    let exists_elsewhere = Task::find()
        .filter(task::Column::Id.eq(task_id))
        .filter(task::Column::TenantId.ne(ctx.tenant_id))
        .select_only()
        .column(task::Column::Id)
        .into_tuple::<Uuid>()
        .one(db)
        .await?
        .is_some();
    if exists_elsewhere {
        // Written on the shared pool, not `db`: the surrounding command
        // transaction is about to roll back and must not take the audit
        // entry with it.
        state
            .audit
            .log_cross_tenant_attempt(
                &state.db,
                ctx.tenant_id,
                ctx.user_id,
                TargetType::Task,
                task_id.to_string(),
            )
            .await;
    }

    Err(AppError::not_found("Task not found"))
}

/// Resource gate, applied after the tenant-scoped load.
fn ensure_task_access(ctx: &RequestContext, task: &task::Model) -> Result<()> {
    let user_id = ctx.require_user()?;
    if authorization::can_access_task(
        user_id,
        &ctx.roles,
        &ctx.permissions,
        ctx.department_id,
        task.assigned_to_user_id,
        task.created_by_user_id,
        task.department_id,
    ) {
        Ok(())
    } else {
        Err(AppError::forbidden("Access to this task is denied"))
    }
}

/// Enforce optimistic concurrency when the client sent a version.
fn check_version(task: &task::Model, expected: Option<i32>) -> Result<()> {
    match expected {
        Some(v) if v != task.version => Err(AppError::conflict(format!(
            "Task was modified concurrently (expected version {v}, found {})",
            task.version
        ))),
        _ => Ok(()),
    }
}

async fn persist_aggregate<C: ConnectionTrait>(
    db: &C,
    aggregate: TaskAggregate,
    uow_events: &mut Vec<DomainEvent>,
) -> Result<task::Model> {
    let (model, events) = aggregate.into_parts();
    let updated = model.clone().into_active_model().reset_all().update(db).await?;
    uow_events.extend(events);
    Ok(updated)
}

// ==========================================================================
// CreateTask
// ==========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTask {
    pub project_id: Uuid,
    pub department_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub assigned_to_user_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub tags: Option<Vec<String>>,
    pub watchers: Option<Vec<Uuid>>,
}

#[async_trait]
impl Command for CreateTask {
    type Output = TaskResponse;

    const NAME: &'static str = "CreateTask";

    fn required_permission(&self) -> Option<&'static str> {
        Some(authorization::TASKS_CREATE)
    }

    fn validate(&self) -> Result<()> {
        let title = self.title.trim();
        if title.is_empty() || title.len() > MAX_TITLE_LEN {
            return Err(AppError::validation(format!(
                "Title must be between 1 and {MAX_TITLE_LEN} characters"
            )));
        }
        if self.estimated_hours.is_some_and(|h| h < 0.0) {
            return Err(AppError::validation("Estimated hours cannot be negative"));
        }
        Ok(())
    }

    async fn execute(
        self,
        ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let user_id = ctx.require_user()?;
        let db = uow.conn();
        let now = Utc::now();

        let task = task::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(ctx.tenant_id),
            project_id: Set(self.project_id),
            department_id: Set(self.department_id.or(ctx.department_id)),
            title: Set(self.title.trim().to_string()),
            description: Set(self.description),
            status: Set(TaskStatus::Todo),
            priority: Set(self.priority.unwrap_or(Priority::Medium)),
            assigned_to_user_id: Set(self.assigned_to_user_id),
            created_by_user_id: Set(user_id),
            watchers: Set(UuidSet(self.watchers.unwrap_or_default())),
            tags: Set(StringSet(self.tags.unwrap_or_default())),
            due_date: Set(self.due_date),
            estimated_hours: Set(self.estimated_hours),
            actual_hours: Set(None),
            blocked_reason: Set(None),
            version: Set(1),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        uow.record(DomainEvent::new(
            events::TASK_CREATED,
            task.id,
            task.tenant_id,
            serde_json::json!({
                "title": task.title,
                "project_id": task.project_id,
                "actor_user_id": user_id.to_string(),
            }),
        ));

        tracing::info!(task_id = %task.id, tenant_id = %task.tenant_id, "task created");
        Ok(TaskResponse::from(task))
    }
}

// ==========================================================================
// UpdateTask
// ==========================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateTask {
    pub task_id: Uuid,
    /// Version the client read; a mismatch is a `CONFLICT`.
    pub version: i32,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub tags: Option<Vec<String>>,
    pub watchers: Option<Vec<Uuid>>,
}

#[async_trait]
impl Command for UpdateTask {
    type Output = TaskResponse;

    const NAME: &'static str = "UpdateTask";

    fn required_permission(&self) -> Option<&'static str> {
        Some(authorization::TASKS_UPDATE)
    }

    fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            let title = title.trim();
            if title.is_empty() || title.len() > MAX_TITLE_LEN {
                return Err(AppError::validation(format!(
                    "Title must be between 1 and {MAX_TITLE_LEN} characters"
                )));
            }
        }
        Ok(())
    }

    async fn execute(
        self,
        ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let db = uow.conn();
        let task =
            load_task_or_not_found(db, ctx, uow.state, self.task_id, true).await?;
        ensure_task_access(ctx, &task)?;
        check_version(&task, Some(self.version))?;

        let mut aggregate = TaskAggregate::new(task);
        aggregate.update_details(
            self.title.map(|t| t.trim().to_string()),
            self.description,
            self.priority,
            self.due_date,
            self.estimated_hours,
            self.actual_hours,
            self.tags,
            self.watchers,
        );

        let mut recorded = Vec::new();
        let updated = persist_aggregate(db, aggregate, &mut recorded).await?;
        for event in recorded {
            uow.record(event);
        }

        Ok(TaskResponse::from(updated))
    }
}

// ==========================================================================
// AssignTask
// ==========================================================================

#[derive(Debug, Deserialize)]
pub struct AssignTask {
    pub task_id: Uuid,
    pub assigned_to_user_id: Uuid,
    pub version: Option<i32>,
}

#[async_trait]
impl Command for AssignTask {
    type Output = TaskResponse;

    const NAME: &'static str = "AssignTask";

    fn required_permission(&self) -> Option<&'static str> {
        Some(authorization::TASKS_ASSIGN)
    }

    async fn execute(
        self,
        ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let user_id = ctx.require_user()?;
        let db = uow.conn();

        let assignee = User::find()
            .filter(user::Column::TenantId.eq(ctx.tenant_id))
            .filter(user::Column::Id.eq(self.assigned_to_user_id))
            .filter(user::Column::IsActive.eq(true))
            .one(db)
            .await?;
        if assignee.is_none() {
            return Err(AppError::validation("Assignee not found in this tenant"));
        }

        let task =
            load_task_or_not_found(db, ctx, uow.state, self.task_id, true).await?;
        ensure_task_access(ctx, &task)?;
        check_version(&task, self.version)?;

        let mut aggregate = TaskAggregate::new(task);
        aggregate.assign_to(self.assigned_to_user_id, user_id);

        let mut recorded = Vec::new();
        let updated = persist_aggregate(db, aggregate, &mut recorded).await?;
        for event in recorded {
            uow.record(event);
        }

        Ok(TaskResponse::from(updated))
    }
}

// ==========================================================================
// ChangeTaskStatus
// ==========================================================================

#[derive(Debug, Deserialize)]
pub struct ChangeTaskStatus {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub reason: Option<String>,
    pub version: Option<i32>,
}

#[async_trait]
impl Command for ChangeTaskStatus {
    type Output = TaskResponse;

    const NAME: &'static str = "ChangeTaskStatus";

    fn required_permission(&self) -> Option<&'static str> {
        Some(authorization::TASKS_UPDATE)
    }

    async fn execute(
        self,
        ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let db = uow.conn();
        let task =
            load_task_or_not_found(db, ctx, uow.state, self.task_id, true).await?;
        ensure_task_access(ctx, &task)?;
        check_version(&task, self.version)?;

        let mut aggregate = TaskAggregate::new(task);
        aggregate.change_status(self.status, self.reason, ctx.is_admin())?;

        let mut recorded = Vec::new();
        let updated = persist_aggregate(db, aggregate, &mut recorded).await?;
        for event in recorded {
            uow.record(event);
        }

        Ok(TaskResponse::from(updated))
    }
}

// ==========================================================================
// DeleteTask
// ==========================================================================

#[derive(Debug, Deserialize)]
pub struct DeleteTask {
    pub task_id: Uuid,
}

#[async_trait]
impl Command for DeleteTask {
    type Output = ();

    const NAME: &'static str = "DeleteTask";

    fn required_permission(&self) -> Option<&'static str> {
        Some(authorization::TASKS_DELETE)
    }

    async fn execute(
        self,
        ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let user_id = ctx.require_user()?;
        let db = uow.conn();

        let task =
            load_task_or_not_found(db, ctx, uow.state, self.task_id, true).await?;
        ensure_task_access(ctx, &task)?;

        let mut aggregate = TaskAggregate::new(task);
        aggregate.soft_delete(user_id);

        let mut recorded = Vec::new();
        persist_aggregate(db, aggregate, &mut recorded).await?;
        for event in recorded {
            uow.record(event);
        }

        tracing::info!(task_id = %self.task_id, tenant_id = %ctx.tenant_id, "task soft-deleted");
        Ok(())
    }
}

// ==========================================================================
// AddTaskComment
// ==========================================================================

#[derive(Debug, Deserialize)]
pub struct AddTaskComment {
    pub task_id: Uuid,
    pub content: String,
}

#[async_trait]
impl Command for AddTaskComment {
    type Output = CommentResponse;

    const NAME: &'static str = "AddTaskComment";

    fn required_permission(&self) -> Option<&'static str> {
        Some(authorization::TASKS_READ)
    }

    fn validate(&self) -> Result<()> {
        let content = self.content.trim();
        if content.is_empty() || content.len() > MAX_COMMENT_LEN {
            return Err(AppError::validation(format!(
                "Comment must be between 1 and {MAX_COMMENT_LEN} characters"
            )));
        }
        Ok(())
    }

    async fn execute(
        self,
        ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let user_id = ctx.require_user()?;
        let db = uow.conn();

        let task =
            load_task_or_not_found(db, ctx, uow.state, self.task_id, false).await?;
        ensure_task_access(ctx, &task)?;

        let inserted = comment::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(ctx.tenant_id),
            task_id: Set(task.id),
            user_id: Set(user_id),
            content: Set(self.content.trim().to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await?;

        uow.record(DomainEvent::new(
            events::TASK_COMMENT_ADDED,
            task.id,
            ctx.tenant_id,
            serde_json::json!({
                "comment_id": inserted.id,
                "actor_user_id": user_id.to_string(),
            }),
        ));

        Ok(CommentResponse::from(inserted))
    }
}

// ==========================================================================
// Queries
// ==========================================================================

pub struct GetTask {
    pub task_id: Uuid,
}

#[async_trait]
impl Query for GetTask {
    type Output = TaskResponse;

    const NAME: &'static str = "GetTask";

    fn required_permission(&self) -> Option<&'static str> {
        Some(authorization::TASKS_READ)
    }

    async fn fetch(self, ctx: &RequestContext, state: &AppState) -> Result<Self::Output> {
        let task =
            load_task_or_not_found(&state.db, ctx, state, self.task_id, false).await?;
        ensure_task_access(ctx, &task)?;
        Ok(TaskResponse::from(task))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTasks {
    pub status: Option<TaskStatus>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[async_trait]
impl Query for ListTasks {
    type Output = TaskListResponse;

    const NAME: &'static str = "ListTasks";

    fn required_permission(&self) -> Option<&'static str> {
        Some(authorization::TASKS_READ)
    }

    async fn fetch(self, ctx: &RequestContext, state: &AppState) -> Result<Self::Output> {
        let user_id = ctx.require_user()?;
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self.page_size.unwrap_or(20).clamp(1, 100);

        let cache_key = CacheService::tenant_key(
            ctx.tenant_id,
            &format!(
                "tasks:list:{user_id}:{}:{page}:{page_size}",
                self.status.map(|s| s.as_str()).unwrap_or("all")
            ),
        );
        if let Some(hit) = state.cache.get(&cache_key).await {
            if let Ok(cached) = serde_json::from_str::<TaskListResponse>(&hit) {
                return Ok(cached);
            }
        }

        let mut select = live_tasks(ctx.tenant_id);
        // Admins see the whole tenant; everyone else sees what they created
        // or were assigned.
        if !ctx.is_admin() {
            select = select.filter(
                Condition::any()
                    .add(task::Column::AssignedToUserId.eq(user_id))
                    .add(task::Column::CreatedByUserId.eq(user_id)),
            );
        }
        if let Some(status) = self.status {
            select = select.filter(task::Column::Status.eq(status));
        }

        let total = select.clone().count(&state.db).await?;
        let items = select
            .order_by_desc(task::Column::CreatedAt)
            .offset((page - 1) * page_size)
            .limit(page_size)
            .all(&state.db)
            .await?
            .into_iter()
            .map(TaskResponse::from)
            .collect();

        let response = TaskListResponse {
            items,
            total,
            page,
            page_size,
        };

        if let Ok(serialized) = serde_json::to_string(&response) {
            state.cache.set(&cache_key, &serialized, 60).await;
        }
        Ok(response)
    }
}

pub struct ListTaskComments {
    pub task_id: Uuid,
}

#[async_trait]
impl Query for ListTaskComments {
    type Output = Vec<CommentResponse>;

    const NAME: &'static str = "ListTaskComments";

    fn required_permission(&self) -> Option<&'static str> {
        Some(authorization::TASKS_READ)
    }

    async fn fetch(self, ctx: &RequestContext, state: &AppState) -> Result<Self::Output> {
        let task =
            load_task_or_not_found(&state.db, ctx, state, self.task_id, false).await?;
        ensure_task_access(ctx, &task)?;

        let comments = Comment::find()
            .filter(comment::Column::TenantId.eq(ctx.tenant_id))
            .filter(comment::Column::TaskId.eq(task.id))
            .order_by_asc(comment::Column::CreatedAt)
            .all(&state.db)
            .await?;

        Ok(comments.into_iter().map(CommentResponse::from).collect())
    }
}

pub struct GetTaskStatistics;

#[async_trait]
impl Query for GetTaskStatistics {
    type Output = TaskStatisticsResponse;

    const NAME: &'static str = "GetTaskStatistics";

    fn required_permission(&self) -> Option<&'static str> {
        Some(authorization::REPORTS_VIEW)
    }

    async fn fetch(self, ctx: &RequestContext, state: &AppState) -> Result<Self::Output> {
        let cache_key = CacheService::tenant_key(ctx.tenant_id, "tasks:statistics");
        if let Some(hit) = state.cache.get(&cache_key).await {
            if let Ok(cached) = serde_json::from_str::<TaskStatisticsResponse>(&hit) {
                return Ok(cached);
            }
        }

        let total_tasks = live_tasks(ctx.tenant_id).count(&state.db).await?;

        let by_status: Vec<(TaskStatus, i64)> = live_tasks(ctx.tenant_id)
            .select_only()
            .column(task::Column::Status)
            .column_as(task::Column::Id.count(), "count")
            .group_by(task::Column::Status)
            .into_tuple()
            .all(&state.db)
            .await?;

        let by_priority: Vec<(Priority, i64)> = live_tasks(ctx.tenant_id)
            .select_only()
            .column(task::Column::Priority)
            .column_as(task::Column::Id.count(), "count")
            .group_by(task::Column::Priority)
            .into_tuple()
            .all(&state.db)
            .await?;

        let overdue_tasks = live_tasks(ctx.tenant_id)
            .filter(task::Column::DueDate.lt(Utc::now()))
            .filter(task::Column::Status.ne(TaskStatus::Done))
            .filter(task::Column::Status.ne(TaskStatus::Cancelled))
            .count(&state.db)
            .await?;

        let response = TaskStatisticsResponse {
            total_tasks,
            tasks_by_status: by_status
                .into_iter()
                .map(|(s, c)| (s.as_str().to_string(), c as u64))
                .collect(),
            tasks_by_priority: by_priority
                .into_iter()
                .map(|(p, c)| (format!("{p:?}").to_uppercase(), c as u64))
                .collect(),
            overdue_tasks,
        };

        if let Ok(serialized) = serde_json::to_string(&response) {
            state
                .cache
                .set(&cache_key, &serialized, CONFIG.cache.response_cache_ttl_secs)
                .await;
        }
        Ok(response)
    }
}
