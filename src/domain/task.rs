//! Task aggregate.
//!
//! All task mutations go through this wrapper: it validates the state
//! machine, bumps the optimistic-concurrency version, and hands back the
//! domain events the change produced. Persistence is the caller's concern.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::application::error::{AppError, Result};
use crate::domain::events::{self, DomainEvent};
use crate::models::task::{self, TaskStatus};
use crate::models::{StringSet, UuidSet};

pub struct TaskAggregate {
    pub task: task::Model,
    events: Vec<DomainEvent>,
}

impl TaskAggregate {
    pub fn new(task: task::Model) -> Self {
        Self {
            task,
            events: Vec::new(),
        }
    }

    /// Consume the aggregate, yielding the mutated row and recorded events.
    pub fn into_parts(self) -> (task::Model, Vec<DomainEvent>) {
        (self.task, self.events)
    }

    /// Whether the state machine permits `from -> to`. Admin-only edges
    /// (every `* -> CANCELLED`) require `is_admin`.
    pub fn transition_allowed(from: TaskStatus, to: TaskStatus, is_admin: bool) -> bool {
        use TaskStatus::*;
        match (from, to) {
            (_, Cancelled) => !matches!(from, Cancelled) && is_admin,
            (Todo, InProgress) | (Todo, Blocked) => true,
            (InProgress, InReview) | (InProgress, Blocked) => true,
            (InReview, InProgress) | (InReview, Done) => true,
            (Blocked, Todo) | (Blocked, InProgress) => true,
            _ => false,
        }
    }

    /// Validate and apply a status change, recording `TaskStatusChanged`.
    pub fn change_status(
        &mut self,
        new_status: TaskStatus,
        reason: Option<String>,
        is_admin: bool,
    ) -> Result<()> {
        let current = self.task.status;

        if !Self::transition_allowed(current, new_status, is_admin) {
            return Err(AppError::InvalidTransition(format!(
                "Cannot transition from {} to {}",
                current.as_str(),
                new_status.as_str()
            )));
        }

        if new_status == TaskStatus::InReview && self.task.assigned_to_user_id.is_none() {
            return Err(AppError::InvalidTransition(
                "Task must be assigned before moving to IN_REVIEW".to_string(),
            ));
        }

        if new_status == TaskStatus::Blocked
            && reason.as_deref().map(str::trim).unwrap_or("").is_empty()
        {
            return Err(AppError::InvalidTransition(
                "Blocked reason is required when status is BLOCKED".to_string(),
            ));
        }

        self.task.status = new_status;
        self.task.blocked_reason = if new_status == TaskStatus::Blocked {
            reason.clone()
        } else {
            None
        };
        self.touch();

        self.record(events::TASK_STATUS_CHANGED, json!({
            "from": current.as_str(),
            "to": new_status.as_str(),
            "reason": reason,
        }));
        Ok(())
    }

    /// Assign the task, recording `TaskAssigned`.
    pub fn assign_to(&mut self, user_id: Uuid, assigned_by: Uuid) {
        self.task.assigned_to_user_id = Some(user_id);
        self.touch();
        self.record(events::TASK_ASSIGNED, json!({
            "assigned_to": user_id,
            "assigned_by": assigned_by,
        }));
    }

    /// Apply a detail update, recording `TaskUpdated` with changed fields.
    #[allow(clippy::too_many_arguments)]
    pub fn update_details(
        &mut self,
        title: Option<String>,
        description: Option<String>,
        priority: Option<task::Priority>,
        due_date: Option<DateTime<Utc>>,
        estimated_hours: Option<f64>,
        actual_hours: Option<f64>,
        tags: Option<Vec<String>>,
        watchers: Option<Vec<Uuid>>,
    ) {
        let mut changed: Vec<&str> = Vec::new();

        if let Some(title) = title {
            self.task.title = title;
            changed.push("title");
        }
        if let Some(description) = description {
            self.task.description = Some(description);
            changed.push("description");
        }
        if let Some(priority) = priority {
            self.task.priority = priority;
            changed.push("priority");
        }
        if let Some(due_date) = due_date {
            self.task.due_date = Some(due_date);
            changed.push("due_date");
        }
        if let Some(estimated_hours) = estimated_hours {
            self.task.estimated_hours = Some(estimated_hours);
            changed.push("estimated_hours");
        }
        if let Some(actual_hours) = actual_hours {
            self.task.actual_hours = Some(actual_hours);
            changed.push("actual_hours");
        }
        if let Some(tags) = tags {
            self.task.tags = StringSet(tags);
            changed.push("tags");
        }
        if let Some(watchers) = watchers {
            self.task.watchers = UuidSet(watchers);
            changed.push("watchers");
        }

        self.touch();
        self.record(events::TASK_UPDATED, json!({ "changed": changed }));
    }

    /// Soft-delete the task, recording `TaskDeleted`. The row is preserved
    /// for audit.
    pub fn soft_delete(&mut self, deleted_by: Uuid) {
        self.task.is_deleted = true;
        self.touch();
        self.record(events::TASK_DELETED, json!({ "deleted_by": deleted_by }));
    }

    fn touch(&mut self) {
        self.task.version += 1;
        self.task.updated_at = Utc::now();
    }

    fn record(&mut self, event_type: &str, payload: serde_json::Value) {
        self.events.push(DomainEvent::new(
            event_type,
            self.task.id,
            self.task.tenant_id,
            payload,
        ));
    }
}
