//! Domain events.
//!
//! Events are recorded in memory while a command executes and only become
//! observable once the owning transaction commits them into the outbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Canonical event types.
pub const USER_REGISTERED: &str = "UserRegistered";
pub const USER_LOGGED_IN: &str = "UserLoggedIn";
pub const PASSWORD_CHANGED: &str = "PasswordChanged";
pub const MFA_ENABLED: &str = "MFAEnabled";
pub const TENANT_CREATED: &str = "TenantCreated";
pub const TENANT_SETTINGS_UPDATED: &str = "TenantSettingsUpdated";
pub const TASK_CREATED: &str = "TaskCreated";
pub const TASK_UPDATED: &str = "TaskUpdated";
pub const TASK_ASSIGNED: &str = "TaskAssigned";
pub const TASK_STATUS_CHANGED: &str = "TaskStatusChanged";
pub const TASK_DELETED: &str = "TaskDeleted";
pub const TASK_COMMENT_ADDED: &str = "TaskCommentAdded";
/// Raised when refresh-token replay trips family revocation.
pub const SECURITY_ALERT: &str = "SecurityAlert";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub tenant_id: Uuid,
    pub payload: serde_json::Value,
    /// Schema version of the payload, per event type.
    pub version: i32,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(
        event_type: &str,
        aggregate_id: Uuid,
        tenant_id: Uuid,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            aggregate_id,
            tenant_id,
            payload,
            version: 1,
            occurred_at: Utc::now(),
        }
    }
}
