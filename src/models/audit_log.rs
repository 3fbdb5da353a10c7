use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only audit trail. Rows are tenant-scoped and never served across
/// tenants.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, utoipa::ToSchema)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<String>,
    /// Structured before/after payload.
    #[schema(value_type = Object)]
    pub changes: Json,
    pub correlation_id: Option<String>,
    #[schema(value_type = String)]
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditAction {
    UserRegistered,
    Login,
    LoginFailed,
    Logout,
    TokenRefresh,
    TokenReplayDetected,
    MfaEnabled,
    MfaDisabled,
    PasswordChanged,
    TenantCreated,
    TenantSettingsUpdated,
    TaskCreated,
    TaskUpdated,
    TaskAssigned,
    TaskStatusChanged,
    TaskDeleted,
    TaskCommentAdded,
    CrossTenantAccessDenied,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::UserRegistered => write!(f, "user_registered"),
            AuditAction::Login => write!(f, "login"),
            AuditAction::LoginFailed => write!(f, "login_failed"),
            AuditAction::Logout => write!(f, "logout"),
            AuditAction::TokenRefresh => write!(f, "token_refresh"),
            AuditAction::TokenReplayDetected => write!(f, "token_replay_detected"),
            AuditAction::MfaEnabled => write!(f, "mfa_enabled"),
            AuditAction::MfaDisabled => write!(f, "mfa_disabled"),
            AuditAction::PasswordChanged => write!(f, "password_changed"),
            AuditAction::TenantCreated => write!(f, "tenant_created"),
            AuditAction::TenantSettingsUpdated => write!(f, "tenant_settings_updated"),
            AuditAction::TaskCreated => write!(f, "task_created"),
            AuditAction::TaskUpdated => write!(f, "task_updated"),
            AuditAction::TaskAssigned => write!(f, "task_assigned"),
            AuditAction::TaskStatusChanged => write!(f, "task_status_changed"),
            AuditAction::TaskDeleted => write!(f, "task_deleted"),
            AuditAction::TaskCommentAdded => write!(f, "task_comment_added"),
            AuditAction::CrossTenantAccessDenied => write!(f, "cross_tenant_access_denied"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TargetType {
    User,
    Tenant,
    Task,
    Comment,
    RefreshTokenFamily,
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetType::User => write!(f, "user"),
            TargetType::Tenant => write!(f, "tenant"),
            TargetType::Task => write!(f, "task"),
            TargetType::Comment => write!(f, "comment"),
            TargetType::RefreshTokenFamily => write!(f, "refresh_token_family"),
        }
    }
}
