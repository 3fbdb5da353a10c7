use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{RoleSet, StringSet};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Case-folded; unique per tenant.
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub roles: RoleSet,
    /// Per-user permission overrides on top of role defaults.
    pub permissions: StringSet,
    pub department_id: Option<Uuid>,
    pub mfa_enabled: bool,
    /// Present iff `mfa_enabled`; cleared on disable.
    #[serde(skip_serializing)]
    pub mfa_secret: Option<String>,
    /// Enrollment in progress: secret generated but not yet verified.
    #[serde(skip_serializing)]
    pub mfa_pending_secret: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub last_login_at: Option<DateTimeUtc>,
    pub last_password_change_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
    #[sea_orm(has_many = "super::refresh_token::Entity")]
    RefreshTokens,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::refresh_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RefreshTokens.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Role defaults merged with per-user overrides.
    pub fn effective_permissions(&self) -> Vec<String> {
        crate::domain::authorization::effective_permissions(&self.roles.0, &self.permissions.0)
    }
}
