//! Tenant administration commands.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::error::{AppError, Result};
use crate::application::state::AppState;
use crate::context::RequestContext;
use crate::domain::authorization::{self, Role};
use crate::domain::events::{self, DomainEvent};
use crate::mediator::{Command, Query, UnitOfWork};
use crate::models::prelude::*;
use crate::models::tenant::{is_valid_subdomain, SubscriptionPlan};
use crate::services::audit::{self, AuditLogPage, AuditLogQuery};

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct TenantResponse {
    pub id: Uuid,
    pub name: String,
    pub subdomain: String,
    pub subscription_plan: SubscriptionPlan,
    pub max_users: i32,
    pub is_active: bool,
    #[schema(value_type = Object)]
    pub settings: serde_json::Value,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl From<tenant::Model> for TenantResponse {
    fn from(t: tenant::Model) -> Self {
        Self {
            id: t.id,
            name: t.name,
            subdomain: t.subdomain,
            subscription_plan: t.subscription_plan,
            max_users: t.max_users,
            is_active: t.is_active,
            settings: t.settings,
            created_at: t.created_at,
        }
    }
}

// ==========================================================================
// CreateTenant
// ==========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub subdomain: String,
    pub subscription_plan: Option<SubscriptionPlan>,
    pub max_users: Option<i32>,
}

#[async_trait]
impl Command for CreateTenant {
    type Output = TenantResponse;

    const NAME: &'static str = "CreateTenant";

    fn required_roles(&self) -> &'static [Role] {
        &[Role::SystemAdmin]
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("Tenant name is required"));
        }
        if !is_valid_subdomain(&self.subdomain) {
            return Err(AppError::validation(
                "Subdomain must be lowercase ASCII and not reserved",
            ));
        }
        if self.max_users.is_some_and(|n| n < 1) {
            return Err(AppError::validation("max_users must be positive"));
        }
        Ok(())
    }

    async fn execute(
        self,
        ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let db = uow.conn();

        let taken = Tenant::find()
            .filter(tenant::Column::Subdomain.eq(&self.subdomain))
            .one(db)
            .await?
            .is_some();
        if taken {
            return Err(AppError::conflict("Subdomain is already in use"));
        }

        let now = Utc::now();
        let created = tenant::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(self.name.trim().to_string()),
            subdomain: Set(self.subdomain.clone()),
            subscription_plan: Set(self.subscription_plan.unwrap_or(SubscriptionPlan::Basic)),
            max_users: Set(self.max_users.unwrap_or(10)),
            is_active: Set(true),
            settings: Set(serde_json::json!({})),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        uow.record(DomainEvent::new(
            events::TENANT_CREATED,
            created.id,
            created.id,
            serde_json::json!({
                "name": created.name,
                "subdomain": created.subdomain,
                "actor_user_id": ctx.user_id.map(|u| u.to_string()),
            }),
        ));

        tracing::info!(tenant_id = %created.id, subdomain = %created.subdomain, "tenant created");
        Ok(TenantResponse::from(created))
    }
}

// ==========================================================================
// UpdateTenantSettings
// ==========================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateTenantSettings {
    pub settings: Option<serde_json::Value>,
    pub subscription_plan: Option<SubscriptionPlan>,
    pub max_users: Option<i32>,
    pub is_active: Option<bool>,
}

#[async_trait]
impl Command for UpdateTenantSettings {
    type Output = TenantResponse;

    const NAME: &'static str = "UpdateTenantSettings";

    fn required_roles(&self) -> &'static [Role] {
        &[Role::TenantAdmin, Role::SystemAdmin]
    }

    fn required_permission(&self) -> Option<&'static str> {
        Some(authorization::TENANT_CONFIGURE)
    }

    fn validate(&self) -> Result<()> {
        if self.max_users.is_some_and(|n| n < 1) {
            return Err(AppError::validation("max_users must be positive"));
        }
        Ok(())
    }

    async fn execute(
        self,
        ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let db = uow.conn();

        let tenant = Tenant::find_by_id(ctx.tenant_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::not_found("Tenant not found"))?;

        let tenant_id = tenant.id;
        let mut changed: Vec<&str> = Vec::new();
        let mut active = tenant.into_active_model();

        if let Some(settings) = self.settings {
            active.settings = Set(settings);
            changed.push("settings");
        }
        if let Some(plan) = self.subscription_plan {
            active.subscription_plan = Set(plan);
            changed.push("subscription_plan");
        }
        if let Some(max_users) = self.max_users {
            active.max_users = Set(max_users);
            changed.push("max_users");
        }
        if let Some(is_active) = self.is_active {
            active.is_active = Set(is_active);
            changed.push("is_active");
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;

        uow.record(DomainEvent::new(
            events::TENANT_SETTINGS_UPDATED,
            tenant_id,
            tenant_id,
            serde_json::json!({
                "changed": changed,
                "actor_user_id": ctx.user_id.map(|u| u.to_string()),
            }),
        ));

        Ok(TenantResponse::from(updated))
    }
}

// ==========================================================================
// Queries
// ==========================================================================

/// Tenant-scoped audit trail, admins only.
pub struct ListAuditLogs {
    pub query: AuditLogQuery,
}

#[async_trait]
impl Query for ListAuditLogs {
    type Output = AuditLogPage;

    const NAME: &'static str = "ListAuditLogs";

    fn required_roles(&self) -> &'static [Role] {
        &[Role::TenantAdmin, Role::SystemAdmin]
    }

    async fn fetch(self, ctx: &RequestContext, state: &AppState) -> Result<Self::Output> {
        audit::get_audit_logs(&state.db, ctx.tenant_id, self.query).await
    }
}
