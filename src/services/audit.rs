//! Tenant-scoped audit trail.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::error::Result;
use crate::context;
use crate::models::audit_log::{self, AuditAction, TargetType};

/// Audit writer. Rows always carry the tenant id and are only ever read
/// back through tenant-filtered queries.
#[derive(Clone, Default)]
pub struct AuditService;

impl AuditService {
    pub fn new() -> Self {
        Self
    }

    /// Append an audit entry. `db` may be a transaction so the entry
    /// commits atomically with the change it records.
    #[allow(clippy::too_many_arguments)]
    pub async fn log<C: ConnectionTrait>(
        &self,
        db: &C,
        tenant_id: Uuid,
        actor_user_id: Option<Uuid>,
        action: AuditAction,
        target_type: TargetType,
        target_id: Option<String>,
        changes: serde_json::Value,
    ) -> Result<()> {
        let entry = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            actor_user_id: Set(actor_user_id),
            action: Set(action.to_string()),
            target_type: Set(target_type.to_string()),
            target_id: Set(target_id),
            changes: Set(changes),
            correlation_id: Set(context::current_correlation_id()),
            created_at: Set(chrono::Utc::now()),
        };
        entry.insert(db).await?;
        Ok(())
    }

    /// Record a cross-tenant access attempt. These are WARN-logged and
    /// counted; the caller still answers `NOT_FOUND`.
    pub async fn log_cross_tenant_attempt<C: ConnectionTrait>(
        &self,
        db: &C,
        actor_tenant_id: Uuid,
        actor_user_id: Option<Uuid>,
        target_type: TargetType,
        target_id: String,
    ) {
        tracing::warn!(
            monotonic_counter.cross_tenant_denied = 1,
            tenant_id = %actor_tenant_id,
            actor = ?actor_user_id,
            target = %target_id,
            "cross-tenant access attempt denied"
        );
        if let Err(e) = self
            .log(
                db,
                actor_tenant_id,
                actor_user_id,
                AuditAction::CrossTenantAccessDenied,
                target_type,
                Some(target_id),
                serde_json::json!({}),
            )
            .await
        {
            tracing::warn!(error = %e, "failed to persist cross-tenant audit entry");
        }
    }
}

/// Query parameters for the tenant-scoped audit listing.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct AuditLogQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub actor_user_id: Option<Uuid>,
    pub action: Option<String>,
    pub target_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct AuditLogPage {
    pub entries: Vec<audit_log::Model>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

/// Fetch audit entries for one tenant, newest first.
pub async fn get_audit_logs<C: ConnectionTrait>(
    db: &C,
    tenant_id: Uuid,
    query: AuditLogQuery,
) -> Result<AuditLogPage> {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(50).clamp(1, 100);
    let offset = (page - 1) * page_size;

    let mut select = audit_log::Entity::find().filter(audit_log::Column::TenantId.eq(tenant_id));

    if let Some(actor) = query.actor_user_id {
        select = select.filter(audit_log::Column::ActorUserId.eq(actor));
    }
    if let Some(action) = &query.action {
        select = select.filter(audit_log::Column::Action.eq(action.clone()));
    }
    if let Some(target_type) = &query.target_type {
        select = select.filter(audit_log::Column::TargetType.eq(target_type.clone()));
    }

    let total = select.clone().count(db).await?;
    let entries = select
        .order_by_desc(audit_log::Column::CreatedAt)
        .offset(offset)
        .limit(page_size)
        .all(db)
        .await?;

    Ok(AuditLogPage {
        entries,
        total,
        page,
        page_size,
    })
}
