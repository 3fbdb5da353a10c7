//! Audit trail endpoints.

use axum::{
    extract::{Query as QueryParams, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use crate::application::error::Result;
use crate::application::response::{ApiResponse, Pagination};
use crate::application::state::AppState;
use crate::context::RequestContext;
use crate::handlers::tenant::ListAuditLogs;
use crate::mediator::Mediator;
use crate::services::audit::AuditLogQuery;

/// Audit routes under `/api/v1/audit`.
pub fn audit_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_audit_logs))
        .with_state(state)
}

/// Tenant-scoped audit log, newest first. Admins only; entries from other
/// tenants are never visible.
#[utoipa::path(
    get,
    path = "/api/v1/audit",
    tag = "Audit",
    responses((status = 200, description = "Audit entries"))
)]
async fn list_audit_logs(
    ctx: RequestContext,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<AuditLogQuery>,
) -> Result<Response> {
    let page = Mediator::new(state)
        .query(&ctx, ListAuditLogs { query })
        .await?;

    let pagination = Pagination {
        page: page.page,
        page_size: page.page_size,
        total: page.total,
    };
    Ok(Json(ApiResponse::paginated(page.entries, pagination)).into_response())
}
