//! Tenant administration endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{patch, post},
    Json, Router,
};
use serde::Deserialize;

use crate::application::error::Result;
use crate::application::response::ApiResponse;
use crate::application::state::AppState;
use crate::context::RequestContext;
use crate::handlers::tenant::{CreateTenant, UpdateTenantSettings};
use crate::mediator::Mediator;
use crate::models::tenant::SubscriptionPlan;

/// Tenant routes under `/api/v1/tenants`.
pub fn tenant_routes(state: AppState) -> Router {
    Router::new()
        .route("/", post(create_tenant))
        .route("/settings", patch(update_settings))
        .with_state(state)
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateTenantRequest {
    pub name: String,
    pub subdomain: String,
    pub subscription_plan: Option<SubscriptionPlan>,
    pub max_users: Option<i32>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateTenantSettingsRequest {
    pub settings: Option<serde_json::Value>,
    pub subscription_plan: Option<SubscriptionPlan>,
    pub max_users: Option<i32>,
    pub is_active: Option<bool>,
}

/// Provision a tenant. System administrators only.
#[utoipa::path(
    post,
    path = "/api/v1/tenants",
    tag = "Tenants",
    request_body = CreateTenantRequest,
    responses(
        (status = 201, description = "Tenant created"),
        (status = 409, description = "Subdomain taken")
    )
)]
async fn create_tenant(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(request): Json<CreateTenantRequest>,
) -> Result<Response> {
    let tenant = Mediator::new(state)
        .dispatch(
            &ctx,
            CreateTenant {
                name: request.name,
                subdomain: request.subdomain,
                subscription_plan: request.subscription_plan,
                max_users: request.max_users,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(tenant))).into_response())
}

/// Update the calling tenant's settings and plan limits.
#[utoipa::path(
    patch,
    path = "/api/v1/tenants/settings",
    tag = "Tenants",
    request_body = UpdateTenantSettingsRequest,
    responses((status = 200, description = "Settings updated"))
)]
async fn update_settings(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(request): Json<UpdateTenantSettingsRequest>,
) -> Result<Response> {
    let tenant = Mediator::new(state)
        .dispatch(
            &ctx,
            UpdateTenantSettings {
                settings: request.settings,
                subscription_plan: request.subscription_plan,
                max_users: request.max_users,
                is_active: request.is_active,
            },
        )
        .await?;

    Ok(Json(ApiResponse::new(tenant)).into_response())
}
