//! Authentication endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::application::error::{AppError, Result};
use crate::application::response::ApiResponse;
use crate::application::state::AppState;
use crate::context::{self, RequestContext};
use crate::handlers::auth::{
    DisableMfa, EnableMfa, GetCurrentUser, Login, Logout, RefreshResult, RefreshSession,
    RegisterUser, VerifyMfa,
};
use crate::mediator::Mediator;

/// Auth routes under `/api/v1/auth`.
pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/mfa/enable", post(enable_mfa))
        .route("/mfa/verify", post(verify_mfa))
        .route("/mfa/disable", post(disable_mfa))
        .route("/me", get(me))
        .with_state(state)
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub tenant_id: Uuid,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub mfa_code: Option<String>,
    pub device_fingerprint: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MfaCodeRequest {
    pub code: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Register a new user in the tenant named by the payload.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created"),
        (status = 400, description = "Validation failure"),
        (status = 409, description = "Email already registered")
    )
)]
async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response> {
    let ctx = RequestContext::new(
        request.tenant_id,
        context::current_correlation_id().unwrap_or_default(),
    );

    let user = Mediator::new(state)
        .dispatch(
            &ctx,
            RegisterUser {
                tenant_id: request.tenant_id,
                email: request.email,
                username: request.username,
                password: request.password,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(user))).into_response())
}

/// Authenticate and receive an access/refresh token pair.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued"),
        (status = 401, description = "Invalid credentials"),
        (status = 423, description = "MFA code required")
    )
)]
async fn login(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response> {
    let tokens = Mediator::new(state)
        .dispatch(
            &ctx,
            Login {
                email: request.email,
                password: request.password,
                mfa_code: request.mfa_code,
                device_fingerprint: request.device_fingerprint,
            },
        )
        .await?;

    Ok(Json(ApiResponse::new(tokens)).into_response())
}

/// Rotate a refresh token. Replay revokes the whole token family.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair issued"),
        (status = 401, description = "Token invalid, expired, or replayed")
    )
)]
async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Response> {
    let ctx = RequestContext::anonymous(context::current_correlation_id().unwrap_or_default());

    let outcome = Mediator::new(state)
        .dispatch(
            &ctx,
            RefreshSession {
                refresh_token: request.refresh_token,
            },
        )
        .await?;

    match outcome {
        RefreshResult::Issued(tokens) => Ok(Json(ApiResponse::new(*tokens)).into_response()),
        RefreshResult::Rejected => Err(AppError::invalid_token("Invalid refresh token")),
    }
}

/// Revoke the presented refresh token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    request_body = LogoutRequest,
    responses((status = 204, description = "Logged out"))
)]
async fn logout(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(request): Json<LogoutRequest>,
) -> Result<StatusCode> {
    Mediator::new(state)
        .dispatch(
            &ctx,
            Logout {
                refresh_token: request.refresh_token,
            },
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Begin MFA enrollment: returns the secret and provisioning URI.
#[utoipa::path(
    post,
    path = "/api/v1/auth/mfa/enable",
    tag = "Auth",
    responses((status = 200, description = "Enrollment started"))
)]
async fn enable_mfa(ctx: RequestContext, State(state): State<AppState>) -> Result<Response> {
    let enrollment = Mediator::new(state).dispatch(&ctx, EnableMfa).await?;
    Ok(Json(ApiResponse::new(enrollment)).into_response())
}

/// Confirm MFA enrollment with a TOTP code.
#[utoipa::path(
    post,
    path = "/api/v1/auth/mfa/verify",
    tag = "Auth",
    request_body = MfaCodeRequest,
    responses(
        (status = 200, description = "MFA enabled"),
        (status = 400, description = "Invalid code")
    )
)]
async fn verify_mfa(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(request): Json<MfaCodeRequest>,
) -> Result<Response> {
    Mediator::new(state)
        .dispatch(&ctx, VerifyMfa { code: request.code })
        .await?;
    Ok(Json(ApiResponse::new(serde_json::json!({ "enabled": true }))).into_response())
}

/// Turn MFA off again; requires a valid TOTP code.
#[utoipa::path(
    post,
    path = "/api/v1/auth/mfa/disable",
    tag = "Auth",
    request_body = MfaCodeRequest,
    responses((status = 200, description = "MFA disabled"))
)]
async fn disable_mfa(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(request): Json<MfaCodeRequest>,
) -> Result<Response> {
    Mediator::new(state)
        .dispatch(&ctx, DisableMfa { code: request.code })
        .await?;
    Ok(Json(ApiResponse::new(serde_json::json!({ "enabled": false }))).into_response())
}

/// Profile of the authenticated caller.
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user"))
)]
async fn me(ctx: RequestContext, State(state): State<AppState>) -> Result<Response> {
    let user = Mediator::new(state).query(&ctx, GetCurrentUser).await?;
    Ok(Json(ApiResponse::new(user)).into_response())
}
