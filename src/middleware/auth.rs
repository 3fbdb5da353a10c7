//! Authentication middleware.
//!
//! Validates the bearer access token on every route that is not in the
//! public set and fills the request context with the caller's identity,
//! roles, and effective permissions.

use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::context::RequestContext;
use crate::domain::authorization::Role;
use crate::middleware::tenant::bearer_token;
use crate::services::security;

/// Routes reachable without a bearer token. MFA management and logout
/// require authentication.
const PUBLIC_PATHS: &[&str] = &[
    "/",
    "/health",
    "/ready",
    "/live",
    "/api/v1/auth/register",
    "/api/v1/auth/login",
    "/api/v1/auth/refresh",
];

pub async fn require_auth(mut req: Request, next: Next) -> Result<Response, AppError> {
    if PUBLIC_PATHS.contains(&req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let token = bearer_token(&req)
        .ok_or_else(|| AppError::unauthenticated("Missing or invalid Authorization header"))?;

    let claims = security::decode_access_token(&token)?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::unauthenticated("Invalid token subject"))?;
    let claim_tenant = Uuid::parse_str(&claims.tenant_id)
        .map_err(|_| AppError::unauthenticated("Invalid tenant claim"))?;

    let mut ctx = req
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .ok_or_else(|| AppError::TenantMismatch("Missing tenant context".to_string()))?;

    // The resolver already demands agreement between signals; a token whose
    // tenant differs from the bound tenant never passes this point.
    if ctx.tenant_id != claim_tenant {
        return Err(AppError::TenantMismatch(
            "Token tenant does not match request tenant".to_string(),
        ));
    }

    ctx.user_id = Some(user_id);
    ctx.email = Some(claims.email.clone());
    ctx.roles = claims
        .roles
        .iter()
        .filter_map(|r| Role::parse(r))
        .collect();
    ctx.permissions = claims.permissions.clone();
    ctx.department_id = claims
        .department_id
        .as_deref()
        .and_then(|d| Uuid::parse_str(d).ok());

    tracing::debug!(user_id = %user_id, tenant_id = %ctx.tenant_id, "request authenticated");

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}
