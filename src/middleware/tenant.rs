//! Tenant resolution middleware.
//!
//! Binds the request to a tenant from the `X-Tenant-ID` header, the
//! subdomain, or the access-token claim (in that precedence), then seeds
//! the request context. Handlers that need a tenant extract the context;
//! public probes pass through untouched.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use http::header;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::state::AppState;
use crate::context::RequestContext;
use crate::middleware::request_log::CorrelationId;
use crate::models::tenant;
use crate::services::{security, tenants};

/// Plan limits the resolver observed, for the rate limiter.
#[derive(Clone, Debug, Default)]
pub struct TenantLimits {
    pub rate_limit_per_minute: Option<u64>,
}

impl TenantLimits {
    fn from_tenant(t: &tenant::Model) -> Self {
        Self {
            rate_limit_per_minute: t
                .settings
                .get("rate_limit_per_minute")
                .and_then(|v| v.as_u64()),
        }
    }
}

const PUBLIC_PATHS: &[&str] = &["/", "/health", "/ready", "/live"];

pub async fn resolve_tenant(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if PUBLIC_PATHS.contains(&req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let header_value = req
        .headers()
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    // The claim participates as a resolution signal here; signature and
    // expiry enforcement for protected routes happens in the auth layer.
    let claim_tenant: Option<Uuid> = bearer_token(&req)
        .and_then(|token| security::decode_access_token(&token).ok())
        .and_then(|claims| Uuid::parse_str(&claims.tenant_id).ok());

    let resolved = tenants::resolve(
        &state.db,
        &state.cache,
        header_value.as_deref(),
        host.as_deref(),
        claim_tenant,
    )
    .await?;

    if let Some(tenant) = resolved {
        let correlation_id = req
            .extensions()
            .get::<CorrelationId>()
            .map(|c| c.0.clone())
            .unwrap_or_default();

        req.extensions_mut()
            .insert(TenantLimits::from_tenant(&tenant));
        req.extensions_mut()
            .insert(RequestContext::new(tenant.id, correlation_id));

        tracing::debug!(tenant_id = %tenant.id, "tenant resolved");
    }

    Ok(next.run(req).await)
}

/// Extract the bearer token from the Authorization header.
pub fn bearer_token(req: &Request) -> Option<String> {
    let auth = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = auth.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
