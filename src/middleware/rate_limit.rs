//! Per-tenant rate limiting.
//!
//! Redis `INCR` on a fixed one-minute window keyed
//! `rl:{tenant}:{route}:{user_or_ip}`. A missing or slow backend never
//! blocks traffic: the limiter fails open.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::application::config::CONFIG;
use crate::application::error::AppError;
use crate::application::state::AppState;
use crate::context::RequestContext;
use crate::middleware::tenant::TenantLimits;

pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !CONFIG.rate_limit.enabled {
        return Ok(next.run(req).await);
    }

    // Public traffic (no tenant binding) is not rate limited here.
    let Some(ctx) = req.extensions().get::<RequestContext>() else {
        return Ok(next.run(req).await);
    };

    let quota = req
        .extensions()
        .get::<TenantLimits>()
        .and_then(|l| l.rate_limit_per_minute)
        .unwrap_or(CONFIG.rate_limit.per_minute);

    let subject = match ctx.user_id {
        Some(user_id) => user_id.to_string(),
        None => client_ip(&req).unwrap_or_else(|| "anonymous".to_string()),
    };

    let minute = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() / 60)
        .unwrap_or(0);
    let key = format!(
        "rl:{}:{}:{}:{}",
        ctx.tenant_id,
        req.uri().path(),
        subject,
        minute
    );

    match state.cache.incr(&key, 60).await {
        Some(count) if count > quota => {
            tracing::warn!(
                tenant_id = %ctx.tenant_id,
                subject,
                count,
                quota,
                "rate limit exceeded"
            );
            Err(AppError::RateLimited("Rate limit exceeded".to_string()))
        }
        Some(_) => Ok(next.run(req).await),
        None => Ok(next.run(req).await),
    }
}

fn client_ip(req: &Request) -> Option<String> {
    req.headers()
        .get("x-forwarded-for")
        .or_else(|| req.headers().get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
}
