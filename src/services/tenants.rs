//! Tenant resolution.
//!
//! Each request binds to exactly one tenant. Signals, in precedence order:
//! the `X-Tenant-ID` header, the request subdomain under the configured
//! apex, and the `tenant_id` claim of a presented access token. When more
//! than one signal is present they must agree.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::application::config::CONFIG;
use crate::application::error::{AppError, Result};
use crate::models::tenant::{self, RESERVED_SUBDOMAINS};
use crate::services::cache::CacheService;

/// Subdomain of `host` under the configured apex, if any. Reserved
/// subdomains never resolve.
pub fn extract_subdomain(host: &str, apex: &str) -> Option<String> {
    let host = host.split(':').next().unwrap_or(host).to_ascii_lowercase();
    let suffix = format!(".{apex}");
    let sub = host.strip_suffix(suffix.as_str())?;
    if sub.is_empty() || sub.contains('.') || RESERVED_SUBDOMAINS.contains(&sub) {
        return None;
    }
    Some(sub.to_string())
}

/// Map a subdomain to a tenant id, consulting the 5-minute cache first.
async fn lookup_subdomain<C: ConnectionTrait>(
    db: &C,
    cache: &CacheService,
    subdomain: &str,
) -> Result<Option<Uuid>> {
    let cache_key = CacheService::subdomain_key(subdomain);
    if let Some(cached) = cache.get(&cache_key).await {
        if let Ok(id) = Uuid::parse_str(&cached) {
            return Ok(Some(id));
        }
    }

    let found = tenant::Entity::find()
        .filter(tenant::Column::Subdomain.eq(subdomain))
        .one(db)
        .await?;

    match found {
        Some(t) => {
            cache
                .set(
                    &cache_key,
                    &t.id.to_string(),
                    CONFIG.cache.tenant_resolution_ttl_secs,
                )
                .await;
            Ok(Some(t.id))
        }
        None => Ok(None),
    }
}

/// Resolve the request tenant from the available signals.
///
/// Returns `Ok(None)` when no signal is present (public traffic); the
/// context extractor rejects tenant-scoped handlers in that case. On
/// success the full tenant row is returned so downstream middleware can
/// read plan limits without another fetch.
pub async fn resolve<C: ConnectionTrait>(
    db: &C,
    cache: &CacheService,
    header: Option<&str>,
    host: Option<&str>,
    claim: Option<Uuid>,
) -> Result<Option<tenant::Model>> {
    let mut signals: Vec<Uuid> = Vec::new();

    if let Some(raw) = header {
        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::validation("Invalid tenant ID format in X-Tenant-ID header"))?;
        signals.push(id);
    }

    if let Some(host) = host {
        if let Some(sub) = extract_subdomain(host, &CONFIG.auth.apex_domain) {
            match lookup_subdomain(db, cache, &sub).await? {
                Some(id) => signals.push(id),
                None => return Err(AppError::not_found("Tenant not found")),
            }
        }
    }

    if let Some(id) = claim {
        signals.push(id);
    }

    let Some(first) = signals.first().copied() else {
        return Ok(None);
    };

    if signals.iter().any(|id| *id != first) {
        return Err(AppError::TenantMismatch(
            "Tenant signals disagree".to_string(),
        ));
    }

    let found = tenant::Entity::find_by_id(first)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("Tenant not found"))?;

    if !found.is_active {
        return Err(AppError::forbidden("Tenant is not active"));
    }

    Ok(Some(found))
}
