//! Per-request context carrier.
//!
//! The middleware pipeline builds a [`RequestContext`] in stages: the
//! request logger mints the correlation id, the tenant resolver binds the
//! tenant, and the authentication layer fills in the user identity. Every
//! handler and repository reads tenant and user identity from here and
//! nowhere else, which is what makes tenant isolation auditable.

use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::domain::authorization::Role;

tokio::task_local! {
    /// Correlation id for the in-flight request, scoped by the request
    /// logger so error rendering can stamp it into the envelope.
    pub static CORRELATION_ID: String;
}

/// Correlation id of the current request, if one is in scope.
pub fn current_correlation_id() -> Option<String> {
    CORRELATION_ID.try_with(|id| id.clone()).ok()
}

/// Request-scoped identity and tenancy information.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub correlation_id: String,
    pub roles: Vec<Role>,
    pub permissions: Vec<String>,
    pub department_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(tenant_id: Uuid, correlation_id: String) -> Self {
        Self {
            tenant_id,
            user_id: None,
            email: None,
            correlation_id,
            roles: Vec::new(),
            permissions: Vec::new(),
            department_id: None,
            started_at: Utc::now(),
        }
    }

    /// Context for the pre-tenant flows (register resolves the tenant from
    /// its payload, refresh from the token family record). Repositories
    /// still receive an explicit tenant id from those sources.
    pub fn anonymous(correlation_id: String) -> Self {
        Self::new(Uuid::nil(), correlation_id)
    }

    /// User id of the authenticated caller, or `UNAUTHENTICATED`.
    pub fn require_user(&self) -> Result<Uuid, AppError> {
        self.user_id
            .ok_or_else(|| AppError::unauthenticated("Authentication required".to_string()))
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::TenantAdmin) || self.has_role(Role::SystemAdmin)
    }
}

/// Extractor for handlers that require a resolved tenant. Repositories are
/// only ever handed a `tenant_id` that came through here, so a request that
/// skipped tenant resolution cannot touch tenant data.
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| {
                AppError::TenantMismatch("Missing tenant context".to_string())
            })
    }
}
