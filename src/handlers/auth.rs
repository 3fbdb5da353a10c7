//! Authentication commands and queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, Set,
};
use serde::Serialize;
use uuid::Uuid;

use crate::application::config::CONFIG;
use crate::application::error::{AppError, Result};
use crate::application::state::AppState;
use crate::context::RequestContext;
use crate::domain::authorization::Role;
use crate::domain::events::{self, DomainEvent};
use crate::mediator::{Command, Query, UnitOfWork};
use crate::models::audit_log::{AuditAction, TargetType};
use crate::models::prelude::*;
use crate::models::{RoleSet, StringSet};
use crate::services::breach::BreachCheck;
use crate::services::{security, tokens};

// ==========================================================================
// DTOs
// ==========================================================================

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub username: String,
    pub roles: Vec<Role>,
    /// Effective permissions (role defaults merged with overrides).
    pub permissions: Vec<String>,
    pub department_id: Option<Uuid>,
    pub mfa_enabled: bool,
    pub is_active: bool,
    pub email_verified: bool,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        let permissions = user.effective_permissions();
        Self {
            id: user.id,
            tenant_id: user.tenant_id,
            email: user.email,
            username: user.username,
            roles: user.roles.0,
            permissions,
            department_id: user.department_id,
            mfa_enabled: user.mfa_enabled,
            is_active: user.is_active,
            email_verified: user.email_verified,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl TokenPair {
    fn new(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in: CONFIG.auth.access_token_ttl_minutes * 60,
        }
    }
}

/// Refresh is dispatched like any command so a replay can commit its family
/// revocation; the HTTP layer maps `Rejected` to `INVALID_TOKEN`.
pub enum RefreshResult {
    Issued(Box<TokenPair>),
    Rejected,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct MfaEnrollment {
    pub secret: String,
    pub otpauth_uri: String,
}

// ==========================================================================
// Repository helpers (tenant id is always an explicit argument)
// ==========================================================================

async fn find_user_by_email<C: ConnectionTrait>(
    db: &C,
    tenant_id: Uuid,
    email: &str,
) -> Result<Option<user::Model>> {
    Ok(User::find()
        .filter(user::Column::TenantId.eq(tenant_id))
        .filter(user::Column::Email.eq(email.to_lowercase()))
        .one(db)
        .await?)
}

async fn find_user_by_id<C: ConnectionTrait>(
    db: &C,
    tenant_id: Uuid,
    user_id: Uuid,
) -> Result<Option<user::Model>> {
    Ok(User::find()
        .filter(user::Column::TenantId.eq(tenant_id))
        .filter(user::Column::Id.eq(user_id))
        .one(db)
        .await?)
}

fn validate_email(email: &str) -> Result<()> {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || !parts[1].contains('.') {
        return Err(AppError::validation("Invalid email format"));
    }
    Ok(())
}

// ==========================================================================
// RegisterUser
// ==========================================================================

pub struct RegisterUser {
    pub tenant_id: Uuid,
    pub email: String,
    pub username: String,
    pub password: String,
}

#[async_trait]
impl Command for RegisterUser {
    type Output = UserResponse;

    const NAME: &'static str = "RegisterUser";

    fn validate(&self) -> Result<()> {
        validate_email(&self.email)?;
        if self.username.len() < 3 || self.username.len() > 100 {
            return Err(AppError::validation(
                "Username must be between 3 and 100 characters",
            ));
        }
        security::validate_password_strength(&self.password).map_err(AppError::validation)?;
        Ok(())
    }

    async fn execute(
        self,
        _ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let db = uow.conn();

        let tenant = Tenant::find_by_id(self.tenant_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::validation("Unknown tenant"))?;
        if !tenant.is_active {
            return Err(AppError::forbidden("Tenant is not active"));
        }

        let seats_taken = User::find()
            .filter(user::Column::TenantId.eq(tenant.id))
            .count(db)
            .await?;
        if seats_taken >= tenant.max_users as u64 {
            return Err(AppError::validation("Tenant user limit reached"));
        }

        if find_user_by_email(db, tenant.id, &self.email).await?.is_some() {
            return Err(AppError::conflict("User with this email already exists"));
        }

        match uow.state.breach.check(&self.password).await {
            BreachCheck::Compromised => {
                return Err(AppError::validation(
                    "This password has appeared in a data breach. Please choose a different password.",
                ));
            }
            BreachCheck::Skipped if CONFIG.auth.breach_fail_closed => {
                return Err(AppError::validation(
                    "Password could not be verified against the breach database. Please try again later.",
                ));
            }
            BreachCheck::Skipped | BreachCheck::Clean => {}
        }

        let now = Utc::now();
        let user = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant.id),
            email: Set(self.email.to_lowercase()),
            username: Set(self.username.clone()),
            password_hash: Set(security::hash_password(&self.password)?),
            roles: Set(RoleSet(vec![Role::Member])),
            permissions: Set(StringSet::default()),
            department_id: Set(None),
            mfa_enabled: Set(false),
            mfa_secret: Set(None),
            mfa_pending_secret: Set(None),
            is_active: Set(true),
            email_verified: Set(false),
            last_login_at: Set(None),
            last_password_change_at: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        uow.record(DomainEvent::new(
            events::USER_REGISTERED,
            user.id,
            user.tenant_id,
            serde_json::json!({
                "email": user.email,
                "username": user.username,
                "actor_user_id": user.id.to_string(),
            }),
        ));

        tracing::info!(user_id = %user.id, tenant_id = %user.tenant_id, "user registered");
        Ok(UserResponse::from(user))
    }
}

// ==========================================================================
// Login
// ==========================================================================

pub struct Login {
    pub email: String,
    pub password: String,
    pub mfa_code: Option<String>,
    pub device_fingerprint: Option<String>,
}

#[async_trait]
impl Command for Login {
    type Output = TokenPair;

    const NAME: &'static str = "Login";

    async fn execute(
        self,
        ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let db = uow.conn();

        let user = find_user_by_email(db, ctx.tenant_id, &self.email)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| {
                tracing::warn!(tenant_id = %ctx.tenant_id, "login failed: unknown or inactive user");
                AppError::unauthenticated("Invalid credentials")
            })?;

        let (password_ok, upgraded_hash) =
            security::verify_and_rehash(&self.password, &user.password_hash)?;
        if !password_ok {
            tracing::warn!(user_id = %user.id, tenant_id = %user.tenant_id, "login failed: bad password");
            return Err(AppError::unauthenticated("Invalid credentials"));
        }

        if user.mfa_enabled {
            let code = self
                .mfa_code
                .as_deref()
                .ok_or_else(|| AppError::MfaRequired("MFA code required".to_string()))?;
            let secret = user.mfa_secret.as_deref().ok_or_else(|| {
                AppError::internal("MFA enabled without a secret")
            })?;
            if !security::verify_totp(secret, code, &user.email)? {
                return Err(AppError::unauthenticated("Invalid MFA code"));
            }
        }

        let permissions = user.effective_permissions();
        let access_token = security::create_access_token(&user, &permissions)?;

        let family_id = Uuid::new_v4();
        let issued = tokens::issue(
            db,
            user.id,
            user.tenant_id,
            family_id,
            None,
            self.device_fingerprint.as_deref().map(security::digest_token),
        )
        .await?;

        let mut active = user.clone().into_active_model();
        active.last_login_at = Set(Some(Utc::now()));
        if let Some(new_hash) = upgraded_hash {
            active.password_hash = Set(new_hash);
        }
        active.update(db).await?;

        uow.record(DomainEvent::new(
            events::USER_LOGGED_IN,
            user.id,
            user.tenant_id,
            serde_json::json!({
                "email": user.email,
                "actor_user_id": user.id.to_string(),
            }),
        ));

        tracing::info!(user_id = %user.id, tenant_id = %user.tenant_id, "user logged in");
        Ok(TokenPair::new(access_token, issued.raw))
    }
}

// ==========================================================================
// RefreshSession
// ==========================================================================

pub struct RefreshSession {
    pub refresh_token: String,
}

#[async_trait]
impl Command for RefreshSession {
    type Output = RefreshResult;

    const NAME: &'static str = "RefreshSession";

    async fn execute(
        self,
        ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let db = uow.conn();

        match tokens::rotate(db, &self.refresh_token, ctx.started_at).await? {
            tokens::RotationOutcome::Rotated { previous, issued } => {
                let Some(user) = find_user_by_id(db, previous.tenant_id, previous.user_id)
                    .await?
                    .filter(|u| u.is_active)
                else {
                    // The account vanished or was deactivated between
                    // rotations; take the fresh token back out of play.
                    tokens::revoke(db, issued.model).await?;
                    return Ok(RefreshResult::Rejected);
                };

                let permissions = user.effective_permissions();
                let access_token = security::create_access_token(&user, &permissions)?;

                uow.state
                    .audit
                    .log(
                        db,
                        user.tenant_id,
                        Some(user.id),
                        AuditAction::TokenRefresh,
                        TargetType::User,
                        Some(user.id.to_string()),
                        serde_json::json!({ "family_id": previous.family_id }),
                    )
                    .await?;

                Ok(RefreshResult::Issued(Box::new(TokenPair::new(
                    access_token,
                    issued.raw,
                ))))
            }
            tokens::RotationOutcome::Replayed {
                family_id,
                tenant_id,
                user_id,
            } => {
                uow.record(DomainEvent::new(
                    events::SECURITY_ALERT,
                    user_id,
                    tenant_id,
                    serde_json::json!({
                        "kind": "refresh_token_replay",
                        "family_id": family_id,
                        "actor_user_id": user_id.to_string(),
                    }),
                ));
                Ok(RefreshResult::Rejected)
            }
            tokens::RotationOutcome::Unknown
            | tokens::RotationOutcome::Expired
            | tokens::RotationOutcome::RaceLost => Ok(RefreshResult::Rejected),
        }
    }
}

// ==========================================================================
// Logout
// ==========================================================================

pub struct Logout {
    pub refresh_token: String,
}

#[async_trait]
impl Command for Logout {
    type Output = ();

    const NAME: &'static str = "Logout";

    async fn execute(
        self,
        ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let user_id = ctx.require_user()?;
        let db = uow.conn();

        tokens::revoke_by_raw(db, &self.refresh_token).await?;

        uow.state
            .audit
            .log(
                db,
                ctx.tenant_id,
                Some(user_id),
                AuditAction::Logout,
                TargetType::User,
                Some(user_id.to_string()),
                serde_json::json!({}),
            )
            .await?;

        tracing::info!(user_id = %user_id, tenant_id = %ctx.tenant_id, "user logged out");
        Ok(())
    }
}

// ==========================================================================
// MFA enrollment
// ==========================================================================

pub struct EnableMfa;

#[async_trait]
impl Command for EnableMfa {
    type Output = MfaEnrollment;

    const NAME: &'static str = "EnableMfa";

    async fn execute(
        self,
        ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let user_id = ctx.require_user()?;
        let db = uow.conn();

        let user = find_user_by_id(db, ctx.tenant_id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        if user.mfa_enabled {
            return Err(AppError::conflict("MFA is already enabled"));
        }

        let secret = security::generate_totp_secret();
        let otpauth_uri = security::totp_provisioning_uri(&secret, &user.email)?;

        let mut active = user.into_active_model();
        active.mfa_pending_secret = Set(Some(secret.clone()));
        active.updated_at = Set(Utc::now());
        active.update(db).await?;

        Ok(MfaEnrollment {
            secret,
            otpauth_uri,
        })
    }
}

pub struct VerifyMfa {
    pub code: String,
}

#[async_trait]
impl Command for VerifyMfa {
    type Output = ();

    const NAME: &'static str = "VerifyMfa";

    fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            return Err(AppError::validation("MFA code is required"));
        }
        Ok(())
    }

    async fn execute(
        self,
        ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let user_id = ctx.require_user()?;
        let db = uow.conn();

        let user = find_user_by_id(db, ctx.tenant_id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        let pending = user
            .mfa_pending_secret
            .clone()
            .ok_or_else(|| AppError::validation("No MFA enrollment in progress"))?;

        if !security::verify_totp(&pending, self.code.trim(), &user.email)? {
            return Err(AppError::validation("Invalid MFA code"));
        }

        let tenant_id = user.tenant_id;
        let mut active = user.into_active_model();
        active.mfa_secret = Set(Some(pending));
        active.mfa_pending_secret = Set(None);
        active.mfa_enabled = Set(true);
        active.updated_at = Set(Utc::now());
        active.update(db).await?;

        uow.record(DomainEvent::new(
            events::MFA_ENABLED,
            user_id,
            tenant_id,
            serde_json::json!({ "actor_user_id": user_id.to_string() }),
        ));

        tracing::info!(user_id = %user_id, "MFA enabled");
        Ok(())
    }
}

pub struct DisableMfa {
    pub code: String,
}

#[async_trait]
impl Command for DisableMfa {
    type Output = ();

    const NAME: &'static str = "DisableMfa";

    async fn execute(
        self,
        ctx: &RequestContext,
        uow: &mut UnitOfWork<'_>,
    ) -> Result<Self::Output> {
        let user_id = ctx.require_user()?;
        let db = uow.conn();

        let user = find_user_by_id(db, ctx.tenant_id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        if !user.mfa_enabled {
            return Err(AppError::validation("MFA is not enabled"));
        }
        let secret = user
            .mfa_secret
            .clone()
            .ok_or_else(|| AppError::internal("MFA enabled without a secret"))?;
        if !security::verify_totp(&secret, self.code.trim(), &user.email)? {
            return Err(AppError::validation("Invalid MFA code"));
        }

        let mut active = user.into_active_model();
        active.mfa_secret = Set(None);
        active.mfa_pending_secret = Set(None);
        active.mfa_enabled = Set(false);
        active.updated_at = Set(Utc::now());
        active.update(db).await?;

        tracing::info!(user_id = %user_id, "MFA disabled");
        Ok(())
    }
}

// ==========================================================================
// Queries
// ==========================================================================

pub struct GetCurrentUser;

#[async_trait]
impl Query for GetCurrentUser {
    type Output = UserResponse;

    const NAME: &'static str = "GetCurrentUser";

    async fn fetch(self, ctx: &RequestContext, state: &AppState) -> Result<Self::Output> {
        let user_id = ctx.require_user()?;
        let user = find_user_by_id(&state.db, ctx.tenant_id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        Ok(UserResponse::from(user))
    }
}
