//! Refresh-token families.
//!
//! Tokens form an append-only family graph `(family_id, parent_token_id)`;
//! a login starts a family, every rotation extends it, and replay of a
//! revoked member revokes the whole family with a single UPDATE. Rotation
//! runs under a `FOR UPDATE` row lock so exactly one of two concurrent
//! refreshes wins.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::application::config::CONFIG;
use crate::application::error::Result;
use crate::models::refresh_token;
use crate::services::security;

pub struct IssuedRefreshToken {
    /// Raw opaque value; handed to the client exactly once.
    pub raw: String,
    pub model: refresh_token::Model,
}

pub enum RotationOutcome {
    /// The presented token was live; it is now revoked and replaced.
    Rotated {
        previous: refresh_token::Model,
        issued: IssuedRefreshToken,
    },
    /// No record matches the presented value.
    Unknown,
    /// The record had expired; it is now revoked.
    Expired,
    /// True replay: the token was revoked before this request began.
    /// Every token in the family is now revoked.
    Replayed {
        family_id: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
    },
    /// Lost a concurrent rotation race; the family stays intact.
    RaceLost,
}

/// Mint and persist a refresh token. `family_id`/`parent` chain rotations
/// back to the originating login.
pub async fn issue<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    tenant_id: Uuid,
    family_id: Uuid,
    parent_token_id: Option<Uuid>,
    device_fingerprint_hash: Option<String>,
) -> Result<IssuedRefreshToken> {
    let raw = security::generate_refresh_token();
    let now = Utc::now();

    let model = refresh_token::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        tenant_id: Set(tenant_id),
        token_hash: Set(security::digest_token(&raw)),
        jti: Set(Uuid::new_v4().to_string()),
        family_id: Set(family_id),
        parent_token_id: Set(parent_token_id),
        device_fingerprint_hash: Set(device_fingerprint_hash),
        is_revoked: Set(false),
        revoked_at: Set(None),
        expires_at: Set(now + Duration::days(CONFIG.auth.refresh_token_ttl_days)),
        created_at: Set(now),
    }
    .insert(db)
    .await?;

    Ok(IssuedRefreshToken { raw, model })
}

/// Rotate a presented refresh token, detecting replay.
///
/// `request_started_at` anchors replay detection: a token revoked while
/// this request was already in flight lost a benign race; one revoked
/// before the request began was replayed.
pub async fn rotate<C: ConnectionTrait>(
    db: &C,
    raw: &str,
    request_started_at: DateTime<Utc>,
) -> Result<RotationOutcome> {
    let digest = security::digest_token(raw);

    let Some(current) = refresh_token::Entity::find()
        .filter(refresh_token::Column::TokenHash.eq(&digest))
        .lock_exclusive()
        .one(db)
        .await?
    else {
        return Ok(RotationOutcome::Unknown);
    };

    let now = Utc::now();

    if current.is_revoked {
        if current.revoked_at.is_some_and(|at| at >= request_started_at) {
            return Ok(RotationOutcome::RaceLost);
        }
        revoke_family(db, current.tenant_id, current.family_id).await?;
        tracing::warn!(
            family_id = %current.family_id,
            user_id = %current.user_id,
            tenant_id = %current.tenant_id,
            "refresh token replay detected; family revoked"
        );
        return Ok(RotationOutcome::Replayed {
            family_id: current.family_id,
            tenant_id: current.tenant_id,
            user_id: current.user_id,
        });
    }

    if current.expires_at <= now {
        revoke(db, current).await?;
        return Ok(RotationOutcome::Expired);
    }

    let previous = revoke(db, current).await?;
    let issued = issue(
        db,
        previous.user_id,
        previous.tenant_id,
        previous.family_id,
        Some(previous.id),
        previous.device_fingerprint_hash.clone(),
    )
    .await?;

    Ok(RotationOutcome::Rotated { previous, issued })
}

/// Revoke one token record.
pub async fn revoke<C: ConnectionTrait>(
    db: &C,
    token: refresh_token::Model,
) -> Result<refresh_token::Model> {
    let mut active = token.into_active_model();
    active.is_revoked = Set(true);
    active.revoked_at = Set(Some(Utc::now()));
    Ok(active.update(db).await?)
}

/// Revoke the token matching a raw value, if any. Used by logout; only the
/// presented token is revoked, never its family.
pub async fn revoke_by_raw<C: ConnectionTrait>(db: &C, raw: &str) -> Result<Option<Uuid>> {
    let digest = security::digest_token(raw);
    let Some(token) = refresh_token::Entity::find()
        .filter(refresh_token::Column::TokenHash.eq(&digest))
        .one(db)
        .await?
    else {
        return Ok(None);
    };
    let user_id = token.user_id;
    if !token.is_revoked {
        revoke(db, token).await?;
    }
    Ok(Some(user_id))
}

/// Revoke every token in a family with a single UPDATE.
pub async fn revoke_family<C: ConnectionTrait>(
    db: &C,
    tenant_id: Uuid,
    family_id: Uuid,
) -> Result<u64> {
    let result = refresh_token::Entity::update_many()
        .col_expr(
            refresh_token::Column::IsRevoked,
            sea_orm::sea_query::Expr::value(true),
        )
        .col_expr(
            refresh_token::Column::RevokedAt,
            sea_orm::sea_query::Expr::value(Utc::now()),
        )
        .filter(refresh_token::Column::TenantId.eq(tenant_id))
        .filter(refresh_token::Column::FamilyId.eq(family_id))
        .filter(refresh_token::Column::IsRevoked.eq(false))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
