//! End-to-end authentication flows: registration policy, login, MFA,
//! refresh rotation, replay detection, logout.

mod common;

use common::*;
use http::StatusCode;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use taskhive::domain::authorization::Role;
use taskhive::models::prelude::*;

#[tokio::test]
async fn register_creates_member_user() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Acme", "acme").await;

    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/register",
        None,
        None,
        Some(json!({
            "email": "Alice@Example.com",
            "username": "alice",
            "password": GOOD_PASSWORD,
            "tenant_id": tenant.id,
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], true);
    // Email is case-folded, role defaults applied.
    assert_eq!(body["data"]["email"], "alice@example.com");
    assert_eq!(body["data"]["roles"][0], "MEMBER");
    assert!(body["data"]["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p == "tasks.read"));
    // The password hash never leaves the server.
    assert!(body["data"].get("password_hash").is_none());
}

#[tokio::test]
async fn register_rejects_weak_passwords() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Acme", "acme").await;

    for (password, why) in [
        ("Short1!", "too short"),
        ("password1234", "no uppercase or special"),
        ("PASSWORDABCD1!", "no lowercase"),
        ("Passwordabcd!", "no digit"),
        ("Password12345", "no special character"),
    ] {
        let (status, body) = send_json(
            &harness.app,
            "POST",
            "/api/v1/auth/register",
            None,
            None,
            Some(json!({
                "email": "bob@example.com",
                "username": "bob",
                "password": password,
                "tenant_id": tenant.id,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{why}: {body}");
        assert_eq!(error_code(&body), "VALIDATION_ERROR", "{why}");
    }
}

#[tokio::test]
async fn register_rejects_duplicate_email() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Acme", "acme").await;
    seed_user(&harness.db, tenant.id, "carol@example.com", GOOD_PASSWORD, vec![Role::Member]).await;

    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/register",
        None,
        None,
        Some(json!({
            "email": "carol@example.com",
            "username": "carol2",
            "password": GOOD_PASSWORD,
            "tenant_id": tenant.id,
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "CONFLICT");
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Acme", "acme").await;
    seed_user(&harness.db, tenant.id, "dave@example.com", GOOD_PASSWORD, vec![Role::Member]).await;

    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/login",
        Some(tenant.id),
        None,
        Some(json!({ "email": "dave@example.com", "password": "Wrong-Passw0rd!" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "UNAUTHENTICATED");
}

#[tokio::test]
async fn login_issues_token_pair() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Acme", "acme").await;
    let user =
        seed_user(&harness.db, tenant.id, "erin@example.com", GOOD_PASSWORD, vec![Role::Member])
            .await;

    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/login",
        Some(tenant.id),
        None,
        Some(json!({ "email": "erin@example.com", "password": GOOD_PASSWORD })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["expires_in"], 900);
    assert!(body["data"]["access_token"].as_str().unwrap().len() > 100);

    // One live refresh token and a recorded login timestamp.
    let tokens = RefreshToken::find()
        .filter(refresh_token::Column::UserId.eq(user.id))
        .all(&harness.db)
        .await
        .unwrap();
    assert_eq!(tokens.len(), 1);
    assert!(!tokens[0].is_revoked);

    let refreshed_user = User::find_by_id(user.id)
        .one(&harness.db)
        .await
        .unwrap()
        .unwrap();
    assert!(refreshed_user.last_login_at.is_some());
}

#[tokio::test]
async fn refresh_rotates_within_the_same_family() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Acme", "acme").await;
    let user =
        seed_user(&harness.db, tenant.id, "frank@example.com", GOOD_PASSWORD, vec![Role::Member])
            .await;

    let (_access, refresh) =
        login(&harness.app, tenant.id, "frank@example.com", GOOD_PASSWORD).await;

    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/refresh",
        None,
        None,
        Some(json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let new_refresh = body["data"]["refresh_token"].as_str().unwrap();
    assert_ne!(new_refresh, refresh);

    let tokens = RefreshToken::find()
        .filter(refresh_token::Column::UserId.eq(user.id))
        .all(&harness.db)
        .await
        .unwrap();
    assert_eq!(tokens.len(), 2);
    // Same family, linked parent, exactly one live token.
    assert_eq!(tokens[0].family_id, tokens[1].family_id);
    assert_eq!(tokens.iter().filter(|t| !t.is_revoked).count(), 1);
    let child = tokens.iter().find(|t| !t.is_revoked).unwrap();
    let parent = tokens.iter().find(|t| t.is_revoked).unwrap();
    assert_eq!(child.parent_token_id, Some(parent.id));
}

/// Replaying a rotated refresh token revokes the whole family.
#[tokio::test]
async fn refresh_replay_revokes_the_whole_family() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Acme", "acme").await;
    let user =
        seed_user(&harness.db, tenant.id, "grace@example.com", GOOD_PASSWORD, vec![Role::Member])
            .await;

    let (_a1, r1) = login(&harness.app, tenant.id, "grace@example.com", GOOD_PASSWORD).await;

    // Rotate r1 -> r2.
    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/refresh",
        None,
        None,
        Some(json!({ "refresh_token": r1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let r2 = body["data"]["refresh_token"].as_str().unwrap().to_string();

    // Replay r1: rejected, and the family dies with it.
    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/refresh",
        None,
        None,
        Some(json!({ "refresh_token": r1 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "INVALID_TOKEN");

    // r2 was collateral damage.
    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/refresh",
        None,
        None,
        Some(json!({ "refresh_token": r2 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "INVALID_TOKEN");

    let live = RefreshToken::find()
        .filter(refresh_token::Column::UserId.eq(user.id))
        .filter(refresh_token::Column::IsRevoked.eq(false))
        .all(&harness.db)
        .await
        .unwrap();
    assert!(live.is_empty());

    // A fresh login starts a new, working family.
    let (_a, r3) = login(&harness.app, tenant.id, "grace@example.com", GOOD_PASSWORD).await;
    let (status, _) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/refresh",
        None,
        None,
        Some(json!({ "refresh_token": r3 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

/// Register, login, refresh twice, then logout leaves zero
/// non-revoked tokens for the user.
#[tokio::test]
async fn full_session_round_trip_leaves_no_live_tokens() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Acme", "acme").await;

    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/register",
        None,
        None,
        Some(json!({
            "email": "heidi@example.com",
            "username": "heidi",
            "password": GOOD_PASSWORD,
            "tenant_id": tenant.id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (access, r1) = login(&harness.app, tenant.id, "heidi@example.com", GOOD_PASSWORD).await;

    let (_, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/refresh",
        None,
        None,
        Some(json!({ "refresh_token": r1 })),
    )
    .await;
    let r2 = body["data"]["refresh_token"].as_str().unwrap().to_string();

    let (_, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/refresh",
        None,
        None,
        Some(json!({ "refresh_token": r2 })),
    )
    .await;
    let r3 = body["data"]["refresh_token"].as_str().unwrap().to_string();
    let access3 = body["data"]["access_token"].as_str().unwrap().to_string();
    let _ = access;

    let (status, _) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/logout",
        Some(tenant.id),
        Some(&access3),
        Some(json!({ "refresh_token": r3 })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let live = RefreshToken::find()
        .filter(refresh_token::Column::IsRevoked.eq(false))
        .all(&harness.db)
        .await
        .unwrap();
    assert!(live.is_empty(), "every token should be revoked");
}

#[tokio::test]
async fn logout_requires_a_bearer_token() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Acme", "acme").await;

    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/logout",
        Some(tenant.id),
        None,
        Some(json!({ "refresh_token": "whatever" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "UNAUTHENTICATED");
}

#[tokio::test]
async fn mfa_enrollment_gates_login() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Acme", "acme").await;
    let user =
        seed_user(&harness.db, tenant.id, "ivan@example.com", GOOD_PASSWORD, vec![Role::Member])
            .await;

    let (access, _refresh) =
        login(&harness.app, tenant.id, "ivan@example.com", GOOD_PASSWORD).await;

    // Start enrollment.
    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/mfa/enable",
        Some(tenant.id),
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let secret = body["data"]["secret"].as_str().unwrap().to_string();
    assert!(body["data"]["otpauth_uri"]
        .as_str()
        .unwrap()
        .starts_with("otpauth://totp/"));

    // Secret is pending, not yet active.
    let pending = User::find_by_id(user.id).one(&harness.db).await.unwrap().unwrap();
    assert!(!pending.mfa_enabled);
    assert!(pending.mfa_secret.is_none());

    // Confirm with a real TOTP code.
    let code = totp_code(&secret, "ivan@example.com");
    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/mfa/verify",
        Some(tenant.id),
        Some(&access),
        Some(json!({ "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["enabled"], true);

    let enabled = User::find_by_id(user.id).one(&harness.db).await.unwrap().unwrap();
    assert!(enabled.mfa_enabled);
    assert!(enabled.mfa_secret.is_some());
    assert!(enabled.mfa_pending_secret.is_none());

    // Password-only login now answers 423 MFA_REQUIRED.
    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/login",
        Some(tenant.id),
        None,
        Some(json!({ "email": "ivan@example.com", "password": GOOD_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(error_code(&body), "MFA_REQUIRED");

    // Wrong code is rejected.
    let (status, _) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/login",
        Some(tenant.id),
        None,
        Some(json!({
            "email": "ivan@example.com",
            "password": GOOD_PASSWORD,
            "mfa_code": "000000",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Correct code logs in.
    let code = totp_code(&secret, "ivan@example.com");
    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/login",
        Some(tenant.id),
        None,
        Some(json!({
            "email": "ivan@example.com",
            "password": GOOD_PASSWORD,
            "mfa_code": code,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn me_returns_the_caller_profile() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Acme", "acme").await;
    seed_user(&harness.db, tenant.id, "judy@example.com", GOOD_PASSWORD, vec![Role::ProjectManager])
        .await;

    let (access, _) = login(&harness.app, tenant.id, "judy@example.com", GOOD_PASSWORD).await;
    let (status, body) = send_json(
        &harness.app,
        "GET",
        "/api/v1/auth/me",
        Some(tenant.id),
        Some(&access),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "judy@example.com");
    assert_eq!(body["data"]["roles"][0], "PROJECT_MANAGER");
}

/// Generate the current TOTP code the way an authenticator app would.
fn totp_code(secret: &str, account: &str) -> String {
    use totp_rs::{Algorithm, Secret, TOTP};
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        Secret::Encoded(secret.to_string()).to_bytes().unwrap(),
        Some(taskhive::config::CONFIG.auth.totp_issuer.clone()),
        account.to_string(),
    )
    .unwrap();
    totp.generate_current().unwrap()
}
