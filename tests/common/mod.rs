//! Test helpers and utilities for integration testing.
//!
//! Builds the full router (every middleware layer included) over an
//! in-memory SQLite database, with ephemeral RSA signing keys. The cache
//! stays disconnected, which exercises the fail-soft paths.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use axum::{body::Body, Router};
use http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use tower::ServiceExt;
use uuid::Uuid;

use taskhive::bootstrapper::create_app;
use taskhive::domain::authorization::Role;
use taskhive::migrations::Migrator;
use taskhive::models::prelude::*;
use taskhive::models::{RoleSet, StringSet};
use taskhive::services::outbox::OutboxNotifier;
use taskhive::services::{security, AuditService, BreachOracle, CacheService};
use taskhive::state::AppState;

static INIT: Once = Once::new();

/// Process-wide one-time setup: point the breach oracle at a dead port so
/// registration never leaves the process, then install a fresh key pair.
fn init_process() {
    INIT.call_once(|| {
        std::env::set_var(
            "TASKHIVE_BREACH_ORACLE_URL",
            "http://127.0.0.1:9/range",
        );
        std::env::set_var("TASKHIVE_BREACH_ORACLE_TIMEOUT_SECS", "1");
        once_cell::sync::Lazy::force(&taskhive::config::CONFIG);

        let (private_pem, public_pem) = security::generate_rsa_key_pair().unwrap();
        security::install_keys(&private_pem, &public_pem, &[]).unwrap();
    });
}

/// Create an in-memory SQLite database with the full schema applied.
pub async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("failed to create test database");
    Migrator::up(&db, None)
        .await
        .expect("failed to run test migrations");
    db
}

pub struct TestApp {
    pub app: Router,
    pub db: DatabaseConnection,
    pub state: AppState,
}

/// Full application over a fresh database.
pub async fn spawn_app() -> TestApp {
    init_process();

    let db = create_test_db().await;
    let state = AppState::new(
        db.clone(),
        CacheService::new(),
        AuditService::new(),
        Arc::new(BreachOracle::new()),
        OutboxNotifier::default(),
    );
    let app = create_app(state.clone());

    TestApp { app, db, state }
}

/// Seed a tenant.
pub async fn seed_tenant(db: &DatabaseConnection, name: &str, subdomain: &str) -> tenant::Model {
    let now = chrono::Utc::now();
    tenant::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        subdomain: Set(subdomain.to_string()),
        subscription_plan: Set(tenant::SubscriptionPlan::Professional),
        max_users: Set(50),
        is_active: Set(true),
        settings: Set(serde_json::json!({})),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("failed to seed tenant")
}

/// Seed a user with the given roles. The password is Argon2id-hashed the
/// same way the registration path does it.
pub async fn seed_user(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    email: &str,
    password: &str,
    roles: Vec<Role>,
) -> user::Model {
    let now = chrono::Utc::now();
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        email: Set(email.to_lowercase()),
        username: Set(email.split('@').next().unwrap_or("user").to_string()),
        password_hash: Set(security::hash_password(password).unwrap()),
        roles: Set(RoleSet(roles)),
        permissions: Set(StringSet::default()),
        department_id: Set(None),
        mfa_enabled: Set(false),
        mfa_secret: Set(None),
        mfa_pending_secret: Set(None),
        is_active: Set(true),
        email_verified: Set(true),
        last_login_at: Set(None),
        last_password_change_at: Set(now),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("failed to seed user")
}

/// A password that satisfies the policy.
pub const GOOD_PASSWORD: &str = "Str0ng&Secret-Pass";

/// Send a JSON request and return `(status, parsed body)`.
pub async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    tenant: Option<Uuid>,
    bearer: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some(tenant_id) = tenant {
        builder = builder.header("x-tenant-id", tenant_id.to_string());
    }
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = builder
        .body(match body {
            Some(json) => Body::from(json.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.expect("request failed");
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };

    (status, json)
}

/// Login and return `(access_token, refresh_token)`.
pub async fn login(
    app: &Router,
    tenant_id: Uuid,
    email: &str,
    password: &str,
) -> (String, String) {
    let (status, body) = send_json(
        app,
        "POST",
        "/api/v1/auth/login",
        Some(tenant_id),
        None,
        Some(serde_json::json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");

    (
        body["data"]["access_token"].as_str().unwrap().to_string(),
        body["data"]["refresh_token"].as_str().unwrap().to_string(),
    )
}

/// Error code from an error envelope.
pub fn error_code(body: &serde_json::Value) -> &str {
    body["error"]["code"].as_str().unwrap_or("")
}
