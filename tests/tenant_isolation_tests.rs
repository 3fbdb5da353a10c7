//! Tenant resolution and isolation: the cross-tenant scenarios from the
//! security contract.

mod common;

use common::*;
use http::StatusCode;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use taskhive::domain::authorization::Role;
use taskhive::models::prelude::*;

async fn create_task_via_api(
    harness: &TestApp,
    tenant_id: uuid::Uuid,
    access: &str,
    title: &str,
) -> uuid::Uuid {
    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/tasks",
        Some(tenant_id),
        Some(access),
        Some(json!({ "project_id": uuid::Uuid::new_v4(), "title": title })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().parse().unwrap()
}

/// A task in tenant A is invisible from tenant B (404), and
/// presenting tenant A's header with tenant B's token is a mismatch (400).
#[tokio::test]
async fn cross_tenant_read_is_blocked() {
    let harness = spawn_app().await;
    let tenant_a = seed_tenant(&harness.db, "Tenant A", "alpha").await;
    let tenant_b = seed_tenant(&harness.db, "Tenant B", "beta").await;
    seed_user(&harness.db, tenant_a.id, "ua@example.com", GOOD_PASSWORD, vec![Role::Member]).await;
    seed_user(&harness.db, tenant_b.id, "ub@example.com", GOOD_PASSWORD, vec![Role::Member]).await;

    let (access_a, _) = login(&harness.app, tenant_a.id, "ua@example.com", GOOD_PASSWORD).await;
    let task_id = create_task_via_api(&harness, tenant_a.id, &access_a, "secret work").await;

    let (access_b, _) = login(&harness.app, tenant_b.id, "ub@example.com", GOOD_PASSWORD).await;

    // Valid bearer for tenant B: the task does not exist in B.
    let (status, body) = send_json(
        &harness.app,
        "GET",
        &format!("/api/v1/tasks/{task_id}"),
        Some(tenant_b.id),
        Some(&access_b),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
    assert_eq!(error_code(&body), "NOT_FOUND");

    // The attempt is recorded in tenant B's audit trail.
    let attempts = AuditLog::find()
        .filter(audit_log::Column::TenantId.eq(tenant_b.id))
        .filter(audit_log::Column::Action.eq("cross_tenant_access_denied"))
        .all(&harness.db)
        .await
        .unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].target_id.as_deref(), Some(task_id.to_string().as_str()));

    // Tenant A header with tenant B's token: signals disagree.
    let (status, body) = send_json(
        &harness.app,
        "GET",
        &format!("/api/v1/tasks/{task_id}"),
        Some(tenant_a.id),
        Some(&access_b),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(error_code(&body), "TENANT_MISMATCH");
}

/// Cross-tenant attempts against write endpoints roll their command
/// transaction back, but the audit entry must survive that rollback.
#[tokio::test]
async fn cross_tenant_write_attempt_is_audited_despite_rollback() {
    let harness = spawn_app().await;
    let tenant_a = seed_tenant(&harness.db, "Tenant A", "alpha").await;
    let tenant_b = seed_tenant(&harness.db, "Tenant B", "beta").await;
    seed_user(&harness.db, tenant_a.id, "ua@example.com", GOOD_PASSWORD, vec![Role::Member]).await;
    seed_user(&harness.db, tenant_b.id, "ub@example.com", GOOD_PASSWORD, vec![Role::Member]).await;

    let (access_a, _) = login(&harness.app, tenant_a.id, "ua@example.com", GOOD_PASSWORD).await;
    let task_id = create_task_via_api(&harness, tenant_a.id, &access_a, "private work").await;

    let (access_b, _) = login(&harness.app, tenant_b.id, "ub@example.com", GOOD_PASSWORD).await;
    let (status, body) = send_json(
        &harness.app,
        "PATCH",
        &format!("/api/v1/tasks/{task_id}/status"),
        Some(tenant_b.id),
        Some(&access_b),
        Some(json!({ "status": "IN_PROGRESS" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
    assert_eq!(error_code(&body), "NOT_FOUND");

    // The command transaction rolled back, the audit entry did not.
    let attempts = AuditLog::find()
        .filter(audit_log::Column::TenantId.eq(tenant_b.id))
        .filter(audit_log::Column::Action.eq("cross_tenant_access_denied"))
        .all(&harness.db)
        .await
        .unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(
        attempts[0].target_id.as_deref(),
        Some(task_id.to_string().as_str())
    );

    // And the task itself is untouched.
    let row = Task::find_by_id(task_id).one(&harness.db).await.unwrap().unwrap();
    assert_eq!(row.status, taskhive::models::task::TaskStatus::Todo);
    assert_eq!(row.version, 1);
}

#[tokio::test]
async fn listing_never_leaks_other_tenants() {
    let harness = spawn_app().await;
    let tenant_a = seed_tenant(&harness.db, "Tenant A", "alpha").await;
    let tenant_b = seed_tenant(&harness.db, "Tenant B", "beta").await;
    seed_user(&harness.db, tenant_a.id, "ua@example.com", GOOD_PASSWORD, vec![Role::TenantAdmin])
        .await;
    seed_user(&harness.db, tenant_b.id, "ub@example.com", GOOD_PASSWORD, vec![Role::TenantAdmin])
        .await;

    let (access_a, _) = login(&harness.app, tenant_a.id, "ua@example.com", GOOD_PASSWORD).await;
    let (access_b, _) = login(&harness.app, tenant_b.id, "ub@example.com", GOOD_PASSWORD).await;

    create_task_via_api(&harness, tenant_a.id, &access_a, "a-task-1").await;
    create_task_via_api(&harness, tenant_a.id, &access_a, "a-task-2").await;
    create_task_via_api(&harness, tenant_b.id, &access_b, "b-task-1").await;

    let (status, body) = send_json(
        &harness.app,
        "GET",
        "/api/v1/tasks",
        Some(tenant_b.id),
        Some(&access_b),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "b-task-1");
    assert_eq!(body["metadata"]["pagination"]["total"], 1);
}

#[tokio::test]
async fn subdomain_resolves_the_tenant() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Gamma Corp", "gamma").await;
    seed_user(&harness.db, tenant.id, "sub@example.com", GOOD_PASSWORD, vec![Role::Member]).await;

    // Login using only the Host header for tenant resolution.
    let apex = &taskhive::config::CONFIG.auth.apex_domain;
    let request = http::Request::builder()
        .method("POST")
        .uri("/api/v1/auth/login")
        .header(http::header::CONTENT_TYPE, "application/json")
        .header(http::header::HOST, format!("gamma.{apex}"))
        .body(axum::body::Body::from(
            json!({ "email": "sub@example.com", "password": GOOD_PASSWORD }).to_string(),
        ))
        .unwrap();

    let response = tower::ServiceExt::oneshot(harness.app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_subdomain_is_not_found() {
    let harness = spawn_app().await;
    let apex = &taskhive::config::CONFIG.auth.apex_domain;

    let request = http::Request::builder()
        .method("POST")
        .uri("/api/v1/auth/login")
        .header(http::header::CONTENT_TYPE, "application/json")
        .header(http::header::HOST, format!("ghost.{apex}"))
        .body(axum::body::Body::from(
            json!({ "email": "x@example.com", "password": GOOD_PASSWORD }).to_string(),
        ))
        .unwrap();

    let response = tower::ServiceExt::oneshot(harness.app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inactive_tenant_is_rejected() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Dormant", "dormant").await;
    seed_user(&harness.db, tenant.id, "zed@example.com", GOOD_PASSWORD, vec![Role::Member]).await;

    let mut active: tenant::ActiveModel = sea_orm::IntoActiveModel::into_active_model(tenant.clone());
    active.is_active = sea_orm::Set(false);
    sea_orm::ActiveModelTrait::update(active, &harness.db)
        .await
        .unwrap();

    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/auth/login",
        Some(tenant.id),
        None,
        Some(json!({ "email": "zed@example.com", "password": GOOD_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
}

#[tokio::test]
async fn tenant_creation_is_system_admin_only() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Root", "root-org").await;
    seed_user(&harness.db, tenant.id, "admin@example.com", GOOD_PASSWORD, vec![Role::SystemAdmin])
        .await;
    seed_user(&harness.db, tenant.id, "pleb@example.com", GOOD_PASSWORD, vec![Role::Member]).await;

    let (member_access, _) =
        login(&harness.app, tenant.id, "pleb@example.com", GOOD_PASSWORD).await;
    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/tenants",
        Some(tenant.id),
        Some(&member_access),
        Some(json!({ "name": "Intruder Inc", "subdomain": "intruder" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_eq!(error_code(&body), "FORBIDDEN");

    let (admin_access, _) =
        login(&harness.app, tenant.id, "admin@example.com", GOOD_PASSWORD).await;
    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/tenants",
        Some(tenant.id),
        Some(&admin_access),
        Some(json!({ "name": "New Org", "subdomain": "neworg" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    // Reserved subdomains are refused.
    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/tenants",
        Some(tenant.id),
        Some(&admin_access),
        Some(json!({ "name": "Sneaky", "subdomain": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn audit_listing_is_tenant_scoped_and_admin_only() {
    let harness = spawn_app().await;
    let tenant_a = seed_tenant(&harness.db, "Tenant A", "alpha").await;
    let tenant_b = seed_tenant(&harness.db, "Tenant B", "beta").await;
    seed_user(&harness.db, tenant_a.id, "admin-a@example.com", GOOD_PASSWORD, vec![Role::TenantAdmin])
        .await;
    seed_user(&harness.db, tenant_a.id, "member-a@example.com", GOOD_PASSWORD, vec![Role::Member])
        .await;

    // Write one audit entry per tenant directly.
    for tenant_id in [tenant_a.id, tenant_b.id] {
        harness
            .state
            .audit
            .log(
                &harness.db,
                tenant_id,
                None,
                taskhive::models::audit_log::AuditAction::Login,
                taskhive::models::audit_log::TargetType::User,
                None,
                json!({}),
            )
            .await
            .unwrap();
    }

    let (member_access, _) =
        login(&harness.app, tenant_a.id, "member-a@example.com", GOOD_PASSWORD).await;
    let (status, _) = send_json(
        &harness.app,
        "GET",
        "/api/v1/audit",
        Some(tenant_a.id),
        Some(&member_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (admin_access, _) =
        login(&harness.app, tenant_a.id, "admin-a@example.com", GOOD_PASSWORD).await;
    let (status, body) = send_json(
        &harness.app,
        "GET",
        "/api/v1/audit",
        Some(tenant_a.id),
        Some(&admin_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    // Only tenant A's entry is visible; tenant B's row stays invisible.
    assert!(!entries.is_empty());
    for entry in entries {
        assert_eq!(entry["tenant_id"], tenant_a.id.to_string());
    }
}
