//! Task lifecycle: state machine over HTTP, optimistic concurrency,
//! comments, statistics, soft delete.

mod common;

use common::*;
use http::StatusCode;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde_json::json;
use taskhive::domain::authorization::Role;
use taskhive::models::prelude::*;
use uuid::Uuid;

struct TaskFixture {
    harness: TestApp,
    tenant_id: Uuid,
    member_access: String,
    admin_access: String,
    assignee_id: Uuid,
}

async fn fixture() -> TaskFixture {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Acme", "acme").await;
    let assignee =
        seed_user(&harness.db, tenant.id, "worker@example.com", GOOD_PASSWORD, vec![Role::Member])
            .await;
    seed_user(&harness.db, tenant.id, "lead@example.com", GOOD_PASSWORD, vec![Role::ProjectManager])
        .await;
    seed_user(&harness.db, tenant.id, "boss@example.com", GOOD_PASSWORD, vec![Role::TenantAdmin])
        .await;

    let (member_access, _) =
        login(&harness.app, tenant.id, "lead@example.com", GOOD_PASSWORD).await;
    let (admin_access, _) =
        login(&harness.app, tenant.id, "boss@example.com", GOOD_PASSWORD).await;

    TaskFixture {
        harness,
        tenant_id: tenant.id,
        member_access,
        admin_access,
        assignee_id: assignee.id,
    }
}

impl TaskFixture {
    async fn create_task(&self, title: &str) -> serde_json::Value {
        let (status, body) = send_json(
            &self.harness.app,
            "POST",
            "/api/v1/tasks",
            Some(self.tenant_id),
            Some(&self.member_access),
            Some(json!({ "project_id": Uuid::new_v4(), "title": title })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"].clone()
    }

    async fn change_status(
        &self,
        task_id: &str,
        status_value: &str,
        reason: Option<&str>,
        access: &str,
    ) -> (StatusCode, serde_json::Value) {
        send_json(
            &self.harness.app,
            "PATCH",
            &format!("/api/v1/tasks/{task_id}/status"),
            Some(self.tenant_id),
            Some(access),
            Some(json!({ "status": status_value, "reason": reason })),
        )
        .await
    }
}

/// TODO -> DONE is rejected; the legal path bumps the
/// version at each step and leaves four status events in the outbox.
#[tokio::test]
async fn status_transitions_follow_the_state_machine() {
    let f = fixture().await;
    let task = f.create_task("ship the feature").await;
    let task_id = task["id"].as_str().unwrap();
    assert_eq!(task["status"], "TODO");
    assert_eq!(task["version"], 1);

    // Straight to DONE is not a legal edge.
    let (status, body) = f
        .change_status(task_id, "DONE", None, &f.member_access)
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(error_code(&body), "INVALID_TRANSITION");

    // TODO -> IN_PROGRESS.
    let (status, body) = f
        .change_status(task_id, "IN_PROGRESS", None, &f.member_access)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["version"], 2);

    // IN_REVIEW requires an assignee.
    let (status, body) = f
        .change_status(task_id, "IN_REVIEW", None, &f.member_access)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "INVALID_TRANSITION");

    let (status, body) = send_json(
        &f.harness.app,
        "PATCH",
        &format!("/api/v1/tasks/{task_id}/assign"),
        Some(f.tenant_id),
        Some(&f.member_access),
        Some(json!({ "assigned_to_user_id": f.assignee_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["version"], 3);

    let (status, body) = f
        .change_status(task_id, "IN_REVIEW", None, &f.member_access)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["version"], 4);

    let (status, body) = f
        .change_status(task_id, "DONE", None, &f.member_access)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["version"], 5);

    // DONE is terminal for non-admins; admins may still cancel.
    let (status, _) = f
        .change_status(task_id, "IN_PROGRESS", None, &f.member_access)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = f
        .change_status(task_id, "CANCELLED", None, &f.member_access)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, body) = f
        .change_status(task_id, "CANCELLED", None, &f.admin_access)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    // Four TaskStatusChanged events committed through the outbox, in order.
    let events = OutboxEvent::find()
        .filter(outbox_event::Column::AggregateId.eq(Uuid::parse_str(task_id).unwrap()))
        .filter(outbox_event::Column::EventType.eq("TaskStatusChanged"))
        .order_by_asc(outbox_event::Column::Id)
        .all(&f.harness.db)
        .await
        .unwrap();
    let hops: Vec<(String, String)> = events
        .iter()
        .map(|e| {
            (
                e.payload["from"].as_str().unwrap().to_string(),
                e.payload["to"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        hops,
        vec![
            ("TODO".into(), "IN_PROGRESS".into()),
            ("IN_PROGRESS".into(), "IN_REVIEW".into()),
            ("IN_REVIEW".into(), "DONE".into()),
            ("DONE".into(), "CANCELLED".into()),
        ]
    );
}

#[tokio::test]
async fn blocked_status_requires_a_reason() {
    let f = fixture().await;
    let task = f.create_task("stuck work").await;
    let task_id = task["id"].as_str().unwrap();

    let (status, body) = f
        .change_status(task_id, "BLOCKED", None, &f.member_access)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "INVALID_TRANSITION");

    let (status, body) = f
        .change_status(task_id, "BLOCKED", Some("waiting on vendor"), &f.member_access)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["blocked_reason"], "waiting on vendor");
}

/// Two clients read version 3, both write; the second one
/// loses with CONFLICT.
#[tokio::test]
async fn stale_update_is_a_conflict() {
    let f = fixture().await;
    let task = f.create_task("contended work").await;
    let task_id = task["id"].as_str().unwrap();
    let version = task["version"].as_i64().unwrap();

    let (status, body) = send_json(
        &f.harness.app,
        "PUT",
        &format!("/api/v1/tasks/{task_id}"),
        Some(f.tenant_id),
        Some(&f.member_access),
        Some(json!({ "version": version, "title": "first writer wins" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["version"], version + 1);

    let (status, body) = send_json(
        &f.harness.app,
        "PUT",
        &format!("/api/v1/tasks/{task_id}"),
        Some(f.tenant_id),
        Some(&f.member_access),
        Some(json!({ "version": version, "title": "second writer loses" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(error_code(&body), "CONFLICT");

    let (_, body) = send_json(
        &f.harness.app,
        "GET",
        &format!("/api/v1/tasks/{task_id}"),
        Some(f.tenant_id),
        Some(&f.member_access),
        None,
    )
    .await;
    assert_eq!(body["data"]["title"], "first writer wins");
}

#[tokio::test]
async fn assignment_validates_the_assignee() {
    let f = fixture().await;
    let task = f.create_task("orphan work").await;
    let task_id = task["id"].as_str().unwrap();

    let (status, body) = send_json(
        &f.harness.app,
        "PATCH",
        &format!("/api/v1/tasks/{task_id}/assign"),
        Some(f.tenant_id),
        Some(&f.member_access),
        Some(json!({ "assigned_to_user_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(error_code(&body), "VALIDATION_ERROR");
}

#[tokio::test]
async fn comments_append_and_list_in_order() {
    let f = fixture().await;
    let task = f.create_task("discussed work").await;
    let task_id = task["id"].as_str().unwrap();

    for text in ["first note", "second note"] {
        let (status, body) = send_json(
            &f.harness.app,
            "POST",
            &format!("/api/v1/tasks/{task_id}/comments"),
            Some(f.tenant_id),
            Some(&f.member_access),
            Some(json!({ "content": text })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    // Empty comments are rejected.
    let (status, _) = send_json(
        &f.harness.app,
        "POST",
        &format!("/api/v1/tasks/{task_id}/comments"),
        Some(f.tenant_id),
        Some(&f.member_access),
        Some(json!({ "content": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send_json(
        &f.harness.app,
        "GET",
        &format!("/api/v1/tasks/{task_id}/comments"),
        Some(f.tenant_id),
        Some(&f.member_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let comments = body["data"].as_array().unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0]["content"], "first note");
    assert_eq!(comments[1]["content"], "second note");
}

#[tokio::test]
async fn delete_is_soft_and_hides_the_task() {
    let f = fixture().await;
    let task = f.create_task("doomed work").await;
    let task_id: Uuid = task["id"].as_str().unwrap().parse().unwrap();

    // Members lack tasks.delete; tenant admins carry tasks.*.
    let (status, _) = send_json(
        &f.harness.app,
        "DELETE",
        &format!("/api/v1/tasks/{task_id}"),
        Some(f.tenant_id),
        Some(&f.member_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send_json(
        &f.harness.app,
        "DELETE",
        &format!("/api/v1/tasks/{task_id}"),
        Some(f.tenant_id),
        Some(&f.admin_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Reads now miss, but the row survives for audit.
    let (status, _) = send_json(
        &f.harness.app,
        "GET",
        &format!("/api/v1/tasks/{task_id}"),
        Some(f.tenant_id),
        Some(&f.member_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let row = Task::find_by_id(task_id).one(&f.harness.db).await.unwrap().unwrap();
    assert!(row.is_deleted);
    assert_eq!(row.title, "doomed work");

    // Reading one's own soft-deleted task is an ordinary miss, not a
    // cross-tenant attempt.
    let attempts = AuditLog::find()
        .filter(audit_log::Column::Action.eq("cross_tenant_access_denied"))
        .all(&f.harness.db)
        .await
        .unwrap();
    assert!(attempts.is_empty());
}

#[tokio::test]
async fn statistics_require_reports_permission() {
    let f = fixture().await;
    f.create_task("counted work").await;

    let task = f.create_task("late work").await;
    let task_id = task["id"].as_str().unwrap();
    let (status, _) = f
        .change_status(task_id, "IN_PROGRESS", None, &f.member_access)
        .await;
    assert_eq!(status, StatusCode::OK);

    // The worker account has only MEMBER defaults, which lack reports.view.
    let (worker_access, _) =
        login(&f.harness.app, f.tenant_id, "worker@example.com", GOOD_PASSWORD).await;
    let (status, _) = send_json(
        &f.harness.app,
        "GET",
        "/api/v1/tasks/reports/statistics",
        Some(f.tenant_id),
        Some(&worker_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send_json(
        &f.harness.app,
        "GET",
        "/api/v1/tasks/reports/statistics",
        Some(f.tenant_id),
        Some(&f.member_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["total_tasks"], 2);
    assert_eq!(body["data"]["tasks_by_status"]["TODO"], 1);
    assert_eq!(body["data"]["tasks_by_status"]["IN_PROGRESS"], 1);
}

#[tokio::test]
async fn guests_cannot_create_tasks() {
    let harness = spawn_app().await;
    let tenant = seed_tenant(&harness.db, "Acme", "acme").await;
    seed_user(&harness.db, tenant.id, "guest@example.com", GOOD_PASSWORD, vec![Role::Guest]).await;

    let (access, _) = login(&harness.app, tenant.id, "guest@example.com", GOOD_PASSWORD).await;
    let (status, body) = send_json(
        &harness.app,
        "POST",
        "/api/v1/tasks",
        Some(tenant.id),
        Some(&access),
        Some(json!({ "project_id": Uuid::new_v4(), "title": "not allowed" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_eq!(error_code(&body), "FORBIDDEN");
}
