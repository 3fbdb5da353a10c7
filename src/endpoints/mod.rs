pub mod audit;
pub mod auth;
pub mod tasks;
pub mod tenants;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

use crate::application::state::AppState;

/// Create the main API router. Middleware layers are applied by the
/// bootstrapper around this router.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/auth", auth::auth_routes(state.clone()))
        .nest("/tasks", tasks::task_routes(state.clone()))
        .nest("/tenants", tenants::tenant_routes(state.clone()))
        .nest("/audit", audit::audit_routes(state.clone()));

    let probes = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/live", get(live))
        .with_state(state);

    Router::new().merge(probes).nest("/api/v1", api)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "Taskhive API",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
}

/// Health check: reports database connectivity. The cache is
/// non-authoritative and deliberately does not gate health.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database_ok = state.db.ping().await.is_ok();

    let status = if database_ok { "healthy" } else { "unhealthy" };
    let code = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(json!({
            "status": status,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION"),
            "database": if database_ok { "connected" } else { "disconnected" },
            "cache": "best-effort",
        })),
    )
}

/// Readiness probe: can the service take traffic.
async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::error!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "not_ready", "reason": "database unavailable" })),
            )
        }
    }
}

/// Liveness probe.
async fn live() -> Json<serde_json::Value> {
    Json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
