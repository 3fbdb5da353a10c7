//! Application bootstrapper
//!
//! Phased startup: tracing, configuration validation, database and
//! migrations, signing keys, cache, outbox worker, then the HTTP server.
//! Each phase maps onto the process exit codes: configuration failures are
//! exit 1, unavailable dependencies are exit 2.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware as axum_middleware, Router};
use http::HeaderValue;
use tokio::sync::watch;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::application::config::{ConfigError, CONFIG};
use crate::application::database;
use crate::application::state::AppState;
use crate::endpoints;
use crate::middleware::{
    rate_limit, request_log, require_auth, resolve_tenant, response_cache, security_headers,
};
use crate::services::outbox::{AuditSubscriber, CacheInvalidationSubscriber, EventSubscriber};
use crate::services::{security, AuditService, BreachOracle, CacheService, OutboxNotifier,
    OutboxWorker};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("dependency unavailable: {0}")]
    Dependency(String),
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

/// Bootstrap and run the application
pub async fn run() -> Result<(), StartupError> {
    init_tracing();

    tracing::info!("Starting taskhive backend v{}", env!("CARGO_PKG_VERSION"));

    CONFIG.validate()?;

    let db = database::connect()
        .await
        .map_err(|e| StartupError::Dependency(e.to_string()))?;

    security::init_signing_keys().map_err(|e| StartupError::Dependency(e.to_string()))?;
    tracing::info!("JWT signing keys loaded");

    let cache = CacheService::new();
    cache.connect(&CONFIG.cache.redis_url).await;

    let notifier = OutboxNotifier::default();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = AppState::new(
        db.clone(),
        cache.clone(),
        AuditService::new(),
        Arc::new(BreachOracle::new()),
        notifier.clone(),
    );

    let subscribers: Vec<Arc<dyn EventSubscriber>> = vec![
        Arc::new(CacheInvalidationSubscriber::new(cache.clone())),
        Arc::new(AuditSubscriber::new(db.clone())),
    ];
    let worker = OutboxWorker::new(db, subscribers, notifier, shutdown_rx);
    let worker_handle = tokio::spawn(worker.run());
    tracing::info!("Outbox worker started");

    let app = create_app(state);
    serve(app).await?;

    // Server stopped; let the outbox worker drain in-flight events.
    let _ = shutdown_tx.send(true);
    let grace = std::time::Duration::from_secs(CONFIG.outbox.shutdown_grace_secs + 1);
    if tokio::time::timeout(grace, worker_handle).await.is_err() {
        tracing::warn!("outbox worker did not stop within the grace period");
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("taskhive={}", CONFIG.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_ansi(false))
        .init();
}

/// Assemble the router with the full middleware pipeline. Layers are added
/// innermost-first, giving the runtime order: request log, security
/// headers, tenant resolution, authentication, rate limiting, response
/// cache, CORS, routes.
pub fn create_app(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = CONFIG
        .server
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    endpoints::create_router(state.clone())
        .layer(cors)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            response_cache,
        ))
        .layer(axum_middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(axum_middleware::from_fn(require_auth))
        .layer(axum_middleware::from_fn_with_state(state, resolve_tenant))
        .layer(axum_middleware::from_fn(security_headers))
        .layer(axum_middleware::from_fn(request_log))
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server with graceful shutdown on SIGINT.
async fn serve(app: Router) -> Result<(), StartupError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], CONFIG.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| StartupError::Dependency(format!("failed to bind {addr}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .map_err(|e| StartupError::Runtime(anyhow::anyhow!(e)))?;

    Ok(())
}
