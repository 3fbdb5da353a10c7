//! Short-TTL response cache for task reads.
//!
//! Caches successful JSON GET responses under the tenant's `tasks:`
//! namespace, keyed per user so authorization differences never bleed
//! between callers. Task mutations invalidate the namespace through the
//! outbox cache-invalidation subscriber.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::{header, HeaderValue, Method, StatusCode};
use http_body_util::BodyExt;

use crate::application::config::CONFIG;
use crate::application::state::AppState;
use crate::context::RequestContext;
use crate::services::cache::CacheService;

/// Only cacheable surface: task reads.
const CACHED_PREFIX: &str = "/api/v1/tasks";

pub async fn response_cache(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if req.method() != Method::GET || !req.uri().path().starts_with(CACHED_PREFIX) {
        return next.run(req).await;
    }
    let Some(ctx) = req.extensions().get::<RequestContext>().cloned() else {
        return next.run(req).await;
    };
    let Some(user_id) = ctx.user_id else {
        return next.run(req).await;
    };

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let key = CacheService::tenant_key(
        ctx.tenant_id,
        &format!("tasks:http:{user_id}:{path_and_query}"),
    );

    if let Some(cached) = state.cache.get(&key).await {
        tracing::debug!(key, "response cache hit");
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-cache", "hit")
            .body(Body::from(cached))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }

    let response = next.run(req).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    if let Ok(text) = std::str::from_utf8(&bytes) {
        state
            .cache
            .set(&key, text, CONFIG.cache.response_cache_ttl_secs)
            .await;
    }

    let mut response = Response::from_parts(parts, Body::from(bytes));
    response
        .headers_mut()
        .insert("x-cache", HeaderValue::from_static("miss"));
    response
}
