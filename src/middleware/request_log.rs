//! Correlation id, request logging, and timing.
//!
//! Accepts an inbound `X-Correlation-ID` or mints one, scopes it into the
//! task-local so error envelopes can reference it, and echoes it back on
//! the response. Requests slower than the configured threshold are logged
//! at WARN.

use axum::{
    extract::Request,
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use uuid::Uuid;

use crate::application::config::CONFIG;
use crate::context::CORRELATION_ID;

/// Correlation id extension, consumed by the tenant middleware when it
/// builds the request context.
#[derive(Clone, Debug)]
pub struct CorrelationId(pub String);

pub async fn request_log(mut req: Request, next: Next) -> Response {
    let correlation_id = req
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));

    let method: Method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let mut response = CORRELATION_ID
        .scope(correlation_id.clone(), next.run(req))
        .await;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if elapsed_ms > CONFIG.server.slow_request_threshold_ms {
        tracing::warn!(
            %method,
            path,
            status,
            duration_ms = elapsed_ms,
            correlation_id,
            "slow request"
        );
    } else {
        tracing::info!(
            %method,
            path,
            status,
            duration_ms = elapsed_ms,
            correlation_id,
            "request completed"
        );
    }

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert("x-correlation-id", value);
    }
    response
}
