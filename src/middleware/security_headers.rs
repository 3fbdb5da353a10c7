//! HTTP security headers middleware
//!
//! Adds standard security headers to every HTTP response to protect
//! against common web vulnerabilities such as clickjacking, MIME sniffing,
//! and protocol downgrade.

use axum::{extract::Request, middleware::Next, response::Response};
use http::HeaderValue;

/// Middleware that injects HTTP security headers into every response.
pub async fn security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        "strict-transport-security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'self'"),
    );
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn dummy_handler() -> &'static str {
        "ok"
    }

    fn test_app() -> Router {
        Router::new()
            .route("/test", get(dummy_handler))
            .layer(middleware::from_fn(security_headers))
    }

    async fn get_response() -> axum::response::Response {
        test_app()
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_hsts_header() {
        let response = get_response().await;
        assert_eq!(response.status(), StatusCode::OK);
        let hsts = response
            .headers()
            .get("strict-transport-security")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(hsts.contains("max-age=31536000"));
    }

    #[tokio::test]
    async fn test_x_frame_options_deny() {
        let response = get_response().await;
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn test_content_security_policy() {
        let response = get_response().await;
        let csp = response
            .headers()
            .get("content-security-policy")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(csp.contains("default-src 'self'"));
    }

    #[tokio::test]
    async fn test_permissions_policy() {
        let response = get_response().await;
        let policy = response
            .headers()
            .get("permissions-policy")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(policy.contains("geolocation=()"));
        assert!(policy.contains("camera=()"));
    }

    #[tokio::test]
    async fn test_all_six_headers_present() {
        let response = get_response().await;
        let headers = response.headers();
        for name in [
            "strict-transport-security",
            "x-frame-options",
            "x-content-type-options",
            "referrer-policy",
            "content-security-policy",
            "permissions-policy",
        ] {
            assert!(headers.contains_key(name), "missing {name}");
        }
    }
}
