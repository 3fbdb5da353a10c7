use std::env;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Allowed CORS origins, comma-separated in the environment.
    pub cors_origins: Vec<String>,
    /// Requests slower than this are logged at WARN by the request logger.
    pub slow_request_threshold_ms: u64,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("TASKHIVE_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            cors_origins: env::var("TASKHIVE_CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            slow_request_threshold_ms: env::var("TASKHIVE_SLOW_REQUEST_THRESHOLD_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
        }
    }
}
