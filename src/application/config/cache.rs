use std::env;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    /// Deadline for any single cache operation. The cache is never on a
    /// correctness-critical path, so slow answers are treated as misses.
    pub operation_timeout_ms: u64,
    /// TTL for the subdomain -> tenant id resolution namespace.
    pub tenant_resolution_ttl_secs: u64,
    /// TTL for cached GET responses.
    pub response_cache_ttl_secs: u64,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            redis_url: env::var("TASKHIVE_REDIS_URL")
                .or_else(|_| env::var("REDIS_URL"))
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            operation_timeout_ms: env::var("TASKHIVE_CACHE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(200),
            tenant_resolution_ttl_secs: env::var("TASKHIVE_TENANT_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            response_cache_ttl_secs: env::var("TASKHIVE_RESPONSE_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        }
    }
}
