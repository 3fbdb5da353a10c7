//! Namespaced cache over Redis.
//!
//! The cache is never on a correctness-critical path: when the backend is
//! missing or slow, reads are misses and writes drop with a WARN. Keys are
//! always prefixed `tenant:{tenant_id}:...`, except the tenant-resolution
//! namespace `tenant:subdomain:{sub}`.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::config::CONFIG;

#[derive(Clone, Default)]
pub struct CacheService {
    conn: Arc<RwLock<Option<ConnectionManager>>>,
}

impl CacheService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to connect. A failure leaves the service degraded rather than
    /// failing startup.
    pub async fn connect(&self, url: &str) {
        match redis::Client::open(url) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(manager) => {
                    *self.conn.write().await = Some(manager);
                    tracing::info!("cache connected");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cache unavailable; running without it");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "invalid cache URL; running without cache");
            }
        }
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        self.conn.read().await.clone()
    }

    fn op_timeout() -> Duration {
        Duration::from_millis(CONFIG.cache.operation_timeout_ms)
    }

    /// Key inside a tenant's namespace.
    pub fn tenant_key(tenant_id: Uuid, rest: &str) -> String {
        format!("tenant:{tenant_id}:{rest}")
    }

    /// Key in the subdomain-resolution namespace.
    pub fn subdomain_key(subdomain: &str) -> String {
        format!("tenant:subdomain:{subdomain}")
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.connection().await?;
        match tokio::time::timeout(Self::op_timeout(), conn.get::<_, Option<String>>(key)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                tracing::warn!(key, error = %e, "cache GET failed");
                None
            }
            Err(_) => {
                tracing::warn!(key, "cache GET timed out");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl_secs: u64) {
        let Some(mut conn) = self.connection().await else {
            tracing::warn!(key, "cache SET dropped; no backend");
            return;
        };
        match tokio::time::timeout(
            Self::op_timeout(),
            conn.set_ex::<_, _, ()>(key, value, ttl_secs),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(key, error = %e, "cache SET failed"),
            Err(_) => tracing::warn!(key, "cache SET timed out"),
        }
    }

    pub async fn delete(&self, key: &str) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        match tokio::time::timeout(Self::op_timeout(), conn.del::<_, ()>(key)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(key, error = %e, "cache DEL failed"),
            Err(_) => tracing::warn!(key, "cache DEL timed out"),
        }
    }

    /// Delete every key under a prefix. Used by cache-invalidation
    /// subscribers after task mutations.
    pub async fn delete_by_pattern(&self, prefix: &str) {
        let Some(mut conn) = self.connection().await else {
            return;
        };

        let pattern = format!("{prefix}*");
        let keys: Vec<String> = {
            let mut collected = Vec::new();
            match conn.scan_match::<_, String>(&pattern).await {
                Ok(mut iter) => {
                    while let Some(key) = iter.next_item().await {
                        collected.push(key);
                    }
                }
                Err(e) => {
                    tracing::warn!(pattern, error = %e, "cache SCAN failed");
                    return;
                }
            }
            collected
        };

        if keys.is_empty() {
            return;
        }
        if let Err(e) = conn.del::<_, ()>(keys).await {
            tracing::warn!(pattern, error = %e, "cache pattern delete failed");
        }
    }

    /// Atomic increment with a TTL set on the first hit in the window.
    /// Returns `None` when the backend is unavailable so rate limiting can
    /// fail open.
    pub async fn incr(&self, key: &str, ttl_secs: u64) -> Option<u64> {
        let mut conn = self.connection().await?;
        let count: u64 =
            match tokio::time::timeout(Self::op_timeout(), conn.incr::<_, _, u64>(key, 1)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    tracing::warn!(key, error = %e, "cache INCR failed");
                    return None;
                }
                Err(_) => {
                    tracing::warn!(key, "cache INCR timed out");
                    return None;
                }
            };

        if count == 1 {
            if let Err(e) = conn.expire::<_, ()>(key, ttl_secs as i64).await {
                tracing::warn!(key, error = %e, "cache EXPIRE failed");
            }
        }
        Some(count)
    }
}
