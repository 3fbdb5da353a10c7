use std::env;

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub poll_interval_ms: u64,
    /// Grace period granted to in-flight subscribers during shutdown.
    pub shutdown_grace_secs: u64,
}

impl OutboxConfig {
    pub fn from_env() -> Self {
        Self {
            poll_interval_ms: env::var("TASKHIVE_OUTBOX_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            shutdown_grace_secs: env::var("TASKHIVE_OUTBOX_SHUTDOWN_GRACE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}
