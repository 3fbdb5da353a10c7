pub mod auth;
pub mod cache;
pub mod database;
pub mod outbox;
pub mod rate_limit;
pub mod server;

use once_cell::sync::Lazy;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server: server::ServerConfig,
    pub database: database::DatabaseConfig,
    pub cache: cache::CacheConfig,
    pub auth: auth::AuthConfig,
    pub rate_limit: rate_limit::RateLimitConfig,
    pub outbox: outbox::OutboxConfig,

    // Logging
    pub log_level: String,

    /// Environment variables that were required but missing or malformed.
    /// `validate()` turns these into a hard startup failure; in tests the
    /// built-in defaults apply.
    pub problems: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Environment variables that must be present for a production boot.
const REQUIRED_VARS: &[&str] = &[
    "TASKHIVE_DATABASE_URL",
    "TASKHIVE_REDIS_URL",
    "TASKHIVE_JWT_PRIVATE_KEY_PATH",
    "TASKHIVE_JWT_PUBLIC_KEY_PATH",
    "TASKHIVE_CORS_ORIGINS",
    "TASKHIVE_RATE_LIMIT_PER_MINUTE",
    "TASKHIVE_BREACH_ORACLE_URL",
];

impl Config {
    pub fn from_env() -> Self {
        let mut problems = Vec::new();
        for var in REQUIRED_VARS {
            if env::var(var).map(|v| v.trim().is_empty()).unwrap_or(true) {
                problems.push(format!("{var} is not set"));
            }
        }

        Self {
            server: server::ServerConfig::from_env(),
            database: database::DatabaseConfig::from_env(),
            cache: cache::CacheConfig::from_env(),
            auth: auth::AuthConfig::from_env(),
            rate_limit: rate_limit::RateLimitConfig::from_env(&mut problems),
            outbox: outbox::OutboxConfig::from_env(),

            log_level: env::var("TASKHIVE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            problems,
        }
    }

    /// Enforce the required-variable contract. Called once by the
    /// bootstrapper; a failure here maps to exit code 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError(self.problems.join("; ")))
        }
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_field() {
        let config = Config::from_env();
        assert!(!config.database.database_url.is_empty());
        assert!(!config.cache.redis_url.is_empty());
        assert!(config.auth.access_token_ttl_minutes > 0);
        assert!(config.rate_limit.per_minute > 0);
    }
}
