use std::env;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// PEM file holding the active RS256 signing key.
    pub jwt_private_key_path: String,
    /// PEM file holding the public half of the active signing key.
    pub jwt_public_key_path: String,
    /// Additional trusted public keys (comma-separated paths) so tokens
    /// signed by a previous key verify during rotation.
    pub jwt_extra_public_key_paths: Vec<String>,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    /// Apex host; tenants resolve from `{subdomain}.{apex}`.
    pub apex_domain: String,
    /// Issuer label embedded in TOTP provisioning URIs.
    pub totp_issuer: String,
    /// Breached-password range endpoint (k-anonymity prefix appended).
    pub breach_oracle_url: String,
    pub breach_oracle_timeout_secs: u64,
    /// When true, an unreachable oracle rejects registration instead of
    /// skipping the check.
    pub breach_fail_closed: bool,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            jwt_private_key_path: env::var("TASKHIVE_JWT_PRIVATE_KEY_PATH")
                .unwrap_or_else(|_| "keys/jwt_private.pem".to_string()),
            jwt_public_key_path: env::var("TASKHIVE_JWT_PUBLIC_KEY_PATH")
                .unwrap_or_else(|_| "keys/jwt_public.pem".to_string()),
            jwt_extra_public_key_paths: env::var("TASKHIVE_JWT_EXTRA_PUBLIC_KEY_PATHS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            access_token_ttl_minutes: env::var("TASKHIVE_ACCESS_TOKEN_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            refresh_token_ttl_days: env::var("TASKHIVE_REFRESH_TOKEN_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7),
            apex_domain: env::var("TASKHIVE_APEX_DOMAIN")
                .unwrap_or_else(|_| "taskhive.local".to_string()),
            totp_issuer: env::var("TASKHIVE_TOTP_ISSUER")
                .unwrap_or_else(|_| "Taskhive".to_string()),
            breach_oracle_url: env::var("TASKHIVE_BREACH_ORACLE_URL")
                .unwrap_or_else(|_| "https://api.pwnedpasswords.com/range".to_string()),
            breach_oracle_timeout_secs: env::var("TASKHIVE_BREACH_ORACLE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            breach_fail_closed: env::var("TASKHIVE_BREACH_FAIL_CLOSED")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),
        }
    }
}
