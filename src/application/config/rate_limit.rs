use std::env;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Default per-tenant request quota per minute. Tenant settings may
    /// override this per deployment.
    pub per_minute: u64,
}

impl RateLimitConfig {
    pub fn from_env(problems: &mut Vec<String>) -> Self {
        let per_minute = match env::var("TASKHIVE_RATE_LIMIT_PER_MINUTE") {
            Ok(v) => match v.parse() {
                Ok(n) => n,
                Err(_) => {
                    problems.push(format!(
                        "TASKHIVE_RATE_LIMIT_PER_MINUTE is not a number: {v}"
                    ));
                    60
                }
            },
            Err(_) => 60,
        };

        Self {
            enabled: env::var("TASKHIVE_RATE_LIMIT_ENABLED")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
            per_minute,
        }
    }
}
