//! Breached-password oracle client.
//!
//! k-anonymity range lookup: only the first five hex characters of the
//! SHA-1 digest leave the process; the full digest is matched locally
//! against the returned suffix list.

use sha1::{Digest, Sha1};
use std::time::Duration;

use crate::application::config::CONFIG;

/// Outcome of a breach check. `Skipped` means the oracle was unreachable
/// and the deployment policy is fail-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreachCheck {
    Clean,
    Compromised,
    Skipped,
}

pub struct BreachOracle {
    client: reqwest::Client,
    base_url: String,
}

impl Default for BreachOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl BreachOracle {
    pub fn new() -> Self {
        Self::with_base_url(CONFIG.auth.breach_oracle_url.clone())
    }

    pub fn with_base_url(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(CONFIG.auth.breach_oracle_timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, base_url }
    }

    /// Check a password against the oracle. Oracle failures degrade to
    /// `Skipped` with a WARN; callers apply the fail-open/fail-closed
    /// policy.
    pub async fn check(&self, password: &str) -> BreachCheck {
        let (prefix, suffix) = sha1_prefix_suffix(password);
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), prefix);

        let response = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!(status = %r.status(), "breach oracle returned non-success; skipping check");
                return BreachCheck::Skipped;
            }
            Err(e) => {
                tracing::warn!(error = %e, "breach oracle unreachable; skipping check");
                return BreachCheck::Skipped;
            }
        };

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "breach oracle body unreadable; skipping check");
                return BreachCheck::Skipped;
            }
        };

        if suffix_is_listed(&body, &suffix) {
            BreachCheck::Compromised
        } else {
            BreachCheck::Clean
        }
    }
}

/// Split the uppercase SHA-1 hex digest into the 5-char query prefix and
/// the 35-char suffix matched locally.
pub fn sha1_prefix_suffix(password: &str) -> (String, String) {
    let digest = hex::encode_upper(Sha1::digest(password.as_bytes()));
    (digest[..5].to_string(), digest[5..].to_string())
}

/// Range responses are `SUFFIX:COUNT` lines.
pub fn suffix_is_listed(body: &str, suffix: &str) -> bool {
    body.lines().any(|line| {
        line.split(':')
            .next()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case(suffix))
    })
}
