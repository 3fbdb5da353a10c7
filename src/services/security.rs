//! Signing keys, access tokens, password hashing, and TOTP.

use argon2::password_hash::{rand_core::OsRng as SaltRng, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

use crate::application::config::CONFIG;
use crate::application::error::{AppError, Result};
use crate::models::user;

// Argon2id parameters; embedded in the PHC hash string so a parameter
// upgrade rehashes transparently at the next successful login.
const ARGON2_MEMORY_KIB: u32 = 65536;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

/// Opaque refresh tokens carry 256 bits of entropy.
const REFRESH_TOKEN_BYTES: usize = 32;

struct SigningKey {
    kid: String,
    encoding_key: EncodingKey,
}

// Active signing key plus every trusted verification key, keyed by kid.
// Multiple verification keys let tokens signed by a previous key survive a
// rotation window.
static ACTIVE_KEY: Lazy<RwLock<Option<SigningKey>>> = Lazy::new(|| RwLock::new(None));
static TRUSTED_KEYS: Lazy<RwLock<HashMap<String, DecodingKey>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub email: String,
    pub tenant_id: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Key id derived from the public key material.
fn derive_kid(public_pem: &str) -> String {
    let digest = Sha256::digest(public_pem.as_bytes());
    hex::encode(&digest[..8])
}

/// Load the signing key pair (and any extra trusted public keys) from disk.
/// Called once at startup; a missing or malformed key file is a dependency
/// failure (exit code 2).
pub fn init_signing_keys() -> Result<()> {
    let private_pem = std::fs::read_to_string(&CONFIG.auth.jwt_private_key_path).map_err(|e| {
        AppError::internal(format!(
            "failed to read private key {}: {e}",
            CONFIG.auth.jwt_private_key_path
        ))
    })?;
    let public_pem = std::fs::read_to_string(&CONFIG.auth.jwt_public_key_path).map_err(|e| {
        AppError::internal(format!(
            "failed to read public key {}: {e}",
            CONFIG.auth.jwt_public_key_path
        ))
    })?;

    let mut extra = Vec::new();
    for path in &CONFIG.auth.jwt_extra_public_key_paths {
        let pem = std::fs::read_to_string(path)
            .map_err(|e| AppError::internal(format!("failed to read trusted key {path}: {e}")))?;
        extra.push(pem);
    }

    install_keys(&private_pem, &public_pem, &extra)
}

/// Install key material directly. The test harness uses this with a
/// generated pair so tests never touch the filesystem.
pub fn install_keys(private_pem: &str, public_pem: &str, extra_public_pems: &[String]) -> Result<()> {
    let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
        .map_err(|e| AppError::internal(format!("invalid private key: {e}")))?;
    let kid = derive_kid(public_pem);

    let mut trusted = HashMap::new();
    let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
        .map_err(|e| AppError::internal(format!("invalid public key: {e}")))?;
    trusted.insert(kid.clone(), decoding_key);

    for pem in extra_public_pems {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AppError::internal(format!("invalid trusted key: {e}")))?;
        trusted.insert(derive_kid(pem), key);
    }

    *ACTIVE_KEY.write() = Some(SigningKey { kid, encoding_key });
    *TRUSTED_KEYS.write() = trusted;
    Ok(())
}

/// Generate an RSA key pair (PEM). Used by the dev bootstrap and tests.
pub fn generate_rsa_key_pair() -> Result<(String, String)> {
    let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
        .map_err(|e| AppError::internal(format!("failed to generate RSA key: {e}")))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| AppError::internal(format!("failed to serialize private key: {e}")))?
        .to_string();
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| AppError::internal(format!("failed to serialize public key: {e}")))?;

    Ok((private_pem, public_pem))
}

/// Create a signed access token for the user. `permissions` is the
/// effective set (role defaults merged with overrides).
pub fn create_access_token(user: &user::Model, permissions: &[String]) -> Result<String> {
    let now = Utc::now();
    let exp = now + Duration::minutes(CONFIG.auth.access_token_ttl_minutes);

    let claims = AccessClaims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        tenant_id: user.tenant_id.to_string(),
        roles: user.roles.0.iter().map(|r| r.as_str().to_string()).collect(),
        permissions: permissions.to_vec(),
        department_id: user.department_id.map(|d| d.to_string()),
        jti: Uuid::new_v4().to_string(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    let guard = ACTIVE_KEY.read();
    let key = guard
        .as_ref()
        .ok_or_else(|| AppError::internal("signing keys not initialized"))?;

    let mut header = Header::new(jsonwebtoken::Algorithm::RS256);
    header.kid = Some(key.kid.clone());

    encode(&header, &claims, &key.encoding_key)
        .map_err(|e| AppError::internal(format!("failed to sign access token: {e}")))
}

/// Decode and verify an access token: RS256 only, known `kid`, unexpired.
pub fn decode_access_token(token: &str) -> Result<AccessClaims> {
    let header =
        decode_header(token).map_err(|_| AppError::unauthenticated("Invalid token header"))?;

    if header.alg != jsonwebtoken::Algorithm::RS256 {
        return Err(AppError::unauthenticated("Unexpected signing algorithm"));
    }

    let kid = header
        .kid
        .ok_or_else(|| AppError::unauthenticated("Token missing key id"))?;

    let guard = TRUSTED_KEYS.read();
    let key = guard
        .get(&kid)
        .ok_or_else(|| AppError::unauthenticated("Unknown signing key"))?;

    let mut validation = Validation::new(jsonwebtoken::Algorithm::RS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);

    let data = decode::<AccessClaims>(token, key, &validation)
        .map_err(|_| AppError::unauthenticated("Invalid or expired token"))?;
    Ok(data.claims)
}

fn argon2_context() -> Argon2<'static> {
    let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, ARGON2_PARALLELISM, None)
        .expect("static argon2 parameters are valid");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Hash a password with Argon2id. Parameters end up in the PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut SaltRng);
    argon2_context()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::internal(format!("failed to hash password: {e}")))
}

/// Constant-time verification against a stored PHC hash. A malformed hash
/// verifies as false rather than erroring, so login never leaks storage
/// state.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    argon2_context()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Verify, and when the stored hash predates the current parameters,
/// return an upgraded hash to persist.
pub fn verify_and_rehash(password: &str, stored: &str) -> Result<(bool, Option<String>)> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| AppError::internal(format!("malformed stored hash: {e}")))?;

    let ok = argon2_context()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok();
    if !ok {
        return Ok((false, None));
    }

    let drifted = match Params::try_from(&parsed) {
        Ok(stored_params) => {
            stored_params.m_cost() != ARGON2_MEMORY_KIB
                || stored_params.t_cost() != ARGON2_ITERATIONS
                || stored_params.p_cost() != ARGON2_PARALLELISM
        }
        Err(_) => true,
    };

    if drifted {
        Ok((true, Some(hash_password(password)?)))
    } else {
        Ok((true, None))
    }
}

/// Password policy: length >= 12 and one of each character class. The
/// breach check runs separately because it needs the network.
pub fn validate_password_strength(password: &str) -> std::result::Result<(), String> {
    if password.chars().count() < 12 {
        return Err("Password must be at least 12 characters long".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one number".to_string());
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err("Password must contain at least one special character".to_string());
    }
    Ok(())
}

/// Mint an opaque refresh token value. Returned to the client exactly once;
/// only its digest is stored.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// One-way digest used to look refresh tokens up.
pub fn digest_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

// ==========================================================================
// TOTP (multi-factor authentication)
// ==========================================================================

/// Generate a new TOTP secret (base32 encoded).
pub fn generate_totp_secret() -> String {
    use totp_rs::Secret;
    Secret::generate_secret().to_encoded().to_string()
}

fn create_totp(secret: &str, account_name: &str) -> Result<totp_rs::TOTP> {
    use totp_rs::{Algorithm, Secret, TOTP};

    let secret_bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|e| AppError::internal(format!("invalid TOTP secret: {e}")))?;

    TOTP::new(
        Algorithm::SHA1,
        6,  // digits
        1,  // skew (allow 1 step for clock drift)
        30, // step seconds
        secret_bytes,
        Some(CONFIG.auth.totp_issuer.clone()),
        account_name.to_string(),
    )
    .map_err(|e| AppError::internal(format!("failed to create TOTP: {e}")))
}

/// Verify a TOTP code.
pub fn verify_totp(secret: &str, code: &str, account_name: &str) -> Result<bool> {
    let totp = create_totp(secret, account_name)?;
    Ok(totp.check_current(code).unwrap_or(false))
}

/// Provisioning URI for authenticator apps.
pub fn totp_provisioning_uri(secret: &str, account_name: &str) -> Result<String> {
    let totp = create_totp(secret, account_name)?;
    Ok(totp.get_url())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RoleSet, StringSet};
    use std::sync::Mutex;

    // Tests that swap the process-wide key ring must not interleave.
    static KEY_RING: Mutex<()> = Mutex::new(());

    fn install_test_keys() {
        let (private_pem, public_pem) = generate_rsa_key_pair().unwrap();
        install_keys(&private_pem, &public_pem, &[]).unwrap();
    }

    fn sample_user() -> user::Model {
        use crate::domain::authorization::Role;
        user::Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            username: "alice".to_string(),
            password_hash: String::new(),
            roles: RoleSet(vec![Role::Member]),
            permissions: StringSet::default(),
            department_id: None,
            mfa_enabled: false,
            mfa_secret: None,
            mfa_pending_secret: None,
            is_active: true,
            email_verified: true,
            last_login_at: None,
            last_password_change_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn access_token_round_trip() {
        let _guard = KEY_RING.lock().unwrap_or_else(|e| e.into_inner());
        install_test_keys();
        let user = sample_user();
        let token = create_access_token(&user, &["tasks.read".to_string()]).unwrap();
        let claims = decode_access_token(&token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.tenant_id, user.tenant_id.to_string());
        assert_eq!(claims.roles, vec!["MEMBER"]);
        assert_eq!(claims.permissions, vec!["tasks.read"]);
    }

    #[test]
    fn unknown_kid_is_rejected() {
        let _guard = KEY_RING.lock().unwrap_or_else(|e| e.into_inner());
        install_test_keys();
        let token = create_access_token(&sample_user(), &[]).unwrap();
        // Swap in a fresh key ring that no longer trusts the signer.
        install_test_keys();
        assert!(decode_access_token(&token).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let _guard = KEY_RING.lock().unwrap_or_else(|e| e.into_inner());
        install_test_keys();
        let token = create_access_token(&sample_user(), &[]).unwrap();
        let mut tampered = token.clone();
        tampered.truncate(token.len() - 4);
        tampered.push_str("AAAA");
        assert!(decode_access_token(&tampered).is_err());
    }

    #[test]
    fn password_hash_and_verify() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("m=65536,t=3,p=4"));
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn malformed_hash_verifies_false() {
        assert!(!verify_password("anything", "not-a-phc-hash"));
    }

    #[test]
    fn rehash_only_on_parameter_drift() {
        let hash = hash_password("S0me!LongPassword").unwrap();
        let (ok, new_hash) = verify_and_rehash("S0me!LongPassword", &hash).unwrap();
        assert!(ok);
        assert!(new_hash.is_none());

        // A hash produced under weaker parameters gets upgraded.
        let weak_params = Params::new(4096, 1, 1, None).unwrap();
        let weak = Argon2::new(Algorithm::Argon2id, Version::V0x13, weak_params)
            .hash_password(b"S0me!LongPassword", &SaltString::generate(&mut SaltRng))
            .unwrap()
            .to_string();
        let (ok, new_hash) = verify_and_rehash("S0me!LongPassword", &weak).unwrap();
        assert!(ok);
        let upgraded = new_hash.expect("parameter drift should trigger a rehash");
        assert!(upgraded.contains("m=65536,t=3,p=4"));
    }

    #[test]
    fn password_policy() {
        assert!(validate_password_strength("Short1!").is_err());
        assert!(validate_password_strength("password1234").is_err());
        assert!(validate_password_strength("PASSWORD1234!").is_err());
        assert!(validate_password_strength("Passwordabcd!").is_err());
        assert!(validate_password_strength("Password12345").is_err());
        assert!(validate_password_strength("Password1234!").is_ok());
    }

    #[test]
    fn refresh_tokens_are_high_entropy_and_unique() {
        let a = generate_refresh_token();
        let b = generate_refresh_token();
        assert_ne!(a, b);
        // 32 bytes base64url without padding.
        assert_eq!(a.len(), 43);
        assert_ne!(digest_token(&a), digest_token(&b));
    }

    #[test]
    fn totp_round_trip() {
        let secret = generate_totp_secret();
        let uri = totp_provisioning_uri(&secret, "alice@example.com").unwrap();
        assert!(uri.starts_with("otpauth://totp/"));
        assert!(!verify_totp(&secret, "000000", "alice@example.com").unwrap());
    }
}
