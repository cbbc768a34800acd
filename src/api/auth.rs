//! Authentication primitives: password hashing, access/refresh JWTs,
//! single-use email capability tokens and the request extractor.
//!
//! Refresh tokens embed the user's token version at issue time. Logout and
//! password changes bump the version, which invalidates every outstanding
//! refresh token at once without keeping a blocklist.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;
use crate::db::User;
use crate::AppState;

use super::error::ApiError;

/// Lifetime of single-use email capability tokens
pub const TEMPORARY_TOKEN_MINUTES: i64 = 20;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Hash a token value for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time string equality for token comparison
pub fn tokens_match(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    a.len() == b.len() && a.ct_eq(b).into()
}

/// Claims carried by short-lived access tokens: enough profile to serve
/// most requests without a user lookup
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id
    pub sub: String,
    pub user_name: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by refresh tokens: identity plus the version counter
/// checked against the user row on every refresh
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// User id
    pub sub: String,
    pub token_version: i64,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue_access_token(config: &AuthConfig, user: &User) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = AccessClaims {
        sub: user.id.clone(),
        user_name: user.user_name.clone(),
        email: user.email.clone(),
        full_name: user.full_name.clone(),
        role: user.role.clone(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(config.access_token_minutes)).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.access_token_secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to sign access token");
        ApiError::internal("Failed to issue tokens")
    })
}

pub fn issue_refresh_token(config: &AuthConfig, user: &User) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = RefreshClaims {
        sub: user.id.clone(),
        token_version: user.token_version,
        iat: now.timestamp(),
        exp: (now + Duration::days(config.refresh_token_days)).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to sign refresh token");
        ApiError::internal("Failed to issue tokens")
    })
}

/// Decode and verify an access token. Fails closed: any malformed, expired
/// or mis-signed token is rejected.
pub fn decode_access_token(config: &AuthConfig, token: &str) -> Result<AccessClaims, ApiError> {
    decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(config.access_token_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::unauthorized("Invalid or expired access token"))
}

/// Decode and verify a refresh token, fail closed
pub fn decode_refresh_token(config: &AuthConfig, token: &str) -> Result<RefreshClaims, ApiError> {
    decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::unauthorized("Invalid or expired refresh token"))
}

/// Fresh access + refresh token pair
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Sign a token pair for the user and persist the refresh token on the row,
/// making it the one value `refresh` will accept
pub async fn issue_token_pair(
    pool: &sqlx::SqlitePool,
    config: &AuthConfig,
    user: &User,
) -> Result<TokenPair, ApiError> {
    let access_token = issue_access_token(config, user)?;
    let refresh_token = issue_refresh_token(config, user)?;

    sqlx::query("UPDATE users SET refresh_token = ?, updated_at = ? WHERE id = ?")
        .bind(&refresh_token)
        .bind(Utc::now().to_rfc3339())
        .bind(&user.id)
        .execute(pool)
        .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// A single-use capability token: the raw value is delivered out-of-band by
/// email, only its digest and expiry are stored
pub struct TemporaryToken {
    pub raw: String,
    pub digest: String,
    pub expires_at: String,
}

pub fn generate_temporary_token() -> TemporaryToken {
    let mut rng = rand::rng();
    let bytes: [u8; 20] = rng.random();
    let raw = hex::encode(bytes);
    let digest = hash_token(&raw);
    let expires_at = (Utc::now() + Duration::minutes(TEMPORARY_TOKEN_MINUTES)).to_rfc3339();

    TemporaryToken {
        raw,
        digest,
        expires_at,
    }
}

/// Extract the bearer token from request headers
fn extract_bearer(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Load the user a valid access token belongs to
pub async fn get_current_user(
    pool: &sqlx::SqlitePool,
    config: &AuthConfig,
    token: &str,
) -> Result<User, ApiError> {
    let claims = decode_access_token(config, token)?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(pool)
        .await?;

    user.ok_or_else(|| ApiError::unauthorized("Account no longer exists"))
}

/// Extractor for the current authenticated user. The token carries a
/// profile snapshot, but authorization decisions read the fresh row.
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Access token is required"))?;
        get_current_user(&state.db, &state.config.auth, token).await
    }
}

/// Create the bootstrap admin account from config credentials if no admin
/// exists yet. Runs at startup, before the server accepts requests.
pub async fn ensure_admin_user(
    pool: &sqlx::SqlitePool,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM users WHERE role = 'admin' LIMIT 1")
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Ok(());
    }

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash = hash_password(password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO users (
            id, user_name, email, full_name, password_hash, role,
            avatar_url, avatar_public_id, is_email_verified,
            token_version, created_at, updated_at
        ) VALUES (?, 'admin', ?, 'Administrator', ?, 'admin', '', '', 1, 0, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(email)
    .bind(&password_hash)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!(email = %email, "Created bootstrap admin user");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            id: "u-1".into(),
            user_name: "jane".into(),
            email: "jane@example.com".into(),
            full_name: "Jane Doe".into(),
            password_hash: String::new(),
            role: "customer".into(),
            avatar_url: String::new(),
            avatar_public_id: String::new(),
            address_label: None,
            address_street: None,
            address_city: None,
            address_state: None,
            address_pin: None,
            address_country: None,
            refresh_token: None,
            token_version: 3,
            is_email_verified: false,
            email_verification_token: None,
            email_verification_expiry: None,
            forgot_password_token: None,
            forgot_password_expiry: None,
            delete_account_token: None,
            delete_account_expiry: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn test_config() -> AuthConfig {
        AuthConfig {
            access_token_secret: "access-secret".into(),
            refresh_token_secret: "refresh-secret".into(),
            access_token_minutes: 15,
            refresh_token_days: 7,
            admin_email: String::new(),
            admin_password: String::new(),
        }
    }

    #[test]
    fn test_password_hash_verifies_and_rejects() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert_ne!(hash, "hunter2hunter2");
        assert!(verify_password("hunter2hunter2", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("hunter2hunter2", "not-a-hash"));
    }

    #[test]
    fn test_access_token_round_trip() {
        let config = test_config();
        let user = test_user();
        let token = issue_access_token(&config, &user).unwrap();
        let claims = decode_access_token(&config, &token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.role, "customer");
    }

    #[test]
    fn test_refresh_token_embeds_version_and_checks_signature() {
        let config = test_config();
        let user = test_user();
        let token = issue_refresh_token(&config, &user).unwrap();
        let claims = decode_refresh_token(&config, &token).unwrap();
        assert_eq!(claims.token_version, 3);

        // A refresh token is not a valid access token: secrets differ
        assert!(decode_access_token(&config, &token).is_err());

        let mut other = test_config();
        other.refresh_token_secret = "different".into();
        assert!(decode_refresh_token(&other, &token).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let config = test_config();
        assert!(decode_access_token(&config, "not.a.jwt").is_err());
        assert!(decode_access_token(&config, "").is_err());
    }

    #[test]
    fn test_temporary_token_digest_matches_raw() {
        let token = generate_temporary_token();
        assert_eq!(token.raw.len(), 40);
        assert_eq!(hash_token(&token.raw), token.digest);
        assert_ne!(token.raw, token.digest);

        let other = generate_temporary_token();
        assert_ne!(token.raw, other.raw);
    }

    #[test]
    fn test_tokens_match_is_exact() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abc", "abd"));
        assert!(!tokens_match("abc", "abcd"));
    }
}
