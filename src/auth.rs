// ABOUTME: Authentication guards consumed by every protected route
// ABOUTME: Opaque API-key lookup and signed identity tokens, plus the owner-or-admin policy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use axum::http::HeaderMap;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::database::Database;
use crate::errors::{AppError, AppResult};

/// Outcome of a successful authentication
#[derive(Debug, Clone, Copy)]
pub struct AuthResult {
    /// Authenticated user
    pub user_id: Uuid,
    /// Elevated privilege flag
    pub is_admin: bool,
}

impl AuthResult {
    /// Authorization policy used throughout: an operation scoped to
    /// `target_user` succeeds when the caller IS that user or holds the
    /// elevated privilege level.
    #[must_use]
    pub fn may_act_for(&self, target_user: Uuid) -> bool {
        self.is_admin || self.user_id == target_user
    }
}

/// Signed identity claim carried by login tokens
#[derive(Debug, Serialize, Deserialize)]
struct IdentityClaims {
    /// User id
    sub: String,
    /// Privilege level
    admin: bool,
    /// Unique token nonce
    jti: String,
    /// Expiry (unix seconds)
    exp: i64,
    /// Issue time (unix seconds)
    iat: i64,
}

/// Extract the bearer token from the `Authorization` header
///
/// # Errors
///
/// Returns `AuthInvalid` when the header is absent or not a bearer scheme
pub fn extract_bearer(headers: &HeaderMap) -> AppResult<&str> {
    let value = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::auth_invalid("Missing authorization header"))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::auth_invalid("Malformed authorization header"))
}

/// Session-credential guard: resolve an opaque API-key secret
///
/// The secret must map to a live (non-expired, non-deleted) key whose owner
/// is a live user.
///
/// # Errors
///
/// Returns `AuthInvalid` when the secret is absent, expired, deleted or the
/// owning user cannot be resolved
pub async fn api_key_auth(headers: &HeaderMap, database: &Database) -> AppResult<AuthResult> {
    let secret = extract_bearer(headers)?;

    let key = database
        .api_keys()
        .resolve_secret(secret)
        .await?
        .ok_or_else(|| AppError::auth_invalid("Invalid secret key"))?;

    let user = database
        .users()
        .get_user_by_id(key.user_id)
        .await?
        .ok_or_else(|| AppError::auth_invalid("Invalid secret key"))?;

    Ok(AuthResult {
        user_id: user.id,
        is_admin: user.is_admin,
    })
}

/// Identity-credential guard: verify a signed, time-limited claim
///
/// Verified cryptographically, never looked up in storage.
///
/// # Errors
///
/// Returns `AuthInvalid`/`AuthExpired` on signature mismatch or expiry and
/// an internal error on malformed claims
pub fn identity_auth(headers: &HeaderMap, config: &ServerConfig) -> AppResult<AuthResult> {
    let token = extract_bearer(headers)?;
    decode_identity_token(token, config)
}

/// Issue a signed identity token for a user
///
/// # Errors
///
/// Returns an internal error if signing fails
pub fn encode_identity_token(
    config: &ServerConfig,
    user_id: Uuid,
    is_admin: bool,
) -> AppResult<String> {
    let now = Utc::now().timestamp();
    let claims = IdentityClaims {
        sub: user_id.to_string(),
        admin: is_admin,
        jti: Uuid::new_v4().to_string(),
        exp: now + i64::try_from(config.token_ttl_secs).unwrap_or(86_400),
        iat: now,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("Failed to sign identity token: {e}")))
}

/// Verify and unpack an identity token
fn decode_identity_token(token: &str, config: &ServerConfig) -> AppResult<AuthResult> {
    let validation = Validation::new(Algorithm::HS256);

    let data = decode::<IdentityClaims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::auth_expired("Token expired"),
        jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::InvalidToken => AppError::auth_invalid("Invalid token"),
        _ => AppError::internal(format!("Failed to decode identity token: {e}")),
    })?;

    let user_id = Uuid::parse_str(&data.claims.sub)
        .map_err(|e| AppError::internal(format!("Malformed identity claim: {e}")))?;

    Ok(AuthResult {
        user_id,
        is_admin: data.claims.admin,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn test_config(secret: &str) -> ServerConfig {
        ServerConfig {
            http_port: 0,
            database_url: "sqlite::memory:".to_owned(),
            redis_url: None,
            jwt_secret: secret.to_owned(),
            token_ttl_secs: 3600,
            data_dir: std::path::PathBuf::from("/tmp"),
            turn_lock_ttl_secs: 30,
            cache_ttl_secs: 300,
            negative_cache_ttl_secs: 20,
        }
    }

    #[test]
    fn test_identity_token_round_trip() {
        let config = test_config("test-secret");
        let user_id = Uuid::new_v4();

        let token = encode_identity_token(&config, user_id, true).unwrap();
        let auth = decode_identity_token(&token, &config).unwrap();

        assert_eq!(auth.user_id, user_id);
        assert!(auth.is_admin);
    }

    #[test]
    fn test_identity_token_rejects_wrong_secret() {
        let config = test_config("secret-a");
        let other = test_config("secret-b");
        let token = encode_identity_token(&config, Uuid::new_v4(), false).unwrap();

        let err = decode_identity_token(&token, &other).unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::AuthInvalid);
    }

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer sk-abc".parse().unwrap());
        assert_eq!(extract_bearer(&headers).unwrap(), "sk-abc");
    }

    #[test]
    fn test_extract_bearer_missing_header() {
        let headers = HeaderMap::new();
        assert!(extract_bearer(&headers).is_err());
    }

    #[test]
    fn test_extract_bearer_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Basic dXNlcg==".parse().unwrap());
        assert!(extract_bearer(&headers).is_err());
    }

    #[test]
    fn test_may_act_for_policy() {
        let uid = Uuid::new_v4();
        let plain = AuthResult {
            user_id: uid,
            is_admin: false,
        };
        assert!(plain.may_act_for(uid));
        assert!(!plain.may_act_for(Uuid::new_v4()));

        let admin = AuthResult {
            user_id: uid,
            is_admin: true,
        };
        assert!(admin.may_act_for(Uuid::new_v4()));
    }
}
