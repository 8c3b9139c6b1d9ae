// ABOUTME: API key database operations
// ABOUTME: Issues opaque secrets with a per-user live-key cap and resolves bearer tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use chrono::{Duration, Utc};
use rand::RngCore;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::live;
use crate::errors::{AppError, AppResult};
use crate::models::ApiKey;

/// Maximum number of live (non-expired, non-deleted) keys per user
pub const MAX_LIVE_API_KEYS: i64 = 5;

/// Issued keys stay valid for one year
const KEY_LIFETIME_DAYS: i64 = 365;

/// API key database operations manager
pub struct ApiKeyManager {
    pool: SqlitePool,
}

impl ApiKeyManager {
    /// Create a new API key manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Count live keys for a user
    ///
    /// A key is live when it is neither soft-deleted nor expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn count_live_keys(&self, user_id: Uuid) -> AppResult<i64> {
        let query = format!(
            r"
            SELECT COUNT(*) as count
            FROM api_keys
            WHERE {} AND expires_at > $1 AND user_id = $2
            ",
            live("")
        );

        let row = sqlx::query(&query)
            .bind(Utc::now())
            .bind(user_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to count api keys: {e}")))?;

        Ok(row.get("count"))
    }

    /// Issue a new key, enforcing the per-user cap
    ///
    /// The cap is checked by counting live keys immediately before insert.
    ///
    /// # Errors
    ///
    /// Returns `invalid_input` when the user already holds
    /// [`MAX_LIVE_API_KEYS`] live keys, or a database error on failure
    pub async fn create_key(&self, user_id: Uuid) -> AppResult<ApiKey> {
        let existing = self.count_live_keys(user_id).await?;
        if existing >= MAX_LIVE_API_KEYS {
            return Err(AppError::invalid_input(format!(
                "You can only generate {MAX_LIVE_API_KEYS} api keys at most"
            )));
        }

        let id = Uuid::new_v4();
        let secret = generate_secret();
        let now = Utc::now();
        let expires_at = now + Duration::days(KEY_LIFETIME_DAYS);

        sqlx::query(
            r"
            INSERT INTO api_keys (id, user_id, secret, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(&secret)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create api key: {e}")))?;

        Ok(ApiKey {
            id,
            user_id,
            secret,
            created_at: now,
            expires_at,
        })
    }

    /// List a user's live keys
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn list_keys(&self, user_id: Uuid) -> AppResult<Vec<ApiKey>> {
        let query = format!(
            r"
            SELECT id, user_id, secret, created_at, expires_at
            FROM api_keys
            WHERE {} AND expires_at > $1 AND user_id = $2
            ORDER BY created_at ASC
            ",
            live("")
        );

        let rows = sqlx::query(&query)
            .bind(Utc::now())
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list api keys: {e}")))?;

        rows.iter().map(Self::row_to_key).collect()
    }

    /// Resolve a bearer secret to its live key
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn resolve_secret(&self, secret: &str) -> AppResult<Option<ApiKey>> {
        let query = format!(
            r"
            SELECT id, user_id, secret, created_at, expires_at
            FROM api_keys
            WHERE {} AND expires_at > $1 AND secret = $2
            ",
            live("")
        );

        let row = sqlx::query(&query)
            .bind(Utc::now())
            .bind(secret)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to resolve api key: {e}")))?;

        row.as_ref().map(Self::row_to_key).transpose()
    }

    /// Get a key by id regardless of owner (ownership is checked by callers)
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_key(&self, key_id: Uuid) -> AppResult<Option<ApiKey>> {
        let query = format!(
            r"
            SELECT id, user_id, secret, created_at, expires_at
            FROM api_keys
            WHERE {} AND id = $2
            ",
            live("")
        );

        let row = sqlx::query(&query)
            .bind(Utc::now())
            .bind(key_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get api key: {e}")))?;

        row.as_ref().map(Self::row_to_key).transpose()
    }

    /// Soft-delete a key
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn delete_key(&self, key_id: Uuid) -> AppResult<bool> {
        let query = format!("UPDATE api_keys SET deleted_at = $1 WHERE {} AND id = $2", live(""));

        let result = sqlx::query(&query)
            .bind(Utc::now())
            .bind(key_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete api key: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Convert a database row to an [`ApiKey`]
    fn row_to_key(row: &SqliteRow) -> AppResult<ApiKey> {
        let id: String = row.get("id");
        let user_id: String = row.get("user_id");
        Ok(ApiKey {
            id: Uuid::parse_str(&id)
                .map_err(|e| AppError::database(format!("Corrupt api key id: {e}")))?,
            user_id: Uuid::parse_str(&user_id)
                .map_err(|e| AppError::database(format!("Corrupt api key owner: {e}")))?,
            secret: row.get("secret"),
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
        })
    }
}

/// Generate an opaque key secret: `sk-` followed by 48 hex chars
fn generate_secret() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("sk-{}", hex::encode(bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_secrets_are_unique() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b);
        assert!(a.starts_with("sk-"));
        assert_eq!(a.len(), 3 + 48);
    }
}
