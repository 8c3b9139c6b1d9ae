// ABOUTME: User account database operations
// ABOUTME: Handles registration, credential lookup and API-key counters
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::live;
use crate::errors::{AppError, AppResult};
use crate::models::User;

/// User database operations manager
pub struct UserManager {
    pool: SqlitePool,
}

impl UserManager {
    /// Create a new user manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user
    ///
    /// # Errors
    ///
    /// Returns an error if the username is already taken by a live user or
    /// the database operation fails
    pub async fn create_user(&self, username: &str, password_hash: &str) -> AppResult<Uuid> {
        if self.get_user_by_username(username).await?.is_some() {
            return Err(AppError::invalid_input("User already exist"));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r"
            INSERT INTO users (id, username, password_hash, is_admin, api_key_count, created_at, updated_at)
            VALUES ($1, $2, $3, 0, 0, $4, $4)
            ",
        )
        .bind(id.to_string())
        .bind(username)
        .bind(password_hash)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create user: {e}")))?;

        Ok(id)
    }

    /// Get a live user by username
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let query = format!(
            r"
            SELECT id, username, password_hash, is_admin, api_key_count, created_at, last_login_at
            FROM users
            WHERE {} AND username = $2
            ",
            live("")
        );

        let row = sqlx::query(&query)
            .bind(Utc::now())
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get user by username: {e}")))?;

        row.map(|r| Self::row_to_user(&r)).transpose()
    }

    /// Get a live user by id
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_user_by_id(&self, user_id: Uuid) -> AppResult<Option<User>> {
        let query = format!(
            r"
            SELECT id, username, password_hash, is_admin, api_key_count, created_at, last_login_at
            FROM users
            WHERE {} AND id = $2
            ",
            live("")
        );

        let row = sqlx::query(&query)
            .bind(Utc::now())
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get user by id: {e}")))?;

        row.map(|r| Self::row_to_user(&r)).transpose()
    }

    /// Record a successful login
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn record_login(&self, user_id: Uuid) -> AppResult<()> {
        let now = Utc::now();
        sqlx::query("UPDATE users SET last_login_at = $1, updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to record login: {e}")))?;
        Ok(())
    }

    /// Adjust the live API-key counter by the given delta
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn adjust_api_key_count(&self, user_id: Uuid, delta: i64) -> AppResult<()> {
        let query = format!(
            r"
            UPDATE users
            SET api_key_count = MAX(api_key_count + $2, 0), updated_at = $1
            WHERE {} AND id = $3
            ",
            live("")
        );

        sqlx::query(&query)
            .bind(Utc::now())
            .bind(delta)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to adjust api key count: {e}")))?;
        Ok(())
    }

    /// Grant or revoke the admin flag
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn set_admin(&self, user_id: Uuid, is_admin: bool) -> AppResult<()> {
        sqlx::query("UPDATE users SET is_admin = $1, updated_at = $2 WHERE id = $3")
            .bind(is_admin)
            .bind(Utc::now())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to set admin flag: {e}")))?;
        Ok(())
    }

    /// Convert a database row to a [`User`]
    fn row_to_user(row: &SqliteRow) -> AppResult<User> {
        let id: String = row.get("id");
        Ok(User {
            id: Uuid::parse_str(&id)
                .map_err(|e| AppError::database(format!("Corrupt user id: {e}")))?,
            username: row.get("username"),
            password_hash: row.get("password_hash"),
            is_admin: row.get("is_admin"),
            api_key_count: row.get("api_key_count"),
            created_at: row.get("created_at"),
            last_login_at: row.get("last_login_at"),
        })
    }
}
