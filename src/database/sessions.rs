// ABOUTME: Chat session and message database operations
// ABOUTME: Enforces the per-user session cap, sticky LLM binding and append-only messages
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::live;
use crate::errors::{AppError, AppResult};
use crate::models::{ChatSession, MessagePayload, MessageRole, StoredMessage};

/// Maximum number of live sessions per user
pub const MAX_LIVE_SESSIONS: i64 = 40;

/// Session database operations manager
pub struct SessionManager {
    pool: SqlitePool,
}

impl SessionManager {
    /// Create a new session manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Session Operations
    // ========================================================================

    /// Count live sessions for a user
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn count_live_sessions(&self, user_id: Uuid) -> AppResult<i64> {
        let query = format!(
            "SELECT COUNT(*) as count FROM sessions WHERE {} AND user_id = $2",
            live("")
        );

        let row = sqlx::query(&query)
            .bind(Utc::now())
            .bind(user_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to count sessions: {e}")))?;

        Ok(row.get("count"))
    }

    /// Create a session, enforcing the per-user cap
    ///
    /// The cap is checked by counting live sessions immediately before insert.
    ///
    /// # Errors
    ///
    /// Returns `invalid_input` when the user already holds
    /// [`MAX_LIVE_SESSIONS`] live sessions, or a database error on failure
    pub async fn create_session(&self, user_id: Uuid) -> AppResult<ChatSession> {
        let existing = self.count_live_sessions(user_id).await?;
        if existing >= MAX_LIVE_SESSIONS {
            return Err(AppError::invalid_input(format!(
                "Your session list is full({MAX_LIVE_SESSIONS}), please delete some sessions first"
            )));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r"
            INSERT INTO sessions (id, user_id, llm_id, created_at, updated_at)
            VALUES ($1, $2, NULL, $3, $3)
            ",
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create session: {e}")))?;

        Ok(ChatSession {
            id,
            user_id,
            llm_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a live session by id and owner
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_session(&self, session_id: Uuid, user_id: Uuid) -> AppResult<Option<ChatSession>> {
        let query = format!(
            r"
            SELECT id, user_id, llm_id, created_at, updated_at
            FROM sessions
            WHERE {} AND id = $2 AND user_id = $3
            ",
            live("")
        );

        let row = sqlx::query(&query)
            .bind(Utc::now())
            .bind(session_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get session: {e}")))?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    /// List a user's live sessions, newest first, with offset pagination
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn list_sessions(
        &self,
        user_id: Uuid,
        page_id: i64,
        per_page_num: i64,
    ) -> AppResult<Vec<ChatSession>> {
        let query = format!(
            r"
            SELECT id, user_id, llm_id, created_at, updated_at
            FROM sessions
            WHERE {} AND user_id = $2
            ORDER BY created_at DESC, rowid DESC
            LIMIT $3 OFFSET $4
            ",
            live("")
        );

        let rows = sqlx::query(&query)
            .bind(Utc::now())
            .bind(user_id.to_string())
            .bind(per_page_num)
            .bind(page_id * per_page_num)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list sessions: {e}")))?;

        rows.iter().map(Self::row_to_session).collect()
    }

    /// Persist the sticky LLM binding for a session
    ///
    /// The binding is written once; subsequent turns read it back and ignore
    /// the caller's requested model.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn bind_llm(&self, session_id: Uuid, llm_id: Uuid) -> AppResult<()> {
        let query = format!(
            "UPDATE sessions SET llm_id = $2, updated_at = $3 WHERE {} AND id = $4",
            live("")
        );

        sqlx::query(&query)
            .bind(Utc::now())
            .bind(llm_id.to_string())
            .bind(Utc::now())
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to bind LLM: {e}")))?;
        Ok(())
    }

    /// Soft-delete a session (messages cascade on hard delete only; soft
    /// delete hides the session and its replay)
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn delete_session(&self, session_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let query = format!(
            "UPDATE sessions SET deleted_at = $2 WHERE {} AND id = $3 AND user_id = $4",
            live("")
        );

        let now = Utc::now();
        let result = sqlx::query(&query)
            .bind(now)
            .bind(now)
            .bind(session_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete session: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Message Operations
    // ========================================================================

    /// Append a message to a session (append-only, never mutated)
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn append_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> AppResult<StoredMessage> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let payload = MessagePayload {
            role,
            content: content.to_owned(),
        };
        let serialized = serde_json::to_string(&payload)
            .map_err(|e| AppError::internal(format!("Failed to serialize message: {e}")))?;

        sqlx::query(
            r"
            INSERT INTO messages (id, session_id, created_at, payload)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(id.to_string())
        .bind(session_id.to_string())
        .bind(now)
        .bind(&serialized)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to append message: {e}")))?;

        sqlx::query("UPDATE sessions SET updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to touch session: {e}")))?;

        Ok(StoredMessage {
            id,
            session_id,
            created_at: now,
            payload,
        })
    }

    /// Get all messages for a session in chronological order
    ///
    /// Rows with unparseable payloads are skipped with a warning rather than
    /// failing the whole replay.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn list_messages(&self, session_id: Uuid) -> AppResult<Vec<StoredMessage>> {
        let rows = sqlx::query(
            r"
            SELECT id, session_id, created_at, payload
            FROM messages
            WHERE session_id = $1
            ORDER BY created_at ASC, rowid ASC
            ",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list messages: {e}")))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::row_to_message(row) {
                Ok(message) => messages.push(message),
                Err(e) => tracing::warn!("Skipping unreadable message row: {e}"),
            }
        }
        Ok(messages)
    }

    /// Convert a database row to a [`ChatSession`]
    fn row_to_session(row: &SqliteRow) -> AppResult<ChatSession> {
        let id: String = row.get("id");
        let user_id: String = row.get("user_id");
        let llm_id: Option<String> = row.get("llm_id");
        Ok(ChatSession {
            id: Uuid::parse_str(&id)
                .map_err(|e| AppError::database(format!("Corrupt session id: {e}")))?,
            user_id: Uuid::parse_str(&user_id)
                .map_err(|e| AppError::database(format!("Corrupt session owner: {e}")))?,
            llm_id: llm_id
                .map(|v| Uuid::parse_str(&v))
                .transpose()
                .map_err(|e| AppError::database(format!("Corrupt LLM binding: {e}")))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Convert a database row to a [`StoredMessage`]
    fn row_to_message(row: &SqliteRow) -> AppResult<StoredMessage> {
        let id: String = row.get("id");
        let session_id: String = row.get("session_id");
        let payload: String = row.get("payload");
        Ok(StoredMessage {
            id: Uuid::parse_str(&id)
                .map_err(|e| AppError::database(format!("Corrupt message id: {e}")))?,
            session_id: Uuid::parse_str(&session_id)
                .map_err(|e| AppError::database(format!("Corrupt message session: {e}")))?,
            created_at: row.get("created_at"),
            payload: serde_json::from_str(&payload)
                .map_err(|e| AppError::database(format!("Corrupt message payload: {e}")))?,
        })
    }
}
