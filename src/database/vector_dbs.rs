// ABOUTME: Vector database metadata and ingestion ledger operations
// ABOUTME: Tracks per-user named indexes, document counts and dedup records
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::collections::HashSet;

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::live;
use crate::errors::{AppError, AppResult};
use crate::models::{SourceRecordKind, VectorDatabase};

/// Vector database operations manager
pub struct VectorDbManager {
    pool: SqlitePool,
}

impl VectorDbManager {
    /// Create a new vector database manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Check whether the user already owns a live vector DB with this name
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn name_exists(&self, user_id: Uuid, name: &str) -> AppResult<bool> {
        let query = format!(
            r"
            SELECT COUNT(*) as count
            FROM vector_databases
            WHERE {} AND user_id = $2 AND name = $3
            ",
            live("")
        );

        let row = sqlx::query(&query)
            .bind(Utc::now())
            .bind(user_id.to_string())
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to check vector DB name: {e}")))?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    /// Create a vector database bound to an embedding configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn create_vector_db(
        &self,
        user_id: Uuid,
        name: &str,
        embedding_id: Uuid,
        description: &str,
    ) -> AppResult<VectorDatabase> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r"
            INSERT INTO vector_databases (id, user_id, name, embedding_id, description, document_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, $6)
            ",
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(name)
        .bind(embedding_id.to_string())
        .bind(description)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create vector DB: {e}")))?;

        Ok(VectorDatabase {
            id,
            user_id,
            name: name.to_owned(),
            embedding_id,
            description: description.to_owned(),
            document_count: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a live vector database by id and owner
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_vector_db(
        &self,
        vector_db_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<VectorDatabase>> {
        let query = format!(
            r"
            SELECT id, user_id, name, embedding_id, description, document_count, created_at, updated_at
            FROM vector_databases
            WHERE {} AND id = $2 AND user_id = $3
            ",
            live("")
        );

        let row = sqlx::query(&query)
            .bind(Utc::now())
            .bind(vector_db_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get vector DB: {e}")))?;

        row.as_ref().map(Self::row_to_vector_db).transpose()
    }

    /// List a user's live vector databases
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn list_vector_dbs(&self, user_id: Uuid) -> AppResult<Vec<VectorDatabase>> {
        let query = format!(
            r"
            SELECT id, user_id, name, embedding_id, description, document_count, created_at, updated_at
            FROM vector_databases
            WHERE {} AND user_id = $2
            ORDER BY created_at ASC
            ",
            live("")
        );

        let rows = sqlx::query(&query)
            .bind(Utc::now())
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list vector DBs: {e}")))?;

        rows.iter().map(Self::row_to_vector_db).collect()
    }

    /// Bump the document count after chunking succeeds
    ///
    /// Intentionally synchronous with the ingestion request and never rolled
    /// back if the background embedding step later fails - the count means
    /// *accepted for ingestion*.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn increment_document_count(
        &self,
        vector_db_id: Uuid,
        user_id: Uuid,
        delta: i64,
    ) -> AppResult<()> {
        let query = format!(
            r"
            UPDATE vector_databases
            SET document_count = document_count + $2, updated_at = $3
            WHERE {} AND id = $4 AND user_id = $5
            ",
            live("")
        );

        sqlx::query(&query)
            .bind(Utc::now())
            .bind(delta)
            .bind(Utc::now())
            .bind(vector_db_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to bump document count: {e}")))?;
        Ok(())
    }

    /// Soft-delete a vector database
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn delete_vector_db(&self, vector_db_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let query = format!(
            "UPDATE vector_databases SET deleted_at = $2 WHERE {} AND id = $3 AND user_id = $4",
            live("")
        );

        let now = Utc::now();
        let result = sqlx::query(&query)
            .bind(now)
            .bind(now)
            .bind(vector_db_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete vector DB: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Ingestion ledger
    // ========================================================================

    /// Record an ingested source for future dedup
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn record_source(
        &self,
        vector_db_id: Uuid,
        kind: SourceRecordKind,
        source_name: &str,
        content_hash: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO rag_sources (id, vector_db_id, kind, source_name, content_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(vector_db_id.to_string())
        .bind(kind.as_str())
        .bind(source_name)
        .bind(content_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to record source: {e}")))?;
        Ok(())
    }

    /// Check whether a byte-identical file was already ingested under the
    /// same name (idempotent re-upload guard)
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn file_source_exists(
        &self,
        vector_db_id: Uuid,
        source_name: &str,
        content_hash: &str,
    ) -> AppResult<bool> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) as count
            FROM rag_sources
            WHERE vector_db_id = $1 AND kind = 'file' AND source_name = $2 AND content_hash = $3
            ",
        )
        .bind(vector_db_id.to_string())
        .bind(source_name)
        .bind(content_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to check file source: {e}")))?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    /// All URLs previously ingested into this vector DB
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn ingested_urls(&self, vector_db_id: Uuid) -> AppResult<HashSet<String>> {
        let rows = sqlx::query(
            "SELECT source_name FROM rag_sources WHERE vector_db_id = $1 AND kind = 'url'",
        )
        .bind(vector_db_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list ingested urls: {e}")))?;

        Ok(rows.iter().map(|r| r.get("source_name")).collect())
    }

    /// Convert a database row to a [`VectorDatabase`]
    fn row_to_vector_db(row: &SqliteRow) -> AppResult<VectorDatabase> {
        let id: String = row.get("id");
        let user_id: String = row.get("user_id");
        let embedding_id: String = row.get("embedding_id");
        Ok(VectorDatabase {
            id: Uuid::parse_str(&id)
                .map_err(|e| AppError::database(format!("Corrupt vector DB id: {e}")))?,
            user_id: Uuid::parse_str(&user_id)
                .map_err(|e| AppError::database(format!("Corrupt vector DB owner: {e}")))?,
            name: row.get("name"),
            embedding_id: Uuid::parse_str(&embedding_id)
                .map_err(|e| AppError::database(format!("Corrupt embedding binding: {e}")))?,
            description: row.get("description"),
            document_count: row.get("document_count"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}
