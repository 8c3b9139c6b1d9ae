// ABOUTME: LLM and embedding configuration registry database operations
// ABOUTME: Enforces (name, credential, base URL) uniqueness and soft deletion
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::live;
use crate::errors::{AppError, AppResult};
use crate::models::{EmbeddingConfig, LlmConfig, ProviderKind, RequestStyle};

/// Parameters for registering a new LLM configuration
#[derive(Debug, Clone)]
pub struct NewLlmConfig {
    /// Human name
    pub name: String,
    /// Provider protocol
    pub provider: ProviderKind,
    /// Prompt assembly style
    pub request_style: RequestStyle,
    /// Provider endpoint
    pub base_url: String,
    /// Provider credential
    pub api_key: String,
    /// System speaker label
    pub system_name: String,
    /// System instruction
    pub system_prompt: String,
    /// User speaker label
    pub user_name: String,
    /// Assistant speaker label
    pub assistant_name: String,
    /// Completion token budget
    pub max_tokens: i64,
    /// Registering admin
    pub uploader_id: Uuid,
}

/// Parameters for registering a new embedding configuration
#[derive(Debug, Clone)]
pub struct NewEmbeddingConfig {
    /// Human name
    pub name: String,
    /// Provider protocol
    pub provider: ProviderKind,
    /// Provider endpoint
    pub base_url: String,
    /// Provider credential
    pub api_key: String,
    /// Maximum accepted chunk size
    pub chunk_size: i64,
    /// Expected vector dimensionality
    pub dimensions: i64,
    /// Registering admin
    pub uploader_id: Uuid,
}

/// Model registry database operations manager
pub struct RegistryManager {
    pool: SqlitePool,
}

impl RegistryManager {
    /// Create a new registry manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // LLM Configurations
    // ========================================================================

    /// Check whether an LLM with the same (name, credential, base URL)
    /// triple already exists
    ///
    /// Uniqueness is deliberately on the triple, not the name alone, so a
    /// re-registration conflict is explicit rather than silently merged.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn llm_triple_exists(
        &self,
        name: &str,
        api_key: &str,
        base_url: &str,
    ) -> AppResult<bool> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) as count
            FROM llm_configs
            WHERE name = $1 AND api_key = $2 AND base_url = $3
            ",
        )
        .bind(name)
        .bind(api_key)
        .bind(base_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to check LLM uniqueness: {e}")))?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    /// Register a new LLM configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn create_llm(&self, new: &NewLlmConfig) -> AppResult<LlmConfig> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        // Uploaded prompts are normalized to end with a single newline
        let system_prompt = format!("{}\n", new.system_prompt.trim_end());

        sqlx::query(
            r"
            INSERT INTO llm_configs (
                id, name, provider, request_style, base_url, api_key,
                system_name, system_prompt, user_name, assistant_name,
                max_tokens, uploader_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            ",
        )
        .bind(id.to_string())
        .bind(&new.name)
        .bind(new.provider.as_str())
        .bind(new.request_style.as_str())
        .bind(&new.base_url)
        .bind(&new.api_key)
        .bind(&new.system_name)
        .bind(&system_prompt)
        .bind(&new.user_name)
        .bind(&new.assistant_name)
        .bind(new.max_tokens)
        .bind(new.uploader_id.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create LLM config: {e}")))?;

        Ok(LlmConfig {
            id,
            name: new.name.clone(),
            provider: new.provider,
            request_style: new.request_style,
            base_url: new.base_url.clone(),
            api_key: new.api_key.clone(),
            system_name: new.system_name.clone(),
            system_prompt,
            user_name: new.user_name.clone(),
            assistant_name: new.assistant_name.clone(),
            max_tokens: new.max_tokens,
            uploader_id: new.uploader_id,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a live LLM configuration by name
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_llm_by_name(&self, name: &str) -> AppResult<Option<LlmConfig>> {
        let query = format!(
            "SELECT * FROM llm_configs WHERE {} AND name = $2",
            live("")
        );

        let row = sqlx::query(&query)
            .bind(Utc::now())
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get LLM by name: {e}")))?;

        row.as_ref().map(Self::row_to_llm).transpose()
    }

    /// Get a live LLM configuration by id
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_llm_by_id(&self, llm_id: Uuid) -> AppResult<Option<LlmConfig>> {
        let query = format!("SELECT * FROM llm_configs WHERE {} AND id = $2", live(""));

        let row = sqlx::query(&query)
            .bind(Utc::now())
            .bind(llm_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get LLM by id: {e}")))?;

        row.as_ref().map(Self::row_to_llm).transpose()
    }

    /// List live LLM configurations as (id, name) pairs
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn list_llms(&self) -> AppResult<Vec<(Uuid, String)>> {
        let query = format!("SELECT id, name FROM llm_configs WHERE {}", live(""));

        let rows = sqlx::query(&query)
            .bind(Utc::now())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list LLMs: {e}")))?;

        rows.iter().map(Self::row_to_id_name).collect()
    }

    /// Soft-delete an LLM configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn delete_llm(&self, llm_id: Uuid) -> AppResult<bool> {
        let query = format!(
            "UPDATE llm_configs SET deleted_at = $2 WHERE {} AND id = $3",
            live("")
        );

        let now = Utc::now();
        let result = sqlx::query(&query)
            .bind(now)
            .bind(now)
            .bind(llm_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete LLM: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Embedding Configurations
    // ========================================================================

    /// Check whether an embedding with the same (name, credential, base URL)
    /// triple already exists
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn embedding_triple_exists(
        &self,
        name: &str,
        api_key: &str,
        base_url: &str,
    ) -> AppResult<bool> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) as count
            FROM embedding_configs
            WHERE name = $1 AND api_key = $2 AND base_url = $3
            ",
        )
        .bind(name)
        .bind(api_key)
        .bind(base_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to check embedding uniqueness: {e}")))?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    /// Register a new embedding configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn create_embedding(&self, new: &NewEmbeddingConfig) -> AppResult<EmbeddingConfig> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r"
            INSERT INTO embedding_configs (
                id, name, provider, base_url, api_key, chunk_size,
                dimensions, uploader_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            ",
        )
        .bind(id.to_string())
        .bind(&new.name)
        .bind(new.provider.as_str())
        .bind(&new.base_url)
        .bind(&new.api_key)
        .bind(new.chunk_size)
        .bind(new.dimensions)
        .bind(new.uploader_id.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create embedding config: {e}")))?;

        Ok(EmbeddingConfig {
            id,
            name: new.name.clone(),
            provider: new.provider,
            base_url: new.base_url.clone(),
            api_key: new.api_key.clone(),
            chunk_size: new.chunk_size,
            dimensions: new.dimensions,
            uploader_id: new.uploader_id,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a live embedding configuration by name
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_embedding_by_name(&self, name: &str) -> AppResult<Option<EmbeddingConfig>> {
        let query = format!(
            "SELECT * FROM embedding_configs WHERE {} AND name = $2",
            live("")
        );

        let row = sqlx::query(&query)
            .bind(Utc::now())
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get embedding by name: {e}")))?;

        row.as_ref().map(Self::row_to_embedding).transpose()
    }

    /// Get a live embedding configuration by id
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_embedding_by_id(&self, embedding_id: Uuid) -> AppResult<Option<EmbeddingConfig>> {
        let query = format!(
            "SELECT * FROM embedding_configs WHERE {} AND id = $2",
            live("")
        );

        let row = sqlx::query(&query)
            .bind(Utc::now())
            .bind(embedding_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get embedding by id: {e}")))?;

        row.as_ref().map(Self::row_to_embedding).transpose()
    }

    /// List live embedding configurations as (id, name) pairs
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn list_embeddings(&self) -> AppResult<Vec<(Uuid, String)>> {
        let query = format!("SELECT id, name FROM embedding_configs WHERE {}", live(""));

        let rows = sqlx::query(&query)
            .bind(Utc::now())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list embeddings: {e}")))?;

        rows.iter().map(Self::row_to_id_name).collect()
    }

    /// Soft-delete an embedding configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn delete_embedding(&self, embedding_id: Uuid) -> AppResult<bool> {
        let query = format!(
            "UPDATE embedding_configs SET deleted_at = $2 WHERE {} AND id = $3",
            live("")
        );

        let now = Utc::now();
        let result = sqlx::query(&query)
            .bind(now)
            .bind(now)
            .bind(embedding_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete embedding: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Row mapping
    // ========================================================================

    fn row_to_id_name(row: &SqliteRow) -> AppResult<(Uuid, String)> {
        let id: String = row.get("id");
        Ok((
            Uuid::parse_str(&id)
                .map_err(|e| AppError::database(format!("Corrupt registry id: {e}")))?,
            row.get("name"),
        ))
    }

    fn row_to_llm(row: &SqliteRow) -> AppResult<LlmConfig> {
        let id: String = row.get("id");
        let provider: String = row.get("provider");
        let request_style: String = row.get("request_style");
        let uploader_id: String = row.get("uploader_id");
        Ok(LlmConfig {
            id: Uuid::parse_str(&id)
                .map_err(|e| AppError::database(format!("Corrupt LLM id: {e}")))?,
            name: row.get("name"),
            provider: ProviderKind::parse(&provider)
                .ok_or_else(|| AppError::database(format!("Unknown provider: {provider}")))?,
            request_style: RequestStyle::parse(&request_style).ok_or_else(|| {
                AppError::database(format!("Unknown request style: {request_style}"))
            })?,
            base_url: row.get("base_url"),
            api_key: row.get("api_key"),
            system_name: row.get("system_name"),
            system_prompt: row.get("system_prompt"),
            user_name: row.get("user_name"),
            assistant_name: row.get("assistant_name"),
            max_tokens: row.get("max_tokens"),
            uploader_id: Uuid::parse_str(&uploader_id)
                .map_err(|e| AppError::database(format!("Corrupt uploader id: {e}")))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_embedding(row: &SqliteRow) -> AppResult<EmbeddingConfig> {
        let id: String = row.get("id");
        let provider: String = row.get("provider");
        let uploader_id: String = row.get("uploader_id");
        Ok(EmbeddingConfig {
            id: Uuid::parse_str(&id)
                .map_err(|e| AppError::database(format!("Corrupt embedding id: {e}")))?,
            name: row.get("name"),
            provider: ProviderKind::parse(&provider)
                .ok_or_else(|| AppError::database(format!("Unknown provider: {provider}")))?,
            base_url: row.get("base_url"),
            api_key: row.get("api_key"),
            chunk_size: row.get("chunk_size"),
            dimensions: row.get("dimensions"),
            uploader_id: Uuid::parse_str(&uploader_id)
                .map_err(|e| AppError::database(format!("Corrupt uploader id: {e}")))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}
