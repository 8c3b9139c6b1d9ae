// ABOUTME: Core database handle with schema migration for SQLite
// ABOUTME: Exposes per-domain managers and the single soft-delete liveness predicate
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

/// API key issuance and validation
pub mod api_keys;
/// LLM and embedding configuration registries
pub mod registry;
/// Chat session and message storage
pub mod sessions;
/// User account management
pub mod users;
/// Vector database metadata and ingestion ledger
pub mod vector_dbs;

pub use api_keys::{ApiKeyManager, MAX_LIVE_API_KEYS};
pub use registry::RegistryManager;
pub use sessions::{SessionManager, MAX_LIVE_SESSIONS};
pub use users::UserManager;
pub use vector_dbs::VectorDbManager;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::errors::{AppError, AppResult};

/// Soft-delete liveness predicate, shared by every query site
///
/// Produces `(deleted_at IS NULL OR deleted_at > $1)` with an optional
/// table alias prefix. Callers must bind the current timestamp as the
/// FIRST query parameter - keeping the filter in one place avoids the
/// copy-pasted temporal logic drifting between call sites.
pub(crate) fn live(prefix: &str) -> String {
    format!("({prefix}deleted_at IS NULL OR {prefix}deleted_at > $1)")
}

/// Shared database handle
///
/// Wraps the connection pool and hands out per-domain managers. The handle
/// is constructed once at startup and injected through `ServerResources` -
/// never a module global.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open a pool against the given connection string and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be opened or a migration fails
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await
            .map_err(|e| AppError::database(format!("Failed to open database: {e}")))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Wrap an existing pool (tests) and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails
    pub async fn from_pool(pool: SqlitePool) -> AppResult<Self> {
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Borrow the underlying pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// User account manager
    #[must_use]
    pub fn users(&self) -> UserManager {
        UserManager::new(self.pool.clone())
    }

    /// API key manager
    #[must_use]
    pub fn api_keys(&self) -> ApiKeyManager {
        ApiKeyManager::new(self.pool.clone())
    }

    /// Session and message manager
    #[must_use]
    pub fn sessions(&self) -> SessionManager {
        SessionManager::new(self.pool.clone())
    }

    /// LLM/embedding registry manager
    #[must_use]
    pub fn registry(&self) -> RegistryManager {
        RegistryManager::new(self.pool.clone())
    }

    /// Vector database manager
    #[must_use]
    pub fn vector_dbs(&self) -> VectorDbManager {
        VectorDbManager::new(self.pool.clone())
    }

    /// Create the schema when absent (idempotent)
    async fn migrate(&self) -> AppResult<()> {
        let statements = [
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0,
                api_key_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_login_at TEXT,
                deleted_at TEXT
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS api_keys (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                secret TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                deleted_at TEXT
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                llm_id TEXT REFERENCES llm_configs(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                payload TEXT NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS llm_configs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                provider TEXT NOT NULL,
                request_style TEXT NOT NULL,
                base_url TEXT NOT NULL,
                api_key TEXT NOT NULL DEFAULT '',
                system_name TEXT NOT NULL DEFAULT 'system',
                system_prompt TEXT NOT NULL DEFAULT '',
                user_name TEXT NOT NULL DEFAULT 'user',
                assistant_name TEXT NOT NULL DEFAULT 'assistant',
                max_tokens INTEGER NOT NULL DEFAULT 2048,
                uploader_id TEXT NOT NULL REFERENCES users(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS embedding_configs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                provider TEXT NOT NULL,
                base_url TEXT NOT NULL,
                api_key TEXT NOT NULL DEFAULT '',
                chunk_size INTEGER NOT NULL DEFAULT 512,
                dimensions INTEGER NOT NULL,
                uploader_id TEXT NOT NULL REFERENCES users(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS vector_databases (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                embedding_id TEXT NOT NULL REFERENCES embedding_configs(id),
                description TEXT NOT NULL DEFAULT '',
                document_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS rag_sources (
                id TEXT PRIMARY KEY,
                vector_db_id TEXT NOT NULL REFERENCES vector_databases(id) ON DELETE CASCADE,
                kind TEXT NOT NULL CHECK (kind IN ('file', 'url')),
                source_name TEXT NOT NULL,
                content_hash TEXT,
                created_at TEXT NOT NULL
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_api_keys_user ON api_keys(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_rag_sources_db ON rag_sources(vector_db_id)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Migration failed: {e}")))?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_live_predicate_shapes() {
        assert_eq!(live(""), "(deleted_at IS NULL OR deleted_at > $1)");
        assert_eq!(live("s."), "(s.deleted_at IS NULL OR s.deleted_at > $1)");
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let db = Database::from_pool(pool).await.unwrap();
        db.migrate().await.unwrap();
    }
}
