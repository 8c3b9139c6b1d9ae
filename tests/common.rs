// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides in-memory database, cache and resource bundle helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs, dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use tessera_chat_server::cache::{Cache, InMemoryCache};
use tessera_chat_server::config::ServerConfig;
use tessera_chat_server::database::registry::{NewEmbeddingConfig, NewLlmConfig};
use tessera_chat_server::database::Database;
use tessera_chat_server::models::{EmbeddingConfig, LlmConfig, ProviderKind, RequestStyle};
use tessera_chat_server::resources::ServerResources;

/// Open a fresh in-memory database with the schema applied
///
/// A single pooled connection keeps every query on the same in-memory
/// `SQLite` instance.
pub async fn test_database() -> Database {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    Database::from_pool(pool).await.unwrap()
}

/// Configuration pointing at throwaway backends
pub fn test_config(data_dir: PathBuf) -> ServerConfig {
    ServerConfig {
        http_port: 0,
        database_url: "sqlite::memory:".to_owned(),
        redis_url: None,
        jwt_secret: "test-secret".to_owned(),
        token_ttl_secs: 3600,
        data_dir,
        turn_lock_ttl_secs: 30,
        cache_ttl_secs: 300,
        negative_cache_ttl_secs: 20,
    }
}

/// Full resource bundle over in-memory backends
pub async fn test_resources(data_dir: PathBuf) -> Arc<ServerResources> {
    let database = test_database().await;
    ServerResources::from_parts(
        test_config(data_dir),
        database,
        Cache::Memory(InMemoryCache::new()),
    )
}

/// Create a user and return its id
pub async fn create_user(database: &Database, username: &str) -> Uuid {
    database
        .users()
        .create_user(username, "$2b$12$testhashtesthashtesthash")
        .await
        .unwrap()
}

/// Create an admin user and return its id
pub async fn create_admin(database: &Database, username: &str) -> Uuid {
    let user_id = create_user(database, username).await;
    database.users().set_admin(user_id, true).await.unwrap();
    user_id
}

/// Register an LLM configuration directly (bypassing the connectivity probe)
pub async fn create_llm(
    database: &Database,
    uploader_id: Uuid,
    name: &str,
    request_style: RequestStyle,
) -> LlmConfig {
    database
        .registry()
        .create_llm(&NewLlmConfig {
            name: name.to_owned(),
            provider: ProviderKind::OpenAi,
            request_style,
            base_url: "http://127.0.0.1:1/v1".to_owned(),
            api_key: "sk-test".to_owned(),
            system_name: "system".to_owned(),
            system_prompt: "Be helpful.".to_owned(),
            user_name: "user".to_owned(),
            assistant_name: "assistant".to_owned(),
            max_tokens: 256,
            uploader_id,
        })
        .await
        .unwrap()
}

/// Register an embedding configuration directly (bypassing the probe)
pub async fn create_embedding(
    database: &Database,
    uploader_id: Uuid,
    name: &str,
) -> EmbeddingConfig {
    database
        .registry()
        .create_embedding(&NewEmbeddingConfig {
            name: name.to_owned(),
            provider: ProviderKind::OpenAi,
            base_url: "http://127.0.0.1:1/v1".to_owned(),
            api_key: "sk-test".to_owned(),
            chunk_size: 512,
            dimensions: 4,
            uploader_id,
        })
        .await
        .unwrap()
}
