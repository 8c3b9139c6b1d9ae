// ABOUTME: Explicitly constructed dependency bundle injected into every route
// ABOUTME: Owns the database, cache, outbound HTTP client and configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::sync::Arc;

use crate::cache::Cache;
use crate::config::ServerConfig;
use crate::database::Database;
use crate::errors::AppResult;

/// Shared server resources
///
/// Constructed once at startup and passed as `Arc<ServerResources>` state to
/// every router - resource lifecycle is tied to process startup/shutdown and
/// nothing here lives in a module global.
pub struct ServerResources {
    /// Runtime configuration
    pub config: ServerConfig,
    /// Relational store (source of truth)
    pub database: Database,
    /// Derived-state cache and turn locks
    pub cache: Cache,
    /// Outbound HTTP client for model providers and URL ingestion
    pub http: reqwest::Client,
}

impl ServerResources {
    /// Open every backing service described by the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the database or cache cannot be opened
    pub async fn open(config: ServerConfig) -> AppResult<Arc<Self>> {
        let database = Database::connect(&config.database_url).await?;
        let cache = Cache::connect(config.redis_url.as_deref()).await?;
        let http = reqwest::Client::new();

        tracing::info!(
            "Server resources ready (cache: {cache:?}, data dir: {})",
            config.data_dir.display()
        );

        Ok(Arc::new(Self {
            config,
            database,
            cache,
            http,
        }))
    }

    /// Assemble resources from already-open parts (tests)
    #[must_use]
    pub fn from_parts(config: ServerConfig, database: Database, cache: Cache) -> Arc<Self> {
        Arc::new(Self {
            config,
            database,
            cache,
            http: reqwest::Client::new(),
        })
    }
}
