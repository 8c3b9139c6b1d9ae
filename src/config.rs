// ABOUTME: Server configuration loaded from environment variables
// ABOUTME: Environment-only approach - no config files, explicit defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::env;
use std::path::PathBuf;

use crate::errors::{AppError, AppResult};

/// Default HTTP port when `TESSERA_HTTP_PORT` is unset
const DEFAULT_HTTP_PORT: u16 = 8081;

/// Default TTL (seconds) for the per-user chat turn lock
const DEFAULT_TURN_LOCK_TTL_SECS: u64 = 30;

/// Default TTL (seconds) for read-through cache entries
const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default TTL (seconds) for negative-cache markers
const DEFAULT_NEGATIVE_CACHE_TTL_SECS: u64 = 20;

/// Identity token lifetime in seconds (24 hours)
const DEFAULT_TOKEN_TTL_SECS: u64 = 86_400;

/// Runtime configuration assembled from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// `SQLite` connection string
    pub database_url: String,
    /// Redis connection string; in-memory cache backend when unset
    pub redis_url: Option<String>,
    /// HMAC secret for identity tokens
    pub jwt_secret: String,
    /// Identity token lifetime in seconds
    pub token_ttl_secs: u64,
    /// Root directory for persisted vector indexes
    pub data_dir: PathBuf,
    /// Per-user chat turn lock TTL in seconds
    pub turn_lock_ttl_secs: u64,
    /// Read-through cache entry TTL in seconds
    pub cache_ttl_secs: u64,
    /// Negative-cache marker TTL in seconds
    pub negative_cache_ttl_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns a config error when `TESSERA_JWT_SECRET` is missing or a
    /// numeric variable fails to parse.
    pub fn from_env() -> AppResult<Self> {
        let http_port = parse_env("TESSERA_HTTP_PORT", DEFAULT_HTTP_PORT)?;
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:tessera.db".to_owned());
        let redis_url = env::var("REDIS_URL").ok().filter(|v| !v.is_empty());
        let jwt_secret = env::var("TESSERA_JWT_SECRET")
            .map_err(|_| AppError::config("TESSERA_JWT_SECRET environment variable not set"))?;
        let data_dir = env::var("TESSERA_DATA_DIR")
            .map_or_else(|_| PathBuf::from("data"), PathBuf::from);

        Ok(Self {
            http_port,
            database_url,
            redis_url,
            jwt_secret,
            token_ttl_secs: parse_env("TESSERA_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?,
            data_dir,
            turn_lock_ttl_secs: parse_env("TESSERA_TURN_LOCK_TTL_SECS", DEFAULT_TURN_LOCK_TTL_SECS)?,
            cache_ttl_secs: parse_env("TESSERA_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?,
            negative_cache_ttl_secs: parse_env(
                "TESSERA_NEGATIVE_CACHE_TTL_SECS",
                DEFAULT_NEGATIVE_CACHE_TTL_SECS,
            )?,
        })
    }
}

/// Parse an optional numeric environment variable with a default
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> AppResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::config(format!("Invalid value for {name}: {raw}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_default() {
        assert_eq!(parse_env::<u16>("TESSERA_UNSET_VAR", 42).unwrap(), 42);
    }

    #[test]
    fn test_parse_env_invalid() {
        env::set_var("TESSERA_TEST_BAD_PORT", "not-a-number");
        assert!(parse_env::<u16>("TESSERA_TEST_BAD_PORT", 1).is_err());
        env::remove_var("TESSERA_TEST_BAD_PORT");
    }
}
