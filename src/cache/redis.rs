// ABOUTME: Redis cache backend over a shared async connection manager
// ABOUTME: SET-NX with expiry backs the chat turn lock
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::redis_err;
use crate::errors::AppResult;

/// Redis cache backend
///
/// `ConnectionManager` multiplexes and reconnects internally, so the handle
/// clones cheaply into every request task.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect and verify the server responds to PING
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or the ping fails
    pub async fn connect(redis_url: &str) -> AppResult<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| redis_err("Invalid redis URL", &e))?;
        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| redis_err("Redis connection failed", &e))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("Redis ping failed", &e))?;
        tracing::info!("Connected to redis ({pong})");

        Ok(Self { conn })
    }

    /// Get a value
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails
    pub async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| redis_err("Redis GET failed", &e))
    }

    /// Set a value with a TTL
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, secs)
            .await
            .map_err(|e| redis_err("Redis SETEX failed", &e))
    }

    /// Set only if absent, with a TTL; returns whether the write happened
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails
    pub async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs().max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_err("Redis SET NX failed", &e))?;
        Ok(reply.is_some())
    }

    /// Delete a key
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails
    pub async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| redis_err("Redis DEL failed", &e))
    }
}
