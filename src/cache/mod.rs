// ABOUTME: Cache abstraction layer with pluggable memory/redis backends
// ABOUTME: Read-through get_or_load contract, negative-cache markers and the chat turn lock
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

/// In-memory cache backend
pub mod memory;
/// Redis cache backend
pub mod redis;

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

pub use memory::InMemoryCache;
pub use self::redis::RedisCache;

// ============================================================================
// Cache keys
// ============================================================================

/// Well-known cache key builders
///
/// Keeping the keyspace in one place means an invalidation site cannot
/// drift out of step with its read site.
pub mod keys {
    use uuid::Uuid;

    /// Per-user chat turn lock
    #[must_use]
    pub fn turn_lock(user_id: Uuid) -> String {
        format!("chat_lock:uid:{user_id}")
    }

    /// Session detail (including replayed messages)
    #[must_use]
    pub fn session_detail(session_id: Uuid) -> String {
        format!("session:{session_id}")
    }

    /// Per-user session list
    #[must_use]
    pub fn session_list(user_id: Uuid) -> String {
        format!("uid:{user_id}:sessions")
    }

    /// LLM registry list
    #[must_use]
    pub fn llm_list() -> String {
        "llms".to_owned()
    }

    /// LLM detail
    #[must_use]
    pub fn llm_detail(llm_id: Uuid) -> String {
        format!("llm_id:{llm_id}")
    }

    /// Embedding registry list
    #[must_use]
    pub fn embedding_list() -> String {
        "embeddings".to_owned()
    }

    /// Embedding detail
    #[must_use]
    pub fn embedding_detail(embedding_id: Uuid) -> String {
        format!("embed_id:{embedding_id}")
    }
}

// ============================================================================
// Cache handle
// ============================================================================

/// Cache backend handle
///
/// A closed two-variant dispatch rather than a trait object: backends are a
/// deliberate, reviewable set. The handle is constructed once at startup and
/// injected through `ServerResources`; there is no module-global client.
///
/// Every entry is derived, expirable state. A missing entry is always a
/// cache miss - never "confirmed nonexistent" - except for the explicit
/// negative markers written by [`Cache::get_or_load`].
#[derive(Clone)]
pub enum Cache {
    /// Process-local backend (tests, single-node deployments)
    Memory(InMemoryCache),
    /// Redis backend
    Redis(RedisCache),
}

impl Cache {
    /// Open the backend for the given URL, or the in-memory backend when
    /// no URL is configured
    ///
    /// # Errors
    ///
    /// Returns an error if the redis connection cannot be established
    pub async fn connect(redis_url: Option<&str>) -> AppResult<Self> {
        match redis_url {
            Some(url) => Ok(Self::Redis(RedisCache::connect(url).await?)),
            None => Ok(Self::Memory(InMemoryCache::new())),
        }
    }

    /// Raw get
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails
    pub async fn get_raw(&self, key: &str) -> AppResult<Option<String>> {
        match self {
            Self::Memory(cache) => Ok(cache.get(key)),
            Self::Redis(cache) => cache.get(key).await,
        }
    }

    /// Raw set with TTL
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails
    pub async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        match self {
            Self::Memory(cache) => {
                cache.set(key, value, ttl);
                Ok(())
            }
            Self::Redis(cache) => cache.set(key, value, ttl).await,
        }
    }

    /// Invalidate an entry
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails
    pub async fn invalidate(&self, key: &str) -> AppResult<()> {
        match self {
            Self::Memory(cache) => {
                cache.delete(key);
                Ok(())
            }
            Self::Redis(cache) => cache.delete(key).await,
        }
    }

    /// Read-through load
    ///
    /// The single fallback contract for every cached query: check the cache,
    /// on miss run `loader`, store the result and return it. The stored
    /// value is an `Option<T>`: `Some` entries use `ttl`, `None` entries
    /// become short-lived negative markers with `negative_ttl` so repeated
    /// lookups of a missing id skip storage.
    ///
    /// Cache failures degrade to the loader - a broken cache never breaks a
    /// read path.
    ///
    /// # Errors
    ///
    /// Returns the loader's error
    pub async fn get_or_load<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        negative_ttl: Duration,
        loader: F,
    ) -> AppResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<Option<T>>>,
    {
        match self.get_raw(key).await {
            Ok(Some(cached)) => {
                if let Ok(value) = serde_json::from_str::<Option<T>>(&cached) {
                    return Ok(value);
                }
                tracing::warn!("Dropping undecodable cache entry for {key}");
                let _ = self.invalidate(key).await;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Cache read failed for {key}: {e}"),
        }

        let loaded = loader().await?;

        let entry_ttl = if loaded.is_some() { ttl } else { negative_ttl };
        match serde_json::to_string(&loaded) {
            Ok(serialized) => {
                if let Err(e) = self.set_raw(key, &serialized, entry_ttl).await {
                    tracing::warn!("Cache write failed for {key}: {e}");
                }
            }
            Err(e) => tracing::warn!("Cache serialization failed for {key}: {e}"),
        }

        Ok(loaded)
    }

    // ========================================================================
    // Chat turn lock
    // ========================================================================

    /// Try to acquire the per-user chat turn lock
    ///
    /// SET-NX semantics with a TTL backstop: at most one concurrent chat
    /// turn per user, and a crashed turn cannot wedge the user out past the
    /// expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails
    pub async fn acquire_turn_lock(&self, user_id: Uuid, ttl: Duration) -> AppResult<bool> {
        let key = keys::turn_lock(user_id);
        match self {
            Self::Memory(cache) => Ok(cache.set_nx(&key, "lock", ttl)),
            Self::Redis(cache) => cache.set_nx(&key, "lock", ttl).await,
        }
    }

    /// Release the per-user chat turn lock
    ///
    /// Must be called on every exit path of a turn; the TTL only covers
    /// paths that never reach a release.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails
    pub async fn release_turn_lock(&self, user_id: Uuid) -> AppResult<()> {
        self.invalidate(&keys::turn_lock(user_id)).await
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory(_) => f.write_str("Cache::Memory"),
            Self::Redis(_) => f.write_str("Cache::Redis"),
        }
    }
}

/// Map a redis error into the crate error type
pub(crate) fn redis_err(context: &str, e: &::redis::RedisError) -> AppError {
    AppError::internal(format!("{context}: {e}"))
}
