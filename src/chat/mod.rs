// ABOUTME: Chat turn orchestration: SSE frames, the per-user turn lock and the state machine
// ABOUTME: A turn runs locked -> llm-resolved -> (retrieval) -> streaming -> persisted -> unlocked
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

/// Turn preparation and the streaming generator
pub mod turn;

pub use turn::{prepare_turn, run_turn_stream, TurnContext, TurnRequest, TurnSetup};

use std::time::Duration;

use axum::response::sse::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::cache::Cache;
use crate::errors::AppResult;

// ============================================================================
// SSE frames
// ============================================================================

/// One Server-Sent-Events frame of a chat turn
///
/// `status` distinguishes the lifecycle phases so the client can render
/// incrementally and detect completion; `delta` carries the token text on
/// `llm:new_token` frames and is empty otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseFrame {
    /// Lifecycle phase
    pub status: String,
    /// Token text on partial frames
    pub delta: String,
    /// Phase-specific payload (outputs, error detail)
    pub extras: JsonValue,
}

impl SseFrame {
    fn new(status: &str, delta: String, extras: JsonValue) -> Self {
        Self {
            status: status.to_owned(),
            delta,
            extras,
        }
    }

    /// Turn accepted, pipeline starting
    #[must_use]
    pub fn chain_start() -> Self {
        Self::new("chain:start", String::new(), JsonValue::Object(serde_json::Map::new()))
    }

    /// Model invocation starting
    #[must_use]
    pub fn llm_start() -> Self {
        Self::new("llm:start", String::new(), JsonValue::Object(serde_json::Map::new()))
    }

    /// One streamed token
    #[must_use]
    pub fn token(delta: String) -> Self {
        Self::new("llm:new_token", delta, JsonValue::Object(serde_json::Map::new()))
    }

    /// Model finished emitting tokens
    #[must_use]
    pub fn llm_end() -> Self {
        Self::new("llm:end", String::new(), JsonValue::Object(serde_json::Map::new()))
    }

    /// Terminal frame with the assembled outputs
    #[must_use]
    pub fn chain_end(outputs: JsonValue) -> Self {
        Self::new(
            "chain:end",
            String::new(),
            serde_json::json!({ "outputs": outputs }),
        )
    }

    /// Terminal error frame - the connection still closes well-formed
    #[must_use]
    pub fn error(message: &str) -> Self {
        Self::new(
            "error",
            String::new(),
            serde_json::json!({ "message": message }),
        )
    }

    /// Render as an SSE event
    #[must_use]
    pub fn into_event(self) -> Event {
        let data = serde_json::to_string(&self).unwrap_or_else(|_| {
            r#"{"status":"error","delta":"","extras":{"message":"frame serialization failed"}}"#
                .to_owned()
        });
        Event::default().data(data)
    }
}

// ============================================================================
// Turn lock
// ============================================================================

/// Per-user chat turn mutual-exclusion guard
///
/// Backed by a SET-NX cache entry with a TTL backstop. Release is explicit
/// (async teardown cannot run in `Drop`); every exit path of a turn must
/// call [`TurnLock::release`], and the TTL covers a crashed turn that never
/// reaches one.
pub struct TurnLock {
    cache: Cache,
    user_id: Uuid,
    released: bool,
}

impl TurnLock {
    /// Try to acquire the lock for a user
    ///
    /// Returns `None` when another turn already holds it - the caller
    /// reports "busy" and never queues.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend fails
    pub async fn acquire(cache: &Cache, user_id: Uuid, ttl: Duration) -> AppResult<Option<Self>> {
        if cache.acquire_turn_lock(user_id, ttl).await? {
            Ok(Some(Self {
                cache: cache.clone(),
                user_id,
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Release the lock (idempotent)
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.cache.release_turn_lock(self.user_id).await {
            tracing::warn!("Failed to release turn lock for {}: {e}", self.user_id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_statuses() {
        assert_eq!(SseFrame::chain_start().status, "chain:start");
        assert_eq!(SseFrame::token("hi".to_owned()).delta, "hi");
        assert_eq!(SseFrame::llm_end().delta, "");
        assert_eq!(SseFrame::error("boom").status, "error");
    }

    #[test]
    fn test_frame_serialization() {
        let frame = SseFrame::token("abc".to_owned());
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""status":"llm:new_token""#));
        assert!(json.contains(r#""delta":"abc""#));
    }

    #[test]
    fn test_chain_end_carries_outputs() {
        let frame = SseFrame::chain_end(serde_json::json!({"result": "done"}));
        assert_eq!(frame.extras["outputs"]["result"], "done");
    }

    #[tokio::test]
    async fn test_lock_mutual_exclusion() {
        let cache = Cache::Memory(crate::cache::InMemoryCache::new());
        let uid = Uuid::new_v4();
        let ttl = Duration::from_secs(30);

        let mut first = TurnLock::acquire(&cache, uid, ttl).await.unwrap().unwrap();
        assert!(TurnLock::acquire(&cache, uid, ttl).await.unwrap().is_none());

        first.release().await;
        let second = TurnLock::acquire(&cache, uid, ttl).await.unwrap();
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn test_lock_is_per_user() {
        let cache = Cache::Memory(crate::cache::InMemoryCache::new());
        let ttl = Duration::from_secs(30);

        let _a = TurnLock::acquire(&cache, Uuid::new_v4(), ttl).await.unwrap().unwrap();
        let b = TurnLock::acquire(&cache, Uuid::new_v4(), ttl).await.unwrap();
        assert!(b.is_some());
    }

    #[tokio::test]
    async fn test_lock_release_is_idempotent() {
        let cache = Cache::Memory(crate::cache::InMemoryCache::new());
        let uid = Uuid::new_v4();
        let mut lock = TurnLock::acquire(&cache, uid, Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        lock.release().await;
        lock.release().await;
        assert!(TurnLock::acquire(&cache, uid, Duration::from_secs(30))
            .await
            .unwrap()
            .is_some());
    }
}
