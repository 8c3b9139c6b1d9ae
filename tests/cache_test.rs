// ABOUTME: Integration tests for the read-through cache contract
// ABOUTME: Covers loader fallback, negative markers and invalidation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

#![allow(missing_docs, clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tessera_chat_server::cache::{Cache, InMemoryCache};

fn memory_cache() -> Cache {
    Cache::Memory(InMemoryCache::new())
}

const TTL: Duration = Duration::from_secs(60);
const NEG_TTL: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_get_or_load_runs_loader_once() {
    let cache = memory_cache();
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let value = cache
            .get_or_load("key", TTL, NEG_TTL, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some("loaded".to_owned()))
            })
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("loaded"));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_negative_marker_caches_absence() {
    let cache = memory_cache();
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let value: Option<String> = cache
            .get_or_load("missing", TTL, NEG_TTL, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
            .await
            .unwrap();
        assert!(value.is_none());
    }

    // "Not found" is served from the marker after the first lookup
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalidate_forces_reload() {
    let cache = memory_cache();
    let calls = AtomicUsize::new(0);

    let load = || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(calls.load(Ordering::SeqCst)))
    };

    let first = cache.get_or_load("key", TTL, NEG_TTL, load).await.unwrap();
    assert_eq!(first, Some(1));

    cache.invalidate("key").await.unwrap();

    let second = cache.get_or_load("key", TTL, NEG_TTL, load).await.unwrap();
    assert_eq!(second, Some(2));
}

#[tokio::test]
async fn test_loader_error_propagates_and_is_not_cached() {
    let cache = memory_cache();

    let result: Result<Option<String>, _> = cache
        .get_or_load("key", TTL, NEG_TTL, || async {
            Err(tessera_chat_server::errors::AppError::database("down"))
        })
        .await;
    assert!(result.is_err());

    // The failed load left no entry behind
    let value = cache
        .get_or_load("key", TTL, NEG_TTL, || async { Ok(Some(7_i64)) })
        .await
        .unwrap();
    assert_eq!(value, Some(7));
}

#[tokio::test]
async fn test_undecodable_entry_degrades_to_loader() {
    let cache = memory_cache();
    cache.set_raw("key", "not json at all {{{", TTL).await.unwrap();

    let value = cache
        .get_or_load("key", TTL, NEG_TTL, || async { Ok(Some(42_i64)) })
        .await
        .unwrap();
    assert_eq!(value, Some(42));
}
