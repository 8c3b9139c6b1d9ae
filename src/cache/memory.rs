// ABOUTME: In-memory cache backend over a concurrent map with lazy TTL expiry
// ABOUTME: Used for tests and single-node deployments without Redis
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Stored entry: value plus absolute expiry
#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-local cache backend
///
/// Entries expire lazily on access; the map is shared behind an `Arc` so
/// cloning the handle is cheap.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<DashMap<String, Entry>>,
}

impl InMemoryCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a live entry
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Set an entry with a TTL
    pub fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Set only if absent or expired; returns whether the write happened
    pub fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let mut acquired = false;
        let entry = self
            .entries
            .entry(key.to_owned())
            .and_modify(|existing| {
                if existing.is_expired() {
                    existing.value = value.to_owned();
                    existing.expires_at = Instant::now() + ttl;
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                Entry {
                    value: value.to_owned(),
                    expires_at: Instant::now() + ttl,
                }
            });
        drop(entry);
        acquired
    }

    /// Remove an entry
    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}
