// ABOUTME: Integration tests for API key issuance, the live-key cap and revocation
// ABOUTME: Exercises the ApiKeyManager against an in-memory database
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

#![allow(missing_docs, clippy::unwrap_used)]

mod common;

use chrono::{Duration, Utc};
use tessera_chat_server::database::MAX_LIVE_API_KEYS;
use tessera_chat_server::errors::ErrorCode;

#[tokio::test]
async fn test_issue_and_resolve_key() {
    let database = common::test_database().await;
    let user_id = common::create_user(&database, "alice").await;

    let key = database.api_keys().create_key(user_id).await.unwrap();
    assert!(key.secret.starts_with("sk-"));

    let resolved = database
        .api_keys()
        .resolve_secret(&key.secret)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.user_id, user_id);
    assert_eq!(resolved.id, key.id);
}

#[tokio::test]
async fn test_unknown_secret_resolves_to_none() {
    let database = common::test_database().await;
    let resolved = database
        .api_keys()
        .resolve_secret("sk-nonexistent")
        .await
        .unwrap();
    assert!(resolved.is_none());
}

#[tokio::test]
async fn test_live_key_cap_rejects_sixth() {
    let database = common::test_database().await;
    let user_id = common::create_user(&database, "alice").await;

    for _ in 0..MAX_LIVE_API_KEYS {
        database.api_keys().create_key(user_id).await.unwrap();
    }
    assert_eq!(
        database.api_keys().count_live_keys(user_id).await.unwrap(),
        MAX_LIVE_API_KEYS
    );

    let err = database.api_keys().create_key(user_id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
    assert!(err.message.contains("5"));
}

#[tokio::test]
async fn test_revocation_frees_a_slot() {
    let database = common::test_database().await;
    let user_id = common::create_user(&database, "alice").await;

    let mut first = None;
    for i in 0..MAX_LIVE_API_KEYS {
        let key = database.api_keys().create_key(user_id).await.unwrap();
        if i == 0 {
            first = Some(key);
        }
    }

    assert!(database
        .api_keys()
        .delete_key(first.unwrap().id)
        .await
        .unwrap());

    // Back under the cap
    database.api_keys().create_key(user_id).await.unwrap();
}

#[tokio::test]
async fn test_deleted_key_no_longer_authenticates() {
    let database = common::test_database().await;
    let user_id = common::create_user(&database, "alice").await;

    let key = database.api_keys().create_key(user_id).await.unwrap();
    assert!(database.api_keys().delete_key(key.id).await.unwrap());

    let resolved = database
        .api_keys()
        .resolve_secret(&key.secret)
        .await
        .unwrap();
    assert!(resolved.is_none());
}

#[tokio::test]
async fn test_expired_key_is_not_live() {
    let database = common::test_database().await;
    let user_id = common::create_user(&database, "alice").await;

    let key = database.api_keys().create_key(user_id).await.unwrap();

    // Force the expiry into the past
    sqlx::query("UPDATE api_keys SET expires_at = $1 WHERE id = $2")
        .bind(Utc::now() - Duration::days(1))
        .bind(key.id.to_string())
        .execute(database.pool())
        .await
        .unwrap();

    assert!(database
        .api_keys()
        .resolve_secret(&key.secret)
        .await
        .unwrap()
        .is_none());
    assert_eq!(database.api_keys().count_live_keys(user_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cap_counts_per_user() {
    let database = common::test_database().await;
    let alice = common::create_user(&database, "alice").await;
    let bob = common::create_user(&database, "bob").await;

    for _ in 0..MAX_LIVE_API_KEYS {
        database.api_keys().create_key(alice).await.unwrap();
    }

    // Bob's quota is untouched by Alice's keys
    database.api_keys().create_key(bob).await.unwrap();
}
