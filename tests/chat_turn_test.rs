// ABOUTME: Integration tests for chat turn preparation and the per-user lock discipline
// ABOUTME: Covers sticky binding, precondition rejections and lock release after failure
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

#![allow(missing_docs, clippy::unwrap_used, clippy::panic)]

mod common;

use std::time::Duration;

use tessera_chat_server::chat::{prepare_turn, TurnLock, TurnRequest, TurnSetup};
use tessera_chat_server::models::RequestStyle;
use uuid::Uuid;

fn turn_request(llm_name: &str) -> TurnRequest {
    TurnRequest {
        llm_name: llm_name.to_owned(),
        temperature: 0.7,
        message: "hello there".to_owned(),
        vector_db_id: None,
    }
}

#[tokio::test]
async fn test_missing_session_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let resources = common::test_resources(dir.path().to_path_buf()).await;
    let user_id = common::create_user(&resources.database, "alice").await;

    let setup = prepare_turn(&resources, user_id, Uuid::new_v4(), &turn_request("any"))
        .await
        .unwrap();

    match setup {
        TurnSetup::Rejected(message) => assert_eq!(message, "Session not exist"),
        TurnSetup::Ready(_) => panic!("expected rejection"),
    }
}

#[tokio::test]
async fn test_missing_llm_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let resources = common::test_resources(dir.path().to_path_buf()).await;
    let user_id = common::create_user(&resources.database, "alice").await;
    let session = resources.database.sessions().create_session(user_id).await.unwrap();

    let setup = prepare_turn(&resources, user_id, session.id, &turn_request("no-such-model"))
        .await
        .unwrap();

    match setup {
        TurnSetup::Rejected(message) => assert_eq!(message, "LLM not exist"),
        TurnSetup::Ready(_) => panic!("expected rejection"),
    }
}

#[tokio::test]
async fn test_first_turn_binds_llm_and_binding_is_sticky() {
    let dir = tempfile::tempdir().unwrap();
    let resources = common::test_resources(dir.path().to_path_buf()).await;
    let database = &resources.database;

    let admin = common::create_admin(database, "root").await;
    let user_id = common::create_user(database, "alice").await;
    let first = common::create_llm(database, admin, "model-one", RequestStyle::Message).await;
    let _second = common::create_llm(database, admin, "model-two", RequestStyle::Message).await;

    let session = database.sessions().create_session(user_id).await.unwrap();

    // First turn selects model-one and persists the binding
    let setup = prepare_turn(&resources, user_id, session.id, &turn_request("model-one"))
        .await
        .unwrap();
    match setup {
        TurnSetup::Ready(context) => assert_eq!(context.llm.id, first.id),
        TurnSetup::Rejected(message) => panic!("unexpected rejection: {message}"),
    }

    let bound = database
        .sessions()
        .get_session(session.id, user_id)
        .await
        .unwrap()
        .unwrap()
        .llm_id;
    assert_eq!(bound, Some(first.id));

    // A later turn naming a different model still resolves the bound one
    let setup = prepare_turn(&resources, user_id, session.id, &turn_request("model-two"))
        .await
        .unwrap();
    match setup {
        TurnSetup::Ready(context) => assert_eq!(context.llm.id, first.id),
        TurnSetup::Rejected(message) => panic!("unexpected rejection: {message}"),
    }
}

#[tokio::test]
async fn test_lock_released_after_rejected_turn_allows_next_chat() {
    let dir = tempfile::tempdir().unwrap();
    let resources = common::test_resources(dir.path().to_path_buf()).await;
    let user_id = common::create_user(&resources.database, "alice").await;
    let session = resources.database.sessions().create_session(user_id).await.unwrap();

    let ttl = Duration::from_secs(30);

    // Acquire the lock as the chat handler would, hit a rejected
    // precondition, release
    let mut lock = TurnLock::acquire(&resources.cache, user_id, ttl)
        .await
        .unwrap()
        .unwrap();
    let setup = prepare_turn(&resources, user_id, session.id, &turn_request("missing-model"))
        .await
        .unwrap();
    assert!(matches!(setup, TurnSetup::Rejected(_)));
    lock.release().await;

    // A second chat attempt is not rejected as busy
    let second = TurnLock::acquire(&resources.cache, user_id, ttl).await.unwrap();
    assert!(second.is_some());
}

#[tokio::test]
async fn test_concurrent_turn_is_busy_until_release() {
    let dir = tempfile::tempdir().unwrap();
    let resources = common::test_resources(dir.path().to_path_buf()).await;
    let user_id = common::create_user(&resources.database, "alice").await;

    let ttl = Duration::from_secs(30);
    let mut held = TurnLock::acquire(&resources.cache, user_id, ttl)
        .await
        .unwrap()
        .unwrap();

    assert!(TurnLock::acquire(&resources.cache, user_id, ttl)
        .await
        .unwrap()
        .is_none());

    held.release().await;

    assert!(TurnLock::acquire(&resources.cache, user_id, ttl)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_empty_vector_db_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let resources = common::test_resources(dir.path().to_path_buf()).await;
    let database = &resources.database;

    let admin = common::create_admin(database, "root").await;
    let user_id = common::create_user(database, "alice").await;
    common::create_llm(database, admin, "model-one", RequestStyle::Message).await;
    let embedding = common::create_embedding(database, admin, "embed-one").await;

    let vector_db = database
        .vector_dbs()
        .create_vector_db(user_id, "kb", embedding.id, "")
        .await
        .unwrap();
    let session = database.sessions().create_session(user_id).await.unwrap();

    let mut request = turn_request("model-one");
    request.vector_db_id = Some(vector_db.id);

    let setup = prepare_turn(&resources, user_id, session.id, &request).await.unwrap();
    match setup {
        TurnSetup::Rejected(message) => {
            assert_eq!(message, "Vector DB is empty, please upload data first");
        }
        TurnSetup::Ready(_) => panic!("expected rejection"),
    }
}

#[tokio::test]
async fn test_missing_vector_db_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let resources = common::test_resources(dir.path().to_path_buf()).await;
    let database = &resources.database;

    let admin = common::create_admin(database, "root").await;
    let user_id = common::create_user(database, "alice").await;
    common::create_llm(database, admin, "model-one", RequestStyle::Message).await;
    let session = database.sessions().create_session(user_id).await.unwrap();

    let mut request = turn_request("model-one");
    request.vector_db_id = Some(Uuid::new_v4());

    let setup = prepare_turn(&resources, user_id, session.id, &request).await.unwrap();
    match setup {
        TurnSetup::Rejected(message) => assert_eq!(message, "Vector DB not exist"),
        TurnSetup::Ready(_) => panic!("expected rejection"),
    }
}

#[tokio::test]
async fn test_ready_turn_carries_replayed_history() {
    let dir = tempfile::tempdir().unwrap();
    let resources = common::test_resources(dir.path().to_path_buf()).await;
    let database = &resources.database;

    let admin = common::create_admin(database, "root").await;
    let user_id = common::create_user(database, "alice").await;
    common::create_llm(database, admin, "model-one", RequestStyle::Message).await;

    let session = database.sessions().create_session(user_id).await.unwrap();
    database
        .sessions()
        .append_message(session.id, tessera_chat_server::models::MessageRole::User, "earlier")
        .await
        .unwrap();

    let setup = prepare_turn(&resources, user_id, session.id, &turn_request("model-one"))
        .await
        .unwrap();
    match setup {
        TurnSetup::Ready(context) => {
            assert_eq!(context.history.len(), 1);
            assert_eq!(context.history[0].payload.content, "earlier");
        }
        TurnSetup::Rejected(message) => panic!("unexpected rejection: {message}"),
    }
}
