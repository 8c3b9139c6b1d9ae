// ABOUTME: Integration tests for sessions: the cap, soft deletion and message replay
// ABOUTME: Verifies persisted order and content fidelity of the append-only message log
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

#![allow(missing_docs, clippy::unwrap_used)]

mod common;

use tessera_chat_server::database::MAX_LIVE_SESSIONS;
use tessera_chat_server::errors::ErrorCode;
use tessera_chat_server::models::{MessageRole, RequestStyle};

#[tokio::test]
async fn test_create_and_get_session() {
    let database = common::test_database().await;
    let user_id = common::create_user(&database, "alice").await;

    let session = database.sessions().create_session(user_id).await.unwrap();
    assert!(session.llm_id.is_none());

    let fetched = database
        .sessions()
        .get_session(session.id, user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.id, session.id);
    assert_eq!(fetched.user_id, user_id);
}

#[tokio::test]
async fn test_session_is_owner_scoped() {
    let database = common::test_database().await;
    let alice = common::create_user(&database, "alice").await;
    let bob = common::create_user(&database, "bob").await;

    let session = database.sessions().create_session(alice).await.unwrap();
    assert!(database
        .sessions()
        .get_session(session.id, bob)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_session_cap_rejects_forty_first() {
    let database = common::test_database().await;
    let user_id = common::create_user(&database, "alice").await;

    for _ in 0..MAX_LIVE_SESSIONS {
        database.sessions().create_session(user_id).await.unwrap();
    }

    let err = database.sessions().create_session(user_id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
    assert!(err.message.contains("40"));
}

#[tokio::test]
async fn test_soft_delete_frees_a_slot_and_hides_session() {
    let database = common::test_database().await;
    let user_id = common::create_user(&database, "alice").await;

    let session = database.sessions().create_session(user_id).await.unwrap();
    for _ in 1..MAX_LIVE_SESSIONS {
        database.sessions().create_session(user_id).await.unwrap();
    }

    assert!(database
        .sessions()
        .delete_session(session.id, user_id)
        .await
        .unwrap());

    assert!(database
        .sessions()
        .get_session(session.id, user_id)
        .await
        .unwrap()
        .is_none());

    // The freed slot admits a new session
    database.sessions().create_session(user_id).await.unwrap();

    // Deleting again is a no-op
    assert!(!database
        .sessions()
        .delete_session(session.id, user_id)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_message_round_trip_preserves_order_and_content() {
    let database = common::test_database().await;
    let user_id = common::create_user(&database, "alice").await;
    let session = database.sessions().create_session(user_id).await.unwrap();

    let sessions = database.sessions();
    sessions
        .append_message(session.id, MessageRole::User, "first question")
        .await
        .unwrap();
    sessions
        .append_message(session.id, MessageRole::Assistant, "first answer")
        .await
        .unwrap();
    sessions
        .append_message(session.id, MessageRole::User, "second question")
        .await
        .unwrap();

    let messages = sessions.list_messages(session.id).await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].payload.role, MessageRole::User);
    assert_eq!(messages[0].payload.content, "first question");
    assert_eq!(messages[1].payload.role, MessageRole::Assistant);
    assert_eq!(messages[1].payload.content, "first answer");
    assert_eq!(messages[2].payload.content, "second question");
}

#[tokio::test]
async fn test_bind_llm_persists() {
    let database = common::test_database().await;
    let admin = common::create_admin(&database, "root").await;
    let user_id = common::create_user(&database, "alice").await;
    let llm = common::create_llm(&database, admin, "gpt-test", RequestStyle::Message).await;

    let session = database.sessions().create_session(user_id).await.unwrap();
    database.sessions().bind_llm(session.id, llm.id).await.unwrap();

    let fetched = database
        .sessions()
        .get_session(session.id, user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.llm_id, Some(llm.id));
}

#[tokio::test]
async fn test_list_sessions_pagination() {
    let database = common::test_database().await;
    let user_id = common::create_user(&database, "alice").await;

    for _ in 0..5 {
        database.sessions().create_session(user_id).await.unwrap();
    }

    let page_one = database.sessions().list_sessions(user_id, 0, 2).await.unwrap();
    let page_two = database.sessions().list_sessions(user_id, 1, 2).await.unwrap();
    let page_three = database.sessions().list_sessions(user_id, 2, 2).await.unwrap();

    assert_eq!(page_one.len(), 2);
    assert_eq!(page_two.len(), 2);
    assert_eq!(page_three.len(), 1);

    let mut seen: Vec<_> = page_one
        .iter()
        .chain(&page_two)
        .chain(&page_three)
        .map(|s| s.id)
        .collect();
    seen.dedup();
    assert_eq!(seen.len(), 5);
}
