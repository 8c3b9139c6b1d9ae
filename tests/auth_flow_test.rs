// ABOUTME: HTTP-level scenario tests for registration, login and key issuance
// ABOUTME: Drives the assembled router with tower oneshot requests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

#![allow(missing_docs, clippy::unwrap_used)]

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value as JsonValue;
use tower::ServiceExt;

use tessera_chat_server::routes::build_router;

async fn test_router() -> Router {
    let dir = std::env::temp_dir().join(format!("tessera-test-{}", uuid::Uuid::new_v4()));
    let resources = common::test_resources(dir).await;
    build_router(resources)
}

async fn send_json(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_register_login_and_key_cap_scenario() {
    let router = test_router().await;

    // Register alice
    let (status, body) = send_json(
        &router,
        "POST",
        "/v1/user/register",
        None,
        Some(serde_json::json!({"user": "alice", "password": "pw1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);

    // Login returns a token
    let (status, body) = send_json(
        &router,
        "POST",
        "/v1/user/login",
        None,
        Some(serde_json::json!({"user": "alice", "password": "pw1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    let token = body["data"]["token"].as_str().unwrap().to_owned();
    assert!(!token.is_empty());

    // Five keys succeed with non-empty secrets
    for _ in 0..5 {
        let (status, body) = send_json(&router, "POST", "/v1/key", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 0);
        let secret = body["data"]["api_key_secret"].as_str().unwrap();
        assert!(!secret.is_empty());
    }

    // The sixth is rejected with the cap message
    let (status, body) = send_json(&router, "POST", "/v1/key", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 1);
    assert!(body["message"].as_str().unwrap().contains("5"));
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let router = test_router().await;

    send_json(
        &router,
        "POST",
        "/v1/user/register",
        None,
        Some(serde_json::json!({"user": "bob", "password": "right"})),
    )
    .await;

    let (status, body) = send_json(
        &router,
        "POST",
        "/v1/user/login",
        None,
        Some(serde_json::json!({"user": "bob", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 1);
}

#[tokio::test]
async fn test_protected_route_requires_bearer_token() {
    let router = test_router().await;

    let (status, _) = send_json(&router, "POST", "/v1/key", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_json(&router, "POST", "/v1/key", Some("garbage-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_api_key_guard_on_session_routes() {
    let router = test_router().await;

    // An unknown API-key secret is rejected with a bearer challenge
    let (status, _) = send_json(&router, "POST", "/v1/session", Some("sk-unknown"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_create_and_chat_with_missing_llm_releases_lock() {
    let router = test_router().await;

    // Register, login, issue a key
    send_json(
        &router,
        "POST",
        "/v1/user/register",
        None,
        Some(serde_json::json!({"user": "carol", "password": "pw"})),
    )
    .await;
    let (_, body) = send_json(
        &router,
        "POST",
        "/v1/user/login",
        None,
        Some(serde_json::json!({"user": "carol", "password": "pw"})),
    )
    .await;
    let token = body["data"]["token"].as_str().unwrap().to_owned();
    let (_, body) = send_json(&router, "POST", "/v1/key", Some(&token), None).await;
    let secret = body["data"]["api_key_secret"].as_str().unwrap().to_owned();

    // Create a session with the API key
    let (status, body) = send_json(&router, "POST", "/v1/session", Some(&secret), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    let session_id = body["data"]["session_id"].as_str().unwrap().to_owned();

    let chat_body = serde_json::json!({
        "llm_name": "no-such-model",
        "temperature": 0.7,
        "message": "hello",
    });

    // The turn fails on the missing model as a structured envelope
    let (status, body) = send_json(
        &router,
        "POST",
        &format!("/v1/session/{session_id}/chat"),
        Some(&secret),
        Some(chat_body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 1);
    assert_eq!(body["message"], "LLM not exist");

    // The lock was released: the next attempt is not rejected as busy
    let (_, body) = send_json(
        &router,
        "POST",
        &format!("/v1/session/{session_id}/chat"),
        Some(&secret),
        Some(chat_body),
    )
    .await;
    assert_eq!(body["message"], "LLM not exist");
}
