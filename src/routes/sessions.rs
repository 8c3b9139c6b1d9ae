// ABOUTME: Session route handlers: CRUD with read-through caching plus the chat SSE endpoint
// ABOUTME: The chat handler drives the turn state machine behind the per-user lock
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::sse::{KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::auth::api_key_auth;
use crate::cache::keys;
use crate::chat::{prepare_turn, run_turn_stream, TurnLock, TurnRequest, TurnSetup};
use crate::database::MAX_LIVE_SESSIONS;
use crate::errors::{AppResult, ErrorCode, StandardResponse};
use crate::models::MessagePayload;
use crate::resources::ServerResources;

/// Pagination query for the session list
#[derive(Debug, Deserialize)]
pub struct SessionPageQuery {
    /// Zero-based page index
    #[serde(default)]
    pub page_id: i64,
    /// Page size
    #[serde(default = "default_per_page")]
    pub per_page_num: i64,
}

const fn default_per_page() -> i64 {
    20
}

/// Optional target-user override for admin deletion
#[derive(Debug, Default, Deserialize)]
pub struct TargetUserQuery {
    /// Target user id; defaults to the caller
    #[serde(default)]
    pub uid: Option<Uuid>,
}

/// Cached session list entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionSummary {
    session_id: Uuid,
    create_at: DateTime<Utc>,
    last_chat_at: DateTime<Utc>,
}

/// Cached session detail with replayed messages
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionDetail {
    session_id: Uuid,
    create_at: DateTime<Utc>,
    update_at: DateTime<Utc>,
    bind_llm: Option<String>,
    messages: Vec<MessageView>,
}

/// One replayed message in a session detail
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessageView {
    message_id: Uuid,
    chat_at: DateTime<Utc>,
    message: MessagePayload,
}

/// Session routes handler
pub struct SessionRoutes;

impl SessionRoutes {
    /// Create the session routes
    #[must_use]
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/v1/session", post(Self::create_session))
            .route("/v1/session/sessions", get(Self::list_sessions))
            .route("/v1/session/:session_id", get(Self::get_session))
            .route("/v1/session/:session_id/delete", delete(Self::delete_session))
            .route("/v1/session/:session_id/chat", post(Self::chat))
            .with_state(resources)
    }

    /// Create a session (enforces the per-user cap)
    async fn create_session(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> AppResult<StandardResponse> {
        let auth = api_key_auth(&headers, &resources.database).await?;

        let session = match resources.database.sessions().create_session(auth.user_id).await {
            Ok(session) => session,
            Err(e) if e.code == ErrorCode::InvalidInput => {
                return Ok(StandardResponse::error(e.message));
            }
            Err(e) => return Err(e),
        };

        resources
            .cache
            .invalidate(&keys::session_list(auth.user_id))
            .await?;

        Ok(StandardResponse::success(json!({
            "session_id": session.id,
            "create_at": session.created_at,
        })))
    }

    /// Paginated session list, served through the read-through cache
    async fn list_sessions(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(query): Query<SessionPageQuery>,
    ) -> AppResult<StandardResponse> {
        let auth = api_key_auth(&headers, &resources.database).await?;
        let user_id = auth.user_id;

        // The whole live list is bounded by the session cap, so it is
        // cached as one entry and paged in memory
        let database = resources.database.clone();
        let full_list = resources
            .cache
            .get_or_load(
                &keys::session_list(user_id),
                Duration::from_secs(resources.config.cache_ttl_secs),
                Duration::from_secs(resources.config.negative_cache_ttl_secs),
                || async move {
                    let sessions = database
                        .sessions()
                        .list_sessions(user_id, 0, MAX_LIVE_SESSIONS)
                        .await?;
                    let summaries: Vec<SessionSummary> = sessions
                        .into_iter()
                        .map(|s| SessionSummary {
                            session_id: s.id,
                            create_at: s.created_at,
                            last_chat_at: s.updated_at,
                        })
                        .collect();
                    Ok(Some(summaries))
                },
            )
            .await?
            .unwrap_or_default();

        let per_page = query.per_page_num.max(1) as usize;
        let page = query.page_id.max(0) as usize;
        let page_items: Vec<&SessionSummary> =
            full_list.iter().skip(page * per_page).take(per_page).collect();

        Ok(StandardResponse::success(json!({
            "session_list": page_items,
        })))
    }

    /// Session detail with replayed messages (negative-cached when missing)
    async fn get_session(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(session_id): Path<Uuid>,
    ) -> AppResult<StandardResponse> {
        let auth = api_key_auth(&headers, &resources.database).await?;
        let user_id = auth.user_id;

        let database = resources.database.clone();
        let detail = resources
            .cache
            .get_or_load(
                &keys::session_detail(session_id),
                Duration::from_secs(resources.config.cache_ttl_secs),
                Duration::from_secs(resources.config.negative_cache_ttl_secs),
                || async move {
                    let Some(session) = database.sessions().get_session(session_id, user_id).await?
                    else {
                        return Ok(None);
                    };

                    let bind_llm = match session.llm_id {
                        Some(llm_id) => database
                            .registry()
                            .get_llm_by_id(llm_id)
                            .await?
                            .map(|llm| llm.name),
                        None => None,
                    };

                    let messages = database
                        .sessions()
                        .list_messages(session_id)
                        .await?
                        .into_iter()
                        .map(|m| MessageView {
                            message_id: m.id,
                            chat_at: m.created_at,
                            message: m.payload,
                        })
                        .collect();

                    Ok(Some(SessionDetail {
                        session_id: session.id,
                        create_at: session.created_at,
                        update_at: session.updated_at,
                        bind_llm,
                        messages,
                    }))
                },
            )
            .await?;

        match detail {
            Some(detail) => Ok(StandardResponse::success(
                serde_json::to_value(detail).unwrap_or_default(),
            )),
            None => Ok(StandardResponse::error("Session not exist")),
        }
    }

    /// Soft-delete a session (owner, or admin acting for a target user)
    async fn delete_session(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(session_id): Path<Uuid>,
        Query(query): Query<TargetUserQuery>,
    ) -> AppResult<StandardResponse> {
        let auth = api_key_auth(&headers, &resources.database).await?;

        let target = query.uid.unwrap_or(auth.user_id);
        if !auth.may_act_for(target) {
            return Ok(StandardResponse::error("No permission"));
        }

        let deleted = resources
            .database
            .sessions()
            .delete_session(session_id, target)
            .await?;
        if !deleted {
            return Ok(StandardResponse::error("Session not exist"));
        }

        resources
            .cache
            .invalidate(&keys::session_detail(session_id))
            .await?;
        resources
            .cache
            .invalidate(&keys::session_list(target))
            .await?;

        Ok(StandardResponse::success_message(
            "Delete session successfully",
        ))
    }

    /// One chat turn: lock, resolve, stream, persist, unlock
    ///
    /// Precondition failures return a structured JSON envelope instead of
    /// opening a stream; the lock is released on every such path.
    async fn chat(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(session_id): Path<Uuid>,
        Json(request): Json<TurnRequest>,
    ) -> AppResult<Response> {
        let auth = api_key_auth(&headers, &resources.database).await?;

        // At most one concurrent chat turn per user - never queued
        let lock_ttl = Duration::from_secs(resources.config.turn_lock_ttl_secs);
        let Some(mut lock) = TurnLock::acquire(&resources.cache, auth.user_id, lock_ttl).await?
        else {
            return Ok(
                StandardResponse::error("You are chatting, please wait a moment").into_response(),
            );
        };

        let setup = match prepare_turn(&resources, auth.user_id, session_id, &request).await {
            Ok(setup) => setup,
            Err(e) => {
                // Unexpected init faults: log, release, report generically
                error!("Chat init failed on session {session_id}: {e}");
                lock.release().await;
                return Ok(StandardResponse::error("Chat init failed").into_response());
            }
        };

        let context = match setup {
            TurnSetup::Ready(context) => *context,
            TurnSetup::Rejected(message) => {
                lock.release().await;
                return Ok(StandardResponse::error(message).into_response());
            }
        };

        // The stored turn will change the session detail and list
        resources
            .cache
            .invalidate(&keys::session_detail(session_id))
            .await?;
        resources
            .cache
            .invalidate(&keys::session_list(auth.user_id))
            .await?;

        let stream = run_turn_stream(resources, lock, context, request);
        Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response())
    }
}
