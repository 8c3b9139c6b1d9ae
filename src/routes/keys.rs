// ABOUTME: API key route handlers guarded by the identity credential
// ABOUTME: Issues, lists and revokes opaque secrets under the per-user cap
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::identity_auth;
use crate::errors::{AppResult, ErrorCode, StandardResponse};
use crate::resources::ServerResources;

/// Optional target-user override for admin listings
#[derive(Debug, Default, Deserialize)]
pub struct TargetUserQuery {
    /// Target user id; defaults to the caller
    #[serde(default)]
    pub uid: Option<Uuid>,
}

/// API key routes handler
pub struct KeyRoutes;

impl KeyRoutes {
    /// Create the API key routes
    #[must_use]
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/v1/key", post(Self::generate_key))
            .route("/v1/key/keys", get(Self::list_keys))
            .route("/v1/key/:key_id/delete", delete(Self::delete_key))
            .with_state(resources)
    }

    /// Issue a new API key for the caller
    async fn generate_key(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> AppResult<StandardResponse> {
        let auth = identity_auth(&headers, &resources.config)?;

        let key = match resources.database.api_keys().create_key(auth.user_id).await {
            Ok(key) => key,
            // The cap rejection is an application error, not a fault
            Err(e) if e.code == ErrorCode::InvalidInput => {
                return Ok(StandardResponse::error(e.message));
            }
            Err(e) => return Err(e),
        };

        resources
            .database
            .users()
            .adjust_api_key_count(auth.user_id, 1)
            .await?;

        Ok(StandardResponse::success_with(
            "Generate api key successfully. Please save it carefully.",
            json!({
                "api_key_id": key.id,
                "api_key_secret": key.secret,
                "create_at": key.created_at,
                "expire_at": key.expires_at,
            }),
        ))
    }

    /// List live keys for the caller (or another user, admin only)
    async fn list_keys(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(query): Query<TargetUserQuery>,
    ) -> AppResult<StandardResponse> {
        let auth = identity_auth(&headers, &resources.config)?;

        let target = query.uid.unwrap_or(auth.user_id);
        if !auth.may_act_for(target) {
            return Ok(StandardResponse::error("No permission"));
        }

        let keys = resources.database.api_keys().list_keys(target).await?;
        let key_list: Vec<_> = keys
            .into_iter()
            .map(|k| {
                json!({
                    "api_key_id": k.id,
                    "api_key_secret": k.secret,
                    "create_at": k.created_at,
                    "expire_at": k.expires_at,
                })
            })
            .collect();

        Ok(StandardResponse::success(json!({
            "uid": target,
            "api_key_list": key_list,
        })))
    }

    /// Revoke a key (owner or admin)
    async fn delete_key(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(key_id): Path<Uuid>,
    ) -> AppResult<StandardResponse> {
        let auth = identity_auth(&headers, &resources.config)?;

        let Some(key) = resources.database.api_keys().get_key(key_id).await? else {
            return Ok(StandardResponse::error("Key not exist"));
        };

        if !auth.may_act_for(key.user_id) {
            return Ok(StandardResponse::error("No permission"));
        }

        let deleted = resources.database.api_keys().delete_key(key_id).await?;
        if !deleted {
            return Ok(StandardResponse::error("Key not exist"));
        }

        resources
            .database
            .users()
            .adjust_api_key_count(key.user_id, -1)
            .await?;

        Ok(StandardResponse::success_message(
            "Delete api key successfully",
        ))
    }
}
