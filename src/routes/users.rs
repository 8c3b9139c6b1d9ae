// ABOUTME: User registration and login route handlers
// ABOUTME: Login issues a signed identity token and stamps last_login_at
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::encode_identity_token;
use crate::errors::{AppError, AppResult, StandardResponse};
use crate::resources::ServerResources;

/// Registration and login request body
#[derive(Debug, Deserialize)]
pub struct UserRequest {
    /// Login name
    pub user: String,
    /// Plain password (hashed before storage)
    pub password: String,
}

/// User routes handler
pub struct UserRoutes;

impl UserRoutes {
    /// Create the user routes
    #[must_use]
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/v1/user/register", post(Self::register))
            .route("/v1/user/login", post(Self::login))
            .with_state(resources)
    }

    /// Register a new user account
    async fn register(
        State(resources): State<Arc<ServerResources>>,
        Json(request): Json<UserRequest>,
    ) -> AppResult<StandardResponse> {
        if request.user.trim().is_empty() || request.password.is_empty() {
            return Ok(StandardResponse::error("Username and password are required"));
        }

        let users = resources.database.users();
        if users.get_user_by_username(&request.user).await?.is_some() {
            return Ok(StandardResponse::error("User already exist"));
        }

        let password_hash = bcrypt::hash(&request.password, bcrypt::DEFAULT_COST)
            .map_err(|e| AppError::internal(format!("Password hashing failed: {e}")))?;

        let user_id = users.create_user(&request.user, &password_hash).await?;
        info!("Registered user {user_id}");

        Ok(StandardResponse::success_message("Register successfully"))
    }

    /// Log in and receive a signed identity token
    async fn login(
        State(resources): State<Arc<ServerResources>>,
        Json(request): Json<UserRequest>,
    ) -> AppResult<StandardResponse> {
        let users = resources.database.users();

        let Some(user) = users.get_user_by_username(&request.user).await? else {
            return Ok(StandardResponse::error(
                "User not exist or password incorrect",
            ));
        };

        let verified = bcrypt::verify(&request.password, &user.password_hash)
            .map_err(|e| AppError::internal(format!("Password verification failed: {e}")))?;
        if !verified {
            return Ok(StandardResponse::error(
                "User not exist or password incorrect",
            ));
        }

        let token = encode_identity_token(&resources.config, user.id, user.is_admin)?;
        users.record_login(user.id).await?;

        Ok(StandardResponse::success(json!({
            "uid": user.id,
            "token": token,
        })))
    }
}
