// ABOUTME: LLM and embedding registry route handlers
// ABOUTME: Admin-gated registration with connectivity probes, cached list/detail reads
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::auth::{api_key_auth, identity_auth};
use crate::cache::keys;
use crate::database::registry::{NewEmbeddingConfig, NewLlmConfig};
use crate::errors::{AppResult, StandardResponse};
use crate::llm::{ChatClient, EmbeddingClient};
use crate::models::{ProviderKind, RequestStyle};
use crate::resources::ServerResources;

/// Request to register an LLM
#[derive(Debug, Deserialize)]
pub struct CreateLlmRequest {
    /// Model name (also the provider-side model id)
    pub llm_name: String,
    /// Provider protocol
    pub llm_type: ProviderKind,
    /// Prompt assembly style
    pub request_type: RequestStyle,
    /// Provider credential
    pub api_key: String,
    /// Provider endpoint
    pub base_url: String,
    /// System speaker label
    #[serde(default = "default_sys_name")]
    pub sys_name: String,
    /// User speaker label
    #[serde(default = "default_user_name")]
    pub user_name: String,
    /// Assistant speaker label
    #[serde(default = "default_ai_name")]
    pub ai_name: String,
    /// System instruction
    #[serde(default = "default_sys_prompt")]
    pub sys_prompt: String,
    /// Completion token budget
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,
}

fn default_sys_name() -> String {
    "system".to_owned()
}

fn default_user_name() -> String {
    "user".to_owned()
}

fn default_ai_name() -> String {
    "assistant".to_owned()
}

fn default_sys_prompt() -> String {
    "A chat between a curious user and an artificial intelligence assistant. \n\
     The assistant gives helpful, detailed, and polite answers to the user's questions."
        .to_owned()
}

const fn default_max_tokens() -> i64 {
    2048
}

/// Request to register an embedding model
#[derive(Debug, Deserialize)]
pub struct CreateEmbeddingRequest {
    /// Model name (also the provider-side model id)
    pub embedding_name: String,
    /// Provider protocol
    pub embedding_type: ProviderKind,
    /// Provider credential
    pub api_key: String,
    /// Provider endpoint
    pub base_url: String,
    /// Maximum accepted chunk size
    #[serde(default = "default_chunk_size")]
    pub chunk_size: i64,
    /// Expected vector dimensionality
    pub embed_dim: i64,
}

const fn default_chunk_size() -> i64 {
    512
}

/// Cached registry list entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryListItem {
    id: Uuid,
    name: String,
}

/// Cached LLM detail view
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LlmDetailView {
    llm_id: Uuid,
    llm_name: String,
    create_at: DateTime<Utc>,
    update_at: DateTime<Utc>,
    max_tokens: i64,
}

/// Cached embedding detail view
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingDetailView {
    embedding_id: Uuid,
    embedding_name: String,
    create_at: DateTime<Utc>,
    update_at: DateTime<Utc>,
    chunk_size: i64,
    embed_dim: i64,
}

/// Model registry routes handler
pub struct RegistryRoutes;

impl RegistryRoutes {
    /// Create the registry routes
    #[must_use]
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/v1/model/llm", post(Self::create_llm))
            .route("/v1/model/llm/llms", get(Self::list_llms))
            .route("/v1/model/llm/:llm_id", get(Self::get_llm))
            .route("/v1/model/llm/:llm_id/delete", delete(Self::delete_llm))
            .route("/v1/model/embedding", post(Self::create_embedding))
            .route("/v1/model/embedding/embeddings", get(Self::list_embeddings))
            .route("/v1/model/embedding/:embedding_id", get(Self::get_embedding))
            .route(
                "/v1/model/embedding/:embedding_id/delete",
                delete(Self::delete_embedding),
            )
            .with_state(resources)
    }

    // ========================================================================
    // LLM handlers
    // ========================================================================

    /// Register an LLM after a successful connectivity probe (admin only)
    async fn create_llm(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<CreateLlmRequest>,
    ) -> AppResult<StandardResponse> {
        let auth = identity_auth(&headers, &resources.config)?;
        if !auth.is_admin {
            return Ok(StandardResponse::error("No permission to create LLM"));
        }

        let registry = resources.database.registry();
        if registry
            .llm_triple_exists(&request.llm_name, &request.api_key, &request.base_url)
            .await?
        {
            return Ok(StandardResponse::error(format!(
                "LLM name: `{}` already exist",
                request.llm_name
            )));
        }

        let new = NewLlmConfig {
            name: request.llm_name,
            provider: request.llm_type,
            request_style: request.request_type,
            base_url: request.base_url,
            api_key: request.api_key,
            system_name: request.sys_name,
            system_prompt: request.sys_prompt,
            user_name: request.user_name,
            assistant_name: request.ai_name,
            max_tokens: request.max_tokens,
            uploader_id: auth.user_id,
        };

        // Probe before persisting: an unreachable model never enters the
        // registry
        let probe_config = crate::models::LlmConfig {
            id: Uuid::new_v4(),
            name: new.name.clone(),
            provider: new.provider,
            request_style: new.request_style,
            base_url: new.base_url.clone(),
            api_key: new.api_key.clone(),
            system_name: new.system_name.clone(),
            system_prompt: new.system_prompt.clone(),
            user_name: new.user_name.clone(),
            assistant_name: new.assistant_name.clone(),
            max_tokens: new.max_tokens,
            uploader_id: new.uploader_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        if let Err(e) = ChatClient::new(&resources.http, &probe_config).ping().await {
            info!("LLM registration probe failed: {e}");
            return Ok(StandardResponse::error(
                "Ping LLM failed. Check your config.",
            ));
        }

        let llm = registry.create_llm(&new).await?;
        resources.cache.invalidate(&keys::llm_list()).await?;
        resources.cache.invalidate(&keys::llm_detail(llm.id)).await?;

        Ok(StandardResponse::success(json!({ "llm_id": llm.id })))
    }

    /// Cached LLM list
    async fn list_llms(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> AppResult<StandardResponse> {
        api_key_auth(&headers, &resources.database).await?;

        let database = resources.database.clone();
        let items = resources
            .cache
            .get_or_load(
                &keys::llm_list(),
                Duration::from_secs(resources.config.cache_ttl_secs),
                Duration::from_secs(resources.config.negative_cache_ttl_secs),
                || async move {
                    let llms = database.registry().list_llms().await?;
                    Ok(Some(
                        llms.into_iter()
                            .map(|(id, name)| RegistryListItem { id, name })
                            .collect::<Vec<_>>(),
                    ))
                },
            )
            .await?
            .unwrap_or_default();

        let llm_list: Vec<_> = items
            .iter()
            .map(|i| json!({ "llm_id": i.id, "llm_name": i.name }))
            .collect();

        Ok(StandardResponse::success(json!({ "llm_list": llm_list })))
    }

    /// Cached LLM detail with a negative marker for missing ids
    async fn get_llm(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(llm_id): Path<Uuid>,
    ) -> AppResult<StandardResponse> {
        api_key_auth(&headers, &resources.database).await?;

        let database = resources.database.clone();
        let detail = resources
            .cache
            .get_or_load(
                &keys::llm_detail(llm_id),
                Duration::from_secs(resources.config.cache_ttl_secs),
                Duration::from_secs(resources.config.negative_cache_ttl_secs),
                || async move {
                    Ok(database.registry().get_llm_by_id(llm_id).await?.map(|llm| {
                        LlmDetailView {
                            llm_id: llm.id,
                            llm_name: llm.name,
                            create_at: llm.created_at,
                            update_at: llm.updated_at,
                            max_tokens: llm.max_tokens,
                        }
                    }))
                },
            )
            .await?;

        match detail {
            Some(detail) => Ok(StandardResponse::success(
                serde_json::to_value(detail).unwrap_or_default(),
            )),
            None => Ok(StandardResponse::error(format!(
                "LLM id: {llm_id} not exist"
            ))),
        }
    }

    /// Soft-delete an LLM (admin only)
    async fn delete_llm(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(llm_id): Path<Uuid>,
    ) -> AppResult<StandardResponse> {
        let auth = identity_auth(&headers, &resources.config)?;
        if !auth.is_admin {
            return Ok(StandardResponse::error("No permission to delete LLM"));
        }

        let deleted = resources.database.registry().delete_llm(llm_id).await?;
        if !deleted {
            return Ok(StandardResponse::error(format!(
                "LLM id: {llm_id} not exist"
            )));
        }

        resources.cache.invalidate(&keys::llm_list()).await?;
        resources.cache.invalidate(&keys::llm_detail(llm_id)).await?;

        Ok(StandardResponse::success_message("Delete LLM successfully"))
    }

    // ========================================================================
    // Embedding handlers
    // ========================================================================

    /// Register an embedding model after a successful probe (admin only)
    async fn create_embedding(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<CreateEmbeddingRequest>,
    ) -> AppResult<StandardResponse> {
        let auth = identity_auth(&headers, &resources.config)?;
        if !auth.is_admin {
            return Ok(StandardResponse::error(
                "No permission to create Embedding model",
            ));
        }

        let registry = resources.database.registry();
        if registry
            .embedding_triple_exists(&request.embedding_name, &request.api_key, &request.base_url)
            .await?
        {
            return Ok(StandardResponse::error(format!(
                "Embedding name: `{}` already exist",
                request.embedding_name
            )));
        }

        let new = NewEmbeddingConfig {
            name: request.embedding_name,
            provider: request.embedding_type,
            base_url: request.base_url,
            api_key: request.api_key,
            chunk_size: request.chunk_size,
            dimensions: request.embed_dim,
            uploader_id: auth.user_id,
        };

        // Probe: embed a trivial string and require the configured
        // dimensionality before anything is persisted
        let probe_config = crate::models::EmbeddingConfig {
            id: Uuid::new_v4(),
            name: new.name.clone(),
            provider: new.provider,
            base_url: new.base_url.clone(),
            api_key: new.api_key.clone(),
            chunk_size: new.chunk_size,
            dimensions: new.dimensions,
            uploader_id: new.uploader_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        if let Err(e) = EmbeddingClient::new(&resources.http, &probe_config).ping().await {
            info!("Embedding registration probe failed: {e}");
            return Ok(StandardResponse::error(
                "Ping Embedding failed. Check your config.",
            ));
        }

        let embedding = registry.create_embedding(&new).await?;
        resources.cache.invalidate(&keys::embedding_list()).await?;
        resources
            .cache
            .invalidate(&keys::embedding_detail(embedding.id))
            .await?;

        Ok(StandardResponse::success_with(
            "Create Embedding successfully",
            json!({ "embedding_id": embedding.id }),
        ))
    }

    /// Cached embedding list
    async fn list_embeddings(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> AppResult<StandardResponse> {
        api_key_auth(&headers, &resources.database).await?;

        let database = resources.database.clone();
        let items = resources
            .cache
            .get_or_load(
                &keys::embedding_list(),
                Duration::from_secs(resources.config.cache_ttl_secs),
                Duration::from_secs(resources.config.negative_cache_ttl_secs),
                || async move {
                    let embeddings = database.registry().list_embeddings().await?;
                    Ok(Some(
                        embeddings
                            .into_iter()
                            .map(|(id, name)| RegistryListItem { id, name })
                            .collect::<Vec<_>>(),
                    ))
                },
            )
            .await?
            .unwrap_or_default();

        let embedding_list: Vec<_> = items
            .iter()
            .map(|i| json!({ "embedding_id": i.id, "embedding_name": i.name }))
            .collect();

        Ok(StandardResponse::success_with(
            "Get Embedding list successfully",
            json!({ "embedding_list": embedding_list }),
        ))
    }

    /// Cached embedding detail with a negative marker for missing ids
    async fn get_embedding(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(embedding_id): Path<Uuid>,
    ) -> AppResult<StandardResponse> {
        api_key_auth(&headers, &resources.database).await?;

        let database = resources.database.clone();
        let detail = resources
            .cache
            .get_or_load(
                &keys::embedding_detail(embedding_id),
                Duration::from_secs(resources.config.cache_ttl_secs),
                Duration::from_secs(resources.config.negative_cache_ttl_secs),
                || async move {
                    Ok(database
                        .registry()
                        .get_embedding_by_id(embedding_id)
                        .await?
                        .map(|e| EmbeddingDetailView {
                            embedding_id: e.id,
                            embedding_name: e.name,
                            create_at: e.created_at,
                            update_at: e.updated_at,
                            chunk_size: e.chunk_size,
                            embed_dim: e.dimensions,
                        }))
                },
            )
            .await?;

        match detail {
            Some(detail) => Ok(StandardResponse::success(
                serde_json::to_value(detail).unwrap_or_default(),
            )),
            None => Ok(StandardResponse::error(format!(
                "Embedding id: {embedding_id} not exist"
            ))),
        }
    }

    /// Soft-delete an embedding configuration (admin only)
    async fn delete_embedding(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(embedding_id): Path<Uuid>,
    ) -> AppResult<StandardResponse> {
        let auth = identity_auth(&headers, &resources.config)?;
        if !auth.is_admin {
            return Ok(StandardResponse::error(
                "No permission to delete Embedding model",
            ));
        }

        let deleted = resources
            .database
            .registry()
            .delete_embedding(embedding_id)
            .await?;
        if !deleted {
            return Ok(StandardResponse::error(format!(
                "Embedding id: {embedding_id} not exist"
            )));
        }

        resources.cache.invalidate(&keys::embedding_list()).await?;
        resources
            .cache
            .invalidate(&keys::embedding_detail(embedding_id))
            .await?;

        Ok(StandardResponse::success_message(
            "Delete Embedding successfully",
        ))
    }
}
