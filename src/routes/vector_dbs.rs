// ABOUTME: Vector database route handlers: CRUD plus the file and URL ingestion entry points
// ABOUTME: Both entry points validate chunk params up front and converge on the shared pipeline
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::HeaderMap,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::auth::api_key_auth;
use crate::errors::{AppError, AppResult, ErrorCode, StandardResponse};
use crate::models::{EmbeddingConfig, SourceRecordKind, VectorDatabase};
use crate::rag::{
    ingest_documents, load_urls, validate_chunk_params, Document, SourceKind, UrlKind,
};
use crate::resources::ServerResources;

/// Request to create a vector database
#[derive(Debug, Deserialize)]
pub struct CreateVectorDbRequest {
    /// Name, unique per user
    pub vector_db_name: String,
    /// Bound embedding model name
    pub embedding_name: String,
    /// Free-form description
    #[serde(default)]
    pub vector_db_description: String,
}

/// Chunking query parameters on the file upload entry point
#[derive(Debug, Deserialize)]
pub struct ChunkParamsQuery {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks
    pub chunk_overlap: usize,
}

/// Request body for the URL ingestion entry point
#[derive(Debug, Deserialize)]
pub struct UploadUrlsRequest {
    /// URLs to ingest
    pub urls: Vec<String>,
    /// How to load them
    pub url_type: UrlKind,
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks
    pub chunk_overlap: usize,
}

/// Vector database routes handler
pub struct VectorDbRoutes;

impl VectorDbRoutes {
    /// Create the vector database routes
    #[must_use]
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/v1/vector-db", post(Self::create_vector_db))
            .route("/v1/vector-db/vector-dbs", get(Self::list_vector_dbs))
            .route("/v1/vector-db/:vector_db_id", get(Self::get_vector_db))
            .route("/v1/vector-db/:vector_db_id/files", post(Self::upload_files))
            .route("/v1/vector-db/:vector_db_id/urls", post(Self::upload_urls))
            .route("/v1/vector-db/:vector_db_id", delete(Self::delete_vector_db))
            .with_state(resources)
    }

    /// Create a vector database bound to a registered embedding model
    async fn create_vector_db(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<CreateVectorDbRequest>,
    ) -> AppResult<StandardResponse> {
        let auth = api_key_auth(&headers, &resources.database).await?;

        let vector_dbs = resources.database.vector_dbs();
        if vector_dbs
            .name_exists(auth.user_id, &request.vector_db_name)
            .await?
        {
            return Ok(StandardResponse::error(format!(
                "Vector DB `{}` already exists",
                request.vector_db_name
            )));
        }

        let Some(embedding) = resources
            .database
            .registry()
            .get_embedding_by_name(&request.embedding_name)
            .await?
        else {
            return Ok(StandardResponse::error(format!(
                "Embedding `{}` does not exist",
                request.embedding_name
            )));
        };

        let vector_db = vector_dbs
            .create_vector_db(
                auth.user_id,
                &request.vector_db_name,
                embedding.id,
                &request.vector_db_description,
            )
            .await?;

        Ok(StandardResponse::success(json!({
            "vector_db_id": vector_db.id,
        })))
    }

    /// List the caller's vector databases
    async fn list_vector_dbs(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> AppResult<StandardResponse> {
        let auth = api_key_auth(&headers, &resources.database).await?;

        let dbs = resources
            .database
            .vector_dbs()
            .list_vector_dbs(auth.user_id)
            .await?;

        let vector_db_list: Vec<_> = dbs
            .into_iter()
            .map(|db| {
                json!({
                    "vector_db_id": db.id,
                    "vector_db_name": db.name,
                    "create_at": db.created_at,
                    "update_at": db.updated_at,
                })
            })
            .collect();

        Ok(StandardResponse::success(json!({
            "vector_db_list": vector_db_list,
        })))
    }

    /// Vector database detail including its embedding binding
    async fn get_vector_db(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(vector_db_id): Path<Uuid>,
    ) -> AppResult<StandardResponse> {
        let auth = api_key_auth(&headers, &resources.database).await?;

        let Some(db) = resources
            .database
            .vector_dbs()
            .get_vector_db(vector_db_id, auth.user_id)
            .await?
        else {
            return Ok(StandardResponse::error(format!(
                "Vector DB id `{vector_db_id}` does not exist"
            )));
        };

        let embedding_name = resources
            .database
            .registry()
            .get_embedding_by_id(db.embedding_id)
            .await?
            .map(|e| e.name);

        Ok(StandardResponse::success(json!({
            "vector_db_id": db.id,
            "vector_db_name": db.name,
            "create_at": db.created_at,
            "update_at": db.updated_at,
            "vector_db_description": db.description,
            "db_size": db.document_count,
            "embedding_name": embedding_name,
        })))
    }

    /// Ingest uploaded files (multipart)
    ///
    /// Unsupported extensions are collected as `invalid_files`; re-uploads
    /// of byte-identical content under the same name are skipped as
    /// `existed_files`. The response returns immediately with the accepted
    /// chunk count while embedding runs in the background.
    async fn upload_files(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(vector_db_id): Path<Uuid>,
        Query(params): Query<ChunkParamsQuery>,
        mut multipart: Multipart,
    ) -> AppResult<StandardResponse> {
        let auth = api_key_auth(&headers, &resources.database).await?;

        // Overlap is validated before any file processing begins
        if let Err(e) = validate_chunk_params(params.chunk_size, params.chunk_overlap) {
            return Ok(StandardResponse::error(e.message));
        }

        let (vector_db, embedding) =
            match Self::resolve_target(&resources, vector_db_id, auth.user_id).await? {
                Ok(target) => target,
                Err(message) => return Ok(StandardResponse::error(message)),
            };

        let vector_dbs = resources.database.vector_dbs();
        let mut documents = Vec::new();
        let mut accepted_sources: Vec<(String, String)> = Vec::new();
        let mut existed = Vec::new();
        let mut invalid = Vec::new();

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            AppError::invalid_input(format!("Malformed multipart upload: {e}"))
        })? {
            let Some(file_name) = field.file_name().map(ToOwned::to_owned) else {
                continue;
            };

            let Some(kind) = SourceKind::from_file_name(&file_name) else {
                invalid.push(file_name);
                continue;
            };

            let bytes = field.bytes().await.map_err(|e| {
                AppError::invalid_input(format!("Failed to read upload `{file_name}`: {e}"))
            })?;

            let content_hash = hex::encode(Sha256::digest(&bytes));
            if vector_dbs
                .file_source_exists(vector_db_id, &file_name, &content_hash)
                .await?
            {
                existed.push(file_name);
                continue;
            }

            match crate::rag::extract_text(kind, &bytes) {
                Ok(text) => {
                    documents.push(Document {
                        source: file_name.clone(),
                        text,
                        kind,
                    });
                    accepted_sources.push((file_name, content_hash));
                }
                Err(e) => {
                    warn!("Failed to extract `{file_name}`: {e}");
                    invalid.push(file_name);
                }
            }
        }

        if documents.is_empty() {
            return Ok(StandardResponse::error("No file is uploaded"));
        }

        let accepted = ingest_documents(
            &resources.database,
            &resources.http,
            resources.config.data_dir.clone(),
            &vector_db,
            &embedding,
            documents,
            params.chunk_size,
            params.chunk_overlap,
        )
        .await?;

        if accepted == 0 {
            return Ok(StandardResponse::error("No document is loaded"));
        }

        for (name, hash) in &accepted_sources {
            vector_dbs
                .record_source(vector_db_id, SourceRecordKind::File, name, Some(hash))
                .await?;
        }

        Ok(StandardResponse::success(json!({
            "embedding_name": embedding.name,
            "upload_size": accepted,
            "existed_files": existed,
            "invalid_files": invalid,
        })))
    }

    /// Ingest a URL list
    ///
    /// Already-ingested URLs are partitioned out and reported as
    /// `existed_files`; the rest are fetched, extracted and chunked.
    async fn upload_urls(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(vector_db_id): Path<Uuid>,
        Json(request): Json<UploadUrlsRequest>,
    ) -> AppResult<StandardResponse> {
        let auth = api_key_auth(&headers, &resources.database).await?;

        // Overlap is validated before any URL processing begins
        if let Err(e) = validate_chunk_params(request.chunk_size, request.chunk_overlap) {
            return Ok(StandardResponse::error(e.message));
        }

        let (vector_db, embedding) =
            match Self::resolve_target(&resources, vector_db_id, auth.user_id).await? {
                Ok(target) => target,
                Err(message) => return Ok(StandardResponse::error(message)),
            };

        let vector_dbs = resources.database.vector_dbs();
        let already_ingested = vector_dbs.ingested_urls(vector_db_id).await?;

        let mut existed = Vec::new();
        let mut pending = Vec::new();
        for url in request.urls {
            if already_ingested.contains(&url) {
                existed.push(url);
            } else if !pending.contains(&url) {
                pending.push(url);
            }
        }

        let documents = match load_urls(&resources.http, &pending, request.url_type).await {
            Ok(documents) => documents,
            Err(e) if e.code == ErrorCode::InvalidInput => {
                return Ok(StandardResponse::error(e.message));
            }
            Err(e) => return Err(e),
        };

        if documents.is_empty() {
            return Ok(StandardResponse::error("No document is loaded"));
        }

        let accepted = ingest_documents(
            &resources.database,
            &resources.http,
            resources.config.data_dir.clone(),
            &vector_db,
            &embedding,
            documents,
            request.chunk_size,
            request.chunk_overlap,
        )
        .await?;

        if accepted == 0 {
            return Ok(StandardResponse::error("No document is loaded"));
        }

        for url in &pending {
            vector_dbs
                .record_source(vector_db_id, SourceRecordKind::Url, url, None)
                .await?;
        }

        Ok(StandardResponse::success(json!({
            "embedding_name": embedding.name,
            "upload_size": accepted,
            "existed_files": existed,
            "invalid_files": [],
        })))
    }

    /// Soft-delete a vector database
    async fn delete_vector_db(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(vector_db_id): Path<Uuid>,
    ) -> AppResult<StandardResponse> {
        let auth = api_key_auth(&headers, &resources.database).await?;

        let deleted = resources
            .database
            .vector_dbs()
            .delete_vector_db(vector_db_id, auth.user_id)
            .await?;
        if !deleted {
            return Ok(StandardResponse::error(format!(
                "Vector DB id `{vector_db_id}` does not exist"
            )));
        }

        Ok(StandardResponse::success_message(
            "Delete vector_db successfully",
        ))
    }

    /// Resolve the target vector DB and its bound embedding configuration,
    /// or the `code=1` message describing which precondition failed
    async fn resolve_target(
        resources: &Arc<ServerResources>,
        vector_db_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Result<(VectorDatabase, EmbeddingConfig), String>> {
        let Some(vector_db) = resources
            .database
            .vector_dbs()
            .get_vector_db(vector_db_id, user_id)
            .await?
        else {
            return Ok(Err(format!(
                "Vector DB id `{vector_db_id}` does not exist"
            )));
        };

        let Some(embedding) = resources
            .database
            .registry()
            .get_embedding_by_id(vector_db.embedding_id)
            .await?
        else {
            return Ok(Err(format!(
                "Bind embedding id `{}` does not exist",
                vector_db.embedding_id
            )));
        };

        Ok(Ok((vector_db, embedding)))
    }
}
