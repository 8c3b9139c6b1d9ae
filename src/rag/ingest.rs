// ABOUTME: Ingestion flow shared by the file and URL entry points
// ABOUTME: Validates chunk params, splits documents, bumps the count, offloads embedding
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::path::PathBuf;

use tracing::{debug, error};
use uuid::Uuid;

use super::splitter::split_text;
use super::{Document, VectorIndex};
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::llm::EmbeddingClient;
use crate::models::{EmbeddingConfig, VectorDatabase};

/// Validate chunk parameters before any file/URL processing begins
///
/// # Errors
///
/// Returns `invalid_input` when `chunk_size` is zero or `chunk_overlap`
/// exceeds half of `chunk_size`
pub fn validate_chunk_params(chunk_size: usize, chunk_overlap: usize) -> AppResult<()> {
    if chunk_size == 0 {
        return Err(AppError::invalid_input("chunk_size must be positive"));
    }
    if chunk_overlap > chunk_size / 2 {
        return Err(AppError::invalid_input(
            "chunk_overlap must not exceed half of chunk_size",
        ));
    }
    Ok(())
}

/// Split documents, bump the document count and schedule the embedding task
///
/// The count is incremented synchronously as soon as chunking succeeds; the
/// embedding + index-upsert work runs as a detached background task that
/// outlives the request. Background failures are logged, not retried, and
/// the count is not rolled back - it reflects *accepted for ingestion*.
///
/// Returns the number of chunks accepted.
///
/// # Errors
///
/// Returns an error if the synchronous count update fails
pub async fn ingest_documents(
    database: &Database,
    http: &reqwest::Client,
    data_dir: PathBuf,
    vector_db: &VectorDatabase,
    embedding: &EmbeddingConfig,
    documents: Vec<Document>,
    chunk_size: usize,
    chunk_overlap: usize,
) -> AppResult<usize> {
    // The embedding configuration caps the chunk size it can encode
    let effective_size = chunk_size.min(usize::try_from(embedding.chunk_size).unwrap_or(chunk_size));

    let mut batches: Vec<(String, Vec<String>)> = Vec::with_capacity(documents.len());
    let mut total = 0usize;
    for doc in documents {
        let chunks = split_text(&doc.text, doc.kind, effective_size, chunk_overlap);
        if chunks.is_empty() {
            continue;
        }
        total += chunks.len();
        batches.push((doc.source, chunks));
    }

    if total == 0 {
        return Ok(0);
    }

    database
        .vector_dbs()
        .increment_document_count(vector_db.id, vector_db.user_id, total as i64)
        .await?;

    spawn_embedding_task(http.clone(), data_dir, vector_db.id, embedding.clone(), batches);

    Ok(total)
}

/// Fire-and-forget embedding + index upsert
fn spawn_embedding_task(
    http: reqwest::Client,
    data_dir: PathBuf,
    vector_db_id: Uuid,
    embedding: EmbeddingConfig,
    batches: Vec<(String, Vec<String>)>,
) {
    tokio::spawn(async move {
        let total: usize = batches.iter().map(|(_, c)| c.len()).sum();
        debug!("Start embedding task: {total} chunks for vector DB {vector_db_id}");

        let index = match VectorIndex::open_or_create(&data_dir, vector_db_id) {
            Ok(index) => index,
            Err(e) => {
                error!("Embedding task failed to open index for {vector_db_id}: {e}");
                return;
            }
        };

        let client = EmbeddingClient::new(&http, &embedding);
        for (source, chunks) in batches {
            match client.embed_batch(&chunks).await {
                Ok(vectors) => {
                    if let Err(e) = index.add_chunks(&source, &chunks, vectors) {
                        error!("Embedding task failed to upsert {source} into {vector_db_id}: {e}");
                    }
                }
                Err(e) => {
                    error!("Embedding task failed for {source} in {vector_db_id}: {e}");
                }
            }
        }

        debug!("Finish embedding task: {total} chunks for vector DB {vector_db_id}");
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_at_half_is_accepted() {
        assert!(validate_chunk_params(100, 50).is_ok());
    }

    #[test]
    fn test_overlap_over_half_is_rejected() {
        assert!(validate_chunk_params(100, 51).is_err());
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        assert!(validate_chunk_params(0, 0).is_err());
    }

    #[test]
    fn test_zero_overlap_is_accepted() {
        assert!(validate_chunk_params(16, 0).is_ok());
    }
}
