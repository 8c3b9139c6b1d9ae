// ABOUTME: Per-vector-db embedding store persisted as JSON with cosine top-k search
// ABOUTME: The retrieval capability behind retrieval-augmented chat turns
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

/// A stored chunk with its embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    source: String,
    content: String,
    embedding: Vec<f32>,
}

/// A retrieval hit
#[derive(Debug, Clone)]
pub struct IndexHit {
    /// Originating file name or URL
    pub source: String,
    /// Chunk text
    pub content: String,
    /// Cosine similarity against the query
    pub score: f32,
}

/// In-memory vector index with disk persistence
///
/// One index file per vector database, keyed by its id under the data root.
/// Entries live behind an `RwLock`; writes persist the whole file, which is
/// acceptable for the CLI-scale uploads this service handles.
pub struct VectorIndex {
    entries: RwLock<Vec<IndexEntry>>,
    persist_path: PathBuf,
}

impl VectorIndex {
    /// Open the index for a vector database, creating its directory on
    /// first use
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// index file cannot be read
    pub fn open_or_create(data_root: &Path, vector_db_id: Uuid) -> AppResult<Self> {
        let dir = data_root.join(vector_db_id.to_string());
        std::fs::create_dir_all(&dir)
            .map_err(|e| AppError::internal(format!("Failed to create index dir: {e}")))?;
        let persist_path = dir.join("index.json");

        let entries = if persist_path.exists() {
            let data = std::fs::read_to_string(&persist_path)
                .map_err(|e| AppError::internal(format!("Failed to read vector index: {e}")))?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(Self {
            entries: RwLock::new(entries),
            persist_path,
        })
    }

    /// Append chunk embeddings and persist
    ///
    /// `embeddings` must be parallel with `chunks`; extra chunks without a
    /// vector are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails
    pub fn add_chunks(
        &self,
        source: &str,
        chunks: &[String],
        embeddings: Vec<Vec<f32>>,
    ) -> AppResult<()> {
        let mut entries = self.entries.write();

        for (i, chunk) in chunks.iter().enumerate() {
            if let Some(embedding) = embeddings.get(i) {
                entries.push(IndexEntry {
                    source: source.to_owned(),
                    content: chunk.clone(),
                    embedding: embedding.clone(),
                });
            }
        }

        let data = serde_json::to_string(&*entries)
            .map_err(|e| AppError::internal(format!("Failed to serialize vector index: {e}")))?;
        drop(entries);
        std::fs::write(&self.persist_path, data)
            .map_err(|e| AppError::internal(format!("Failed to persist vector index: {e}")))
    }

    /// Top-k search by cosine similarity
    #[must_use]
    pub fn search(&self, query_embedding: &[f32], limit: usize) -> Vec<IndexHit> {
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &IndexEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, e)| IndexHit {
                source: e.source.clone(),
                content: e.content.clone(),
                score,
            })
            .collect()
    }

    /// Number of stored entries
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
