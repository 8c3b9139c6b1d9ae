// ABOUTME: Vector database ingestion pipeline and local vector index
// ABOUTME: Extraction, chunk splitting, embedding and cosine-similarity retrieval
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

/// Text extraction per source kind
pub mod extract;
/// Per-vector-db persisted cosine index
pub mod index;
/// Ingestion flow: dedup, chunk, count, background embed
pub mod ingest;
/// Overlapping chunk splitter with language-aware separators
pub mod splitter;
/// URL loaders for the URL ingestion entry point
pub mod urls;

pub use extract::{extract_text, SourceKind, UrlKind};
pub use index::VectorIndex;
pub use ingest::{ingest_documents, validate_chunk_params};
pub use splitter::split_text;
pub use urls::load_urls;

/// One extracted document headed into the splitter
#[derive(Debug, Clone)]
pub struct Document {
    /// Originating file name or URL
    pub source: String,
    /// Extracted plain text
    pub text: String,
    /// Source kind, drives splitter separator choice
    pub kind: SourceKind,
}
