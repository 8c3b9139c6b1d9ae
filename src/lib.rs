// ABOUTME: Main library entry point for the Tessera chat platform
// ABOUTME: Provides user accounts, API keys, chat sessions, model registries and a RAG pipeline
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

#![deny(unsafe_code)]

//! # Tessera Chat Server
//!
//! A backend service for multi-user LLM chat with retrieval-augmented
//! generation. It exposes user accounts, API-key issuance, chat sessions,
//! LLM/embedding model registries and per-user vector databases over HTTP.
//!
//! ## Features
//!
//! - **Streaming chat**: Server-Sent-Events token streams with a per-user
//!   turn lock, sticky per-session model binding and replayed history
//! - **RAG pipeline**: file/URL ingestion, chunking, embedding and a local
//!   cosine-similarity vector index feeding retrieval-augmented turns
//! - **Model registries**: validated LLM and embedding provider
//!   configurations with connectivity probes
//! - **Two auth schemes**: opaque API-key secrets and signed identity tokens
//!
//! ## Quick Start
//!
//! 1. Export `TESSERA_JWT_SECRET` and (optionally) `DATABASE_URL`/`REDIS_URL`
//! 2. Start the server with `tessera-server`
//! 3. Register a user, log in, issue an API key and open a session

/// Authentication guards and identity tokens
pub mod auth;

/// Cache abstraction layer with pluggable backends
pub mod cache;

/// Chat turn orchestration and SSE frame types
pub mod chat;

/// Configuration management from environment variables
pub mod config;

/// Database managers for users, keys, sessions, registries and vector DBs
pub mod database;

/// Unified error handling with standard error codes and HTTP responses
pub mod errors;

/// LLM provider abstraction: chat completion, embeddings and prompts
pub mod llm;

/// Common data models shared across layers
pub mod models;

/// Vector database ingestion pipeline and local vector index
pub mod rag;

/// Explicitly constructed dependency bundle shared by all routes
pub mod resources;

/// `HTTP` routes for every exposed domain
pub mod routes;
