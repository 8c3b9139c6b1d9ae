// ABOUTME: Chat turn preparation (preconditions) and the SSE streaming generator
// ABOUTME: Sticky LLM binding, optional retrieval splice, persist-then-unlock discipline
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::convert::Infallible;
use std::sync::Arc;

use axum::response::sse::Event;
use futures_util::stream::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, error};
use uuid::Uuid;

use super::{SseFrame, TurnLock};
use crate::cache::keys;
use crate::errors::AppResult;
use crate::llm::{build_prompt, prompt::format_context, ChatClient, EmbeddingClient, PromptInput};
use crate::models::{ChatSession, EmbeddingConfig, LlmConfig, MessageRole, StoredMessage};
use crate::rag::VectorIndex;
use crate::resources::ServerResources;

/// Retrieved chunks spliced into a retrieval-augmented turn
const RETRIEVER_TOP_K: usize = 4;

/// Body of `POST /v1/session/{id}/chat`
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    /// Requested model name; overridden by the session's bound model
    pub llm_name: String,
    /// Sampling temperature
    pub temperature: f64,
    /// The new user message
    pub message: String,
    /// Optional vector database for retrieval-augmented generation
    #[serde(default)]
    pub vector_db_id: Option<Uuid>,
}

/// Everything resolved before streaming begins
pub struct TurnContext {
    /// The session being chatted in
    pub session: ChatSession,
    /// Resolved (and now bound) LLM configuration
    pub llm: LlmConfig,
    /// Replayed conversation history
    pub history: Vec<StoredMessage>,
    /// Retrieval pieces when the request referenced a vector database
    pub retrieval: Option<RetrievalContext>,
}

/// Resolved retrieval collaborators
pub struct RetrievalContext {
    /// Target vector database id
    pub vector_db_id: Uuid,
    /// Its bound embedding configuration
    pub embedding: EmbeddingConfig,
}

/// Outcome of turn preparation
pub enum TurnSetup {
    /// All preconditions met
    Ready(Box<TurnContext>),
    /// A precondition failed; the message goes out as a `code=1` envelope
    Rejected(String),
}

/// Resolve every precondition of a chat turn
///
/// Assumes the caller already holds the turn lock. Rejections are
/// configuration errors the client must fix (missing session, missing
/// model, empty vector DB) - the caller releases the lock and reports them
/// as structured envelopes, never as exceptions.
///
/// # Errors
///
/// Returns an error for infrastructure faults (database unavailable); the
/// caller converts those into a generic "Chat init failed" envelope.
pub async fn prepare_turn(
    resources: &Arc<ServerResources>,
    user_id: Uuid,
    session_id: Uuid,
    request: &TurnRequest,
) -> AppResult<TurnSetup> {
    let sessions = resources.database.sessions();
    let registry = resources.database.registry();

    let Some(session) = sessions.get_session(session_id, user_id).await? else {
        return Ok(TurnSetup::Rejected("Session not exist".to_owned()));
    };

    // The bound model is authoritative: once a session's first turn selects
    // an LLM, later turns ignore the client-supplied name
    let llm = if let Some(bound_id) = session.llm_id {
        debug!("Use bound LLM {bound_id} for session {session_id}");
        registry.get_llm_by_id(bound_id).await?
    } else {
        registry.get_llm_by_name(&request.llm_name).await?
    };
    let Some(llm) = llm else {
        return Ok(TurnSetup::Rejected("LLM not exist".to_owned()));
    };

    if session.llm_id.is_none() {
        sessions.bind_llm(session_id, llm.id).await?;
        debug!("Bind LLM {} to session {session_id}", llm.name);
    }

    let retrieval = match request.vector_db_id {
        None => None,
        Some(vector_db_id) => {
            let Some(vector_db) = resources
                .database
                .vector_dbs()
                .get_vector_db(vector_db_id, user_id)
                .await?
            else {
                return Ok(TurnSetup::Rejected("Vector DB not exist".to_owned()));
            };

            // Querying an empty index is rejected, not silently answered
            // with no context
            if vector_db.document_count == 0 {
                return Ok(TurnSetup::Rejected(
                    "Vector DB is empty, please upload data first".to_owned(),
                ));
            }

            let Some(embedding) = registry.get_embedding_by_id(vector_db.embedding_id).await? else {
                return Ok(TurnSetup::Rejected("Embedding not exist".to_owned()));
            };

            Some(RetrievalContext {
                vector_db_id,
                embedding,
            })
        }
    };

    let history = sessions.list_messages(session_id).await?;

    Ok(TurnSetup::Ready(Box::new(TurnContext {
        session,
        llm,
        history,
        retrieval,
    })))
}

/// Run the streaming half of a turn
///
/// Emits `chain:start`, `llm:start`, one `llm:new_token` per delta in
/// arrival order, `llm:end` and a terminal `chain:end`; any fault inside
/// the generator becomes a terminal `error` frame rather than a broken
/// connection. The lock is released on every path - the TTL only covers a
/// crash that never reaches one.
///
/// Persistence order is user-message-then-assistant-message, appended only
/// after the full response is assembled; retrieval turns additionally
/// persist the source-document context as a system message first.
pub fn run_turn_stream(
    resources: Arc<ServerResources>,
    mut lock: TurnLock,
    context: TurnContext,
    request: TurnRequest,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        yield Ok(SseFrame::chain_start().into_event());

        // Retrieval runs inside the stream: embedding the query is a
        // provider call and belongs behind the same error discipline
        let mut context_block = None;
        let mut source_documents = Vec::new();
        if let Some(retrieval) = &context.retrieval {
            match retrieve_context(&resources, retrieval, &request.message).await {
                Ok(documents) => {
                    context_block = Some(format_context(&documents));
                    source_documents = documents;
                }
                Err(e) => {
                    error!("Retrieval failed for turn on session {}: {e}", context.session.id);
                    yield Ok(SseFrame::error("Retrieval failed").into_event());
                    lock.release().await;
                    return;
                }
            }
        }

        let messages = build_prompt(&PromptInput {
            config: &context.llm,
            history: &context.history,
            context: context_block.as_deref(),
            user_prompt: &request.message,
        });

        yield Ok(SseFrame::llm_start().into_event());

        let client = ChatClient::new(&resources.http, &context.llm);
        let mut deltas = match client.stream_chat(messages, request.temperature).await {
            Ok(deltas) => deltas,
            Err(e) => {
                error!("Chat provider call failed on session {}: {e}", context.session.id);
                yield Ok(SseFrame::error("Chat provider call failed").into_event());
                lock.release().await;
                return;
            }
        };

        let mut completion = String::new();
        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => {
                    completion.push_str(&delta);
                    yield Ok(SseFrame::token(delta).into_event());
                }
                Err(e) => {
                    error!("Stream fault on session {}: {e}", context.session.id);
                    yield Ok(SseFrame::error("Stream interrupted").into_event());
                    lock.release().await;
                    return;
                }
            }
        }

        yield Ok(SseFrame::llm_end().into_event());

        if let Err(e) = persist_turn(&resources, &context, &request.message, &completion, context_block.as_deref()).await {
            error!("Failed to persist turn on session {}: {e}", context.session.id);
            yield Ok(SseFrame::error("Failed to persist turn").into_event());
            lock.release().await;
            return;
        }

        invalidate_session_caches(&resources, &context).await;

        let outputs = serde_json::json!({
            "result": completion,
            "source_documents": source_documents,
        });
        yield Ok(SseFrame::chain_end(outputs).into_event());

        lock.release().await;
    }
}

/// Embed the question and pull the top-k chunks from the index
async fn retrieve_context(
    resources: &Arc<ServerResources>,
    retrieval: &RetrievalContext,
    question: &str,
) -> AppResult<Vec<String>> {
    let client = EmbeddingClient::new(&resources.http, &retrieval.embedding);
    let query_embedding = client.embed_query(question).await?;

    let index = VectorIndex::open_or_create(&resources.config.data_dir, retrieval.vector_db_id)?;
    let hits = index.search(&query_embedding, RETRIEVER_TOP_K);

    Ok(hits.into_iter().map(|h| h.content).collect())
}

/// Append the turn's messages in their guaranteed order
async fn persist_turn(
    resources: &Arc<ServerResources>,
    context: &TurnContext,
    user_message: &str,
    completion: &str,
    context_block: Option<&str>,
) -> AppResult<()> {
    let sessions = resources.database.sessions();
    let session_id = context.session.id;

    if let Some(block) = context_block {
        sessions
            .append_message(session_id, MessageRole::System, block)
            .await?;
    }
    sessions
        .append_message(session_id, MessageRole::User, user_message)
        .await?;
    sessions
        .append_message(session_id, MessageRole::Assistant, completion)
        .await?;
    Ok(())
}

/// Drop the cached session detail and list so subsequent reads are fresh
async fn invalidate_session_caches(resources: &Arc<ServerResources>, context: &TurnContext) {
    let cache = &resources.cache;
    if let Err(e) = cache.invalidate(&keys::session_detail(context.session.id)).await {
        tracing::warn!("Failed to invalidate session detail cache: {e}");
    }
    if let Err(e) = cache
        .invalidate(&keys::session_list(context.session.user_id))
        .await
    {
        tracing::warn!("Failed to invalidate session list cache: {e}");
    }
}
