// ABOUTME: LLM provider abstraction: chat completion, embeddings and prompt assembly
// ABOUTME: Closed ProviderKind dispatch - no string-tag lookup tables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

/// Streaming and one-shot chat completion client
pub mod chat;
/// Embedding client with batching
pub mod embedding;
/// Prompt assembly for both request styles
pub mod prompt;

pub use chat::ChatClient;
pub use embedding::EmbeddingClient;
pub use prompt::{build_prompt, PromptInput};

use serde::{Deserialize, Serialize};

use crate::models::MessageRole;

/// One prompt-bound chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker role
    pub role: MessageRole,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// System message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}
