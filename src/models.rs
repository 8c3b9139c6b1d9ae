// ABOUTME: Common data models for users, keys, sessions, model registries and vector DBs
// ABOUTME: Closed enums replace string-tag dispatch for providers, prompt styles and roles
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Closed dispatch enums
// ============================================================================

/// Supported model provider protocols
///
/// Adding a provider means adding a variant and satisfying every exhaustive
/// match - a reviewable, total change rather than an open-ended lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat/embedding HTTP API
    OpenAi,
}

impl ProviderKind {
    /// Stable string form stored in the database
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
        }
    }

    /// Parse the stored string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }
}

/// Prompt assembly style for a registered LLM
///
/// Both styles produce the same semantic ordering: system instruction,
/// replayed history, user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStyle {
    /// Flat text template with named-placeholder substitution
    String,
    /// Native chat-message list
    Message,
}

impl RequestStyle {
    /// Stable string form stored in the database
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Message => "message",
        }
    }

    /// Parse the stored string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "message" => Some(Self::Message),
            _ => None,
        }
    }
}

/// Role of a persisted or prompt-bound chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction (also used for spliced retrieval context)
    System,
    /// End-user turn
    User,
    /// Model completion
    Assistant,
}

impl MessageRole {
    /// Stable string form stored in message payloads
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse the stored string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

// ============================================================================
// Entity records
// ============================================================================

/// A registered user account
#[derive(Debug, Clone)]
pub struct User {
    /// Unique identifier
    pub id: Uuid,
    /// Login name, unique among live users
    pub username: String,
    /// bcrypt hash of the password
    pub password_hash: String,
    /// Elevated privilege flag
    pub is_admin: bool,
    /// Running count of live API keys (kept in step with issuance/revocation)
    pub api_key_count: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last successful login, if any
    pub last_login_at: Option<DateTime<Utc>>,
}

/// An issued API key
#[derive(Debug, Clone)]
pub struct ApiKey {
    /// Unique identifier
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Opaque secret presented as a bearer token
    pub secret: String,
    /// Issuance timestamp
    pub created_at: DateTime<Utc>,
    /// Expiry timestamp; the key is dead once this passes
    pub expires_at: DateTime<Utc>,
}

/// A chat session owned by a user
#[derive(Debug, Clone)]
pub struct ChatSession {
    /// Unique identifier
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Sticky LLM binding, set on the first successful chat turn
    pub llm_id: Option<Uuid>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

/// Serialized role+content payload of one persisted message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Message role
    pub role: MessageRole,
    /// Message text
    pub content: String,
}

/// A persisted chat message (append-only)
#[derive(Debug, Clone)]
pub struct StoredMessage {
    /// Unique identifier
    pub id: Uuid,
    /// Owning session
    pub session_id: Uuid,
    /// Append timestamp
    pub created_at: DateTime<Utc>,
    /// Typed role+content pair
    pub payload: MessagePayload,
}

/// A registered LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Unique identifier
    pub id: Uuid,
    /// Human name, unique together with (`api_key`, `base_url`)
    pub name: String,
    /// Provider protocol
    pub provider: ProviderKind,
    /// Prompt assembly style
    pub request_style: RequestStyle,
    /// Provider endpoint
    pub base_url: String,
    /// Provider credential
    pub api_key: String,
    /// Label for the system speaker in flat-template prompts
    pub system_name: String,
    /// System instruction placed first in every prompt
    pub system_prompt: String,
    /// Label for the user speaker in flat-template prompts
    pub user_name: String,
    /// Label for the assistant speaker in flat-template prompts
    pub assistant_name: String,
    /// Completion token budget
    pub max_tokens: i64,
    /// Registering admin
    pub uploader_id: Uuid,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

/// A registered embedding configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Unique identifier
    pub id: Uuid,
    /// Human name, unique together with (`api_key`, `base_url`)
    pub name: String,
    /// Provider protocol
    pub provider: ProviderKind,
    /// Provider endpoint
    pub base_url: String,
    /// Provider credential
    pub api_key: String,
    /// Maximum chunk size this embedding accepts
    pub chunk_size: i64,
    /// Expected vector dimensionality, verified by the registration probe
    pub dimensions: i64,
    /// Registering admin
    pub uploader_id: Uuid,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

/// A per-user named vector database
#[derive(Debug, Clone)]
pub struct VectorDatabase {
    /// Unique identifier
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Name, unique per live user rows
    pub name: String,
    /// Bound embedding configuration
    pub embedding_id: Uuid,
    /// Free-form description
    pub description: String,
    /// Running count of documents accepted for ingestion
    ///
    /// Incremented as soon as chunking succeeds, independent of whether the
    /// background embedding step later fails - the count reflects *accepted
    /// for ingestion*, not *successfully indexed*.
    pub document_count: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

/// Kind of an ingested source recorded for dedup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRecordKind {
    /// Uploaded file (dedup by name + content hash)
    File,
    /// Submitted URL (dedup by exact URL)
    Url,
}

impl SourceRecordKind {
    /// Stable string form stored in the database
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Url => "url",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_round_trip() {
        assert_eq!(ProviderKind::parse("openai"), Some(ProviderKind::OpenAi));
        assert_eq!(ProviderKind::OpenAi.as_str(), "openai");
        assert_eq!(ProviderKind::parse("llamacpp"), None);
    }

    #[test]
    fn test_request_style_round_trip() {
        for style in [RequestStyle::String, RequestStyle::Message] {
            assert_eq!(RequestStyle::parse(style.as_str()), Some(style));
        }
    }

    #[test]
    fn test_message_role_round_trip() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant] {
            assert_eq!(MessageRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(MessageRole::parse("tool"), None);
    }

    #[test]
    fn test_message_payload_serde() {
        let payload = MessagePayload {
            role: MessageRole::Assistant,
            content: "hello".to_owned(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains(r#""role":"assistant""#));
        let back: MessagePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, MessageRole::Assistant);
        assert_eq!(back.content, "hello");
    }
}
