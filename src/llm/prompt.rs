// ABOUTME: Prompt assembly for both request styles with replayed history
// ABOUTME: Flat template and message-list variants keep identical ordering semantics
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::fmt::Write;

use super::ChatMessage;
use crate::models::{LlmConfig, MessageRole, RequestStyle, StoredMessage};

/// Replayed history window: the last 8 exchanges (user + assistant pairs)
const MEMORY_WINDOW_MESSAGES: usize = 16;

/// Everything a prompt is assembled from
#[derive(Debug)]
pub struct PromptInput<'a> {
    /// Bound LLM configuration (system prompt, speaker labels, style)
    pub config: &'a LlmConfig,
    /// Persisted conversation history, chronological
    pub history: &'a [StoredMessage],
    /// Retrieved context block, present on retrieval-augmented turns
    pub context: Option<&'a str>,
    /// The new user turn
    pub user_prompt: &'a str,
}

/// Assemble the outgoing message list for a chat turn
///
/// Both styles produce semantically equivalent ordering: system
/// instruction first, replayed history, then the user turn, with the
/// retrieved context (when present) spliced in before the question.
#[must_use]
pub fn build_prompt(input: &PromptInput<'_>) -> Vec<ChatMessage> {
    match input.config.request_style {
        RequestStyle::Message => build_message_prompt(input),
        RequestStyle::String => vec![ChatMessage::user(build_string_prompt(input))],
    }
}

/// Render retrieved source chunks as a fenced context block
#[must_use]
pub fn format_context(documents: &[String]) -> String {
    format!("```\n{}\n```", documents.join("\n```\n---\n```\n"))
}

/// Native chat-message list: system, history, (context), user
fn build_message_prompt(input: &PromptInput<'_>) -> Vec<ChatMessage> {
    let history = windowed(input.history);
    let mut messages = Vec::with_capacity(history.len() + 3);

    messages.push(ChatMessage::system(input.config.system_prompt.clone()));

    for stored in history {
        messages.push(ChatMessage {
            role: stored.payload.role,
            content: stored.payload.content.clone(),
        });
    }

    if let Some(context) = input.context {
        messages.push(ChatMessage::system(context.to_owned()));
    }

    messages.push(ChatMessage::user(input.user_prompt.to_owned()));
    messages
}

/// Flat text template with named speaker labels:
///
/// ```text
/// {sys_name}:{sys_prompt}
/// {history}
/// {user_name}:{user_prompt}
/// {ai_name}:
/// ```
fn build_string_prompt(input: &PromptInput<'_>) -> String {
    let config = input.config;
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "{}:{}",
        config.system_name,
        config.system_prompt.trim_end()
    );

    for stored in windowed(input.history) {
        let speaker = speaker_label(config, stored.payload.role);
        let _ = writeln!(prompt, "{speaker}:{}", stored.payload.content);
    }

    if let Some(context) = input.context {
        let _ = writeln!(prompt, "{}:{context}", config.system_name);
    }

    let _ = writeln!(prompt, "{}:{}", config.user_name, input.user_prompt);
    let _ = write!(prompt, "{}:", config.assistant_name);

    prompt
}

/// Trim the replay to the configured window, keeping the most recent turns
fn windowed(history: &[StoredMessage]) -> &[StoredMessage] {
    let start = history.len().saturating_sub(MEMORY_WINDOW_MESSAGES);
    &history[start..]
}

/// Speaker label for a role under the flat style
fn speaker_label(config: &LlmConfig, role: MessageRole) -> &str {
    match role {
        MessageRole::System => &config.system_name,
        MessageRole::User => &config.user_name,
        MessageRole::Assistant => &config.assistant_name,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::models::{MessagePayload, ProviderKind};
    use chrono::Utc;
    use uuid::Uuid;

    fn test_config(style: RequestStyle) -> LlmConfig {
        LlmConfig {
            id: Uuid::new_v4(),
            name: "test-model".to_owned(),
            provider: ProviderKind::OpenAi,
            request_style: style,
            base_url: "http://localhost".to_owned(),
            api_key: String::new(),
            system_name: "system".to_owned(),
            system_prompt: "Be helpful.\n".to_owned(),
            user_name: "user".to_owned(),
            assistant_name: "assistant".to_owned(),
            max_tokens: 256,
            uploader_id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn stored(role: MessageRole, content: &str) -> StoredMessage {
        StoredMessage {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
            payload: MessagePayload {
                role,
                content: content.to_owned(),
            },
        }
    }

    #[test]
    fn test_message_style_ordering() {
        let config = test_config(RequestStyle::Message);
        let history = vec![
            stored(MessageRole::User, "hi"),
            stored(MessageRole::Assistant, "hello"),
        ];
        let messages = build_prompt(&PromptInput {
            config: &config,
            history: &history,
            context: None,
            user_prompt: "how are you?",
        });

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].content, "hi");
        assert_eq!(messages[2].content, "hello");
        assert_eq!(messages[3].role, MessageRole::User);
        assert_eq!(messages[3].content, "how are you?");
    }

    #[test]
    fn test_message_style_context_before_question() {
        let config = test_config(RequestStyle::Message);
        let messages = build_prompt(&PromptInput {
            config: &config,
            history: &[],
            context: Some("some retrieved facts"),
            user_prompt: "question",
        });

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, MessageRole::System);
        assert_eq!(messages[1].content, "some retrieved facts");
        assert_eq!(messages[2].content, "question");
    }

    #[test]
    fn test_string_style_layout() {
        let config = test_config(RequestStyle::String);
        let history = vec![stored(MessageRole::User, "hi")];
        let messages = build_prompt(&PromptInput {
            config: &config,
            history: &history,
            context: None,
            user_prompt: "next",
        });

        assert_eq!(messages.len(), 1);
        let flat = &messages[0].content;
        assert!(flat.starts_with("system:Be helpful."));
        assert!(flat.contains("user:hi\n"));
        assert!(flat.contains("user:next\n"));
        assert!(flat.ends_with("assistant:"));

        // Ordering: system instruction, history, user turn
        let sys_pos = flat.find("system:Be helpful.").unwrap();
        let hist_pos = flat.find("user:hi").unwrap();
        let turn_pos = flat.find("user:next").unwrap();
        assert!(sys_pos < hist_pos && hist_pos < turn_pos);
    }

    #[test]
    fn test_history_window_keeps_most_recent() {
        let config = test_config(RequestStyle::Message);
        let history: Vec<StoredMessage> = (0..40)
            .map(|i| stored(MessageRole::User, &format!("msg-{i}")))
            .collect();
        let messages = build_prompt(&PromptInput {
            config: &config,
            history: &history,
            context: None,
            user_prompt: "now",
        });

        // system + window + user turn
        assert_eq!(messages.len(), 1 + MEMORY_WINDOW_MESSAGES + 1);
        assert_eq!(messages[1].content, "msg-24");
    }

    #[test]
    fn test_format_context_fencing() {
        let docs = vec!["alpha".to_owned(), "beta".to_owned()];
        let block = format_context(&docs);
        assert!(block.starts_with("```\n"));
        assert!(block.contains("\n```\n---\n```\n"));
        assert!(block.ends_with("\n```"));
    }
}
