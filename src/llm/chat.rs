// ABOUTME: Chat completion client for OpenAI-compatible providers
// ABOUTME: Streams content deltas line-by-line and offers a one-shot completion for pings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use std::pin::Pin;
use std::time::Duration;

use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::ChatMessage;
use crate::errors::{AppError, AppResult};
use crate::models::{LlmConfig, ProviderKind};

/// Stream of content delta strings (one per token/chunk)
pub type DeltaStream = Pin<Box<dyn Stream<Item = AppResult<String>> + Send>>;

/// Upstream request timeout for chat completions
const CHAT_TIMEOUT: Duration = Duration::from_secs(300);

/// Prompt sent by the registry connectivity probe
const PING_PROMPT: &str = "Ping! Please reply with 'Pong!'";

/// Chat completion client bound to one registered LLM configuration
pub struct ChatClient<'a> {
    http: &'a reqwest::Client,
    config: &'a LlmConfig,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    temperature: f64,
    max_tokens: i64,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: WireMessage,
}

impl<'a> ChatClient<'a> {
    /// Bind a client to a configuration
    #[must_use]
    pub const fn new(http: &'a reqwest::Client, config: &'a LlmConfig) -> Self {
        Self { http, config }
    }

    /// Open a streaming completion and return a stream of content deltas
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unreachable or answers with a
    /// non-success status
    pub async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f64,
    ) -> AppResult<DeltaStream> {
        match self.config.provider {
            ProviderKind::OpenAi => self.stream_openai(messages, temperature).await,
        }
    }

    /// One-shot, non-streaming completion (used by the registry probe)
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails or the response carries
    /// no content
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f64,
    ) -> AppResult<String> {
        match self.config.provider {
            ProviderKind::OpenAi => self.complete_openai(messages, temperature).await,
        }
    }

    /// Connectivity probe: send a trivial prompt and check a reply arrives
    ///
    /// # Errors
    ///
    /// Returns an error describing the failed probe
    pub async fn ping(&self) -> AppResult<()> {
        let reply = self
            .complete(vec![ChatMessage::user(PING_PROMPT)], 0.0)
            .await?;
        tracing::debug!("Ping LLM reply: {}", &reply[..reply.len().min(80)]);
        Ok(())
    }

    async fn stream_openai(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f64,
    ) -> AppResult<DeltaStream> {
        let resp = self
            .send_request(messages, temperature, true)
            .await?;

        let stream = stream_lines(resp.bytes_stream()).filter_map(|line_result| async move {
            match line_result {
                Ok(line) => parse_stream_line(&line),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(stream))
    }

    async fn complete_openai(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f64,
    ) -> AppResult<String> {
        let resp = self
            .send_request(messages, temperature, false)
            .await?;

        let body: CompletionResponse = resp.json().await.map_err(|e| {
            AppError::external_service(format!("Failed to parse completion response: {e}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::external_service("Completion response carried no choices"))
    }

    async fn send_request(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f64,
        stream: bool,
    ) -> AppResult<reqwest::Response> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let req = CompletionRequest {
            model: &self.config.name,
            messages: messages
                .into_iter()
                .map(|m| WireMessage {
                    role: m.role.as_str().to_owned(),
                    content: m.content,
                })
                .collect(),
            stream,
            temperature,
            max_tokens: self.config.max_tokens,
        };

        let resp = self
            .http
            .post(&url)
            .timeout(CHAT_TIMEOUT)
            .bearer_auth(&self.config.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                AppError::external_service(format!("Failed to reach chat provider: {e}"))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::external_service(format!(
                "Chat provider returned {status}: {body}"
            )));
        }

        Ok(resp)
    }
}

/// Parse a single SSE line from the completion stream. Returns:
/// - `Some(Ok(content))` for content deltas
/// - `Some(Err(e))` for parse errors
/// - `None` to skip (empty lines, `[DONE]`, role-only chunks)
fn parse_stream_line(line: &str) -> Option<AppResult<String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let data = line.strip_prefix("data: ")?.trim();

    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .first()
                .and_then(|c| c.delta.content.clone())
                .unwrap_or_default();
            if content.is_empty() {
                return None;
            }
            Some(Ok(content))
        }
        Err(e) => Some(Err(AppError::external_service(format!(
            "Failed to parse stream chunk: {e}"
        )))),
    }
}

/// Convert a byte stream into a stream of complete lines
fn stream_lines(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = AppResult<String>> + Send {
    futures_util::stream::unfold(
        (Box::pin(byte_stream), String::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                // Try to extract a complete line from the buffer first
                if let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].to_string();
                    buffer = buffer[newline_pos + 1..].to_string();
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer)));
                    }
                    continue;
                }

                // No complete line buffered - read more bytes
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(AppError::external_service(format!("Stream read error: {e}"))),
                            (stream, buffer),
                        ));
                    }
                    None => {
                        // Stream ended - emit remaining buffer if non-empty
                        if !buffer.trim().is_empty() {
                            let remaining = std::mem::take(&mut buffer);
                            return Some((Ok(remaining), (stream, buffer)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        let result = parse_stream_line(line);
        assert_eq!(result.unwrap().unwrap(), "Hello");
    }

    #[test]
    fn test_parse_done() {
        assert!(parse_stream_line("data: [DONE]").is_none());
    }

    #[test]
    fn test_parse_empty_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":null}}]}"#;
        assert!(parse_stream_line(line).is_none());
    }

    #[test]
    fn test_parse_role_only_chunk() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(parse_stream_line(line).is_none());
    }

    #[test]
    fn test_parse_malformed() {
        let result = parse_stream_line("data: {broken json");
        assert!(result.unwrap().is_err());
    }

    #[test]
    fn test_parse_empty_and_non_data_lines() {
        assert!(parse_stream_line("").is_none());
        assert!(parse_stream_line("   ").is_none());
        assert!(parse_stream_line("event: message").is_none());
    }
}
