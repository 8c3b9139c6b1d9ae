// ABOUTME: Embedding client for OpenAI-compatible providers with request batching
// ABOUTME: The registry probe embeds a trivial string and verifies the vector length
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::models::{EmbeddingConfig, ProviderKind};

/// Inputs per upstream request
const BATCH_SIZE: usize = 64;

/// Embedding client bound to one registered embedding configuration
pub struct EmbeddingClient<'a> {
    http: &'a reqwest::Client,
    config: &'a EmbeddingConfig,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

impl<'a> EmbeddingClient<'a> {
    /// Bind a client to a configuration
    #[must_use]
    pub const fn new(http: &'a reqwest::Client, config: &'a EmbeddingConfig) -> Self {
        Self { http, config }
    }

    /// Generate embeddings for a batch of texts
    ///
    /// # Errors
    ///
    /// Returns an error if a provider call fails
    pub async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match self.config.provider {
            ProviderKind::OpenAi => self.embed_openai(texts).await,
        }
    }

    /// Generate an embedding for a single text
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails or returns no vector
    pub async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        let results = self.embed_batch(&[text.to_owned()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| AppError::external_service("No embedding returned"))
    }

    /// Connectivity probe: embed a trivial string and check the vector
    /// length matches the configured dimensionality
    ///
    /// # Errors
    ///
    /// Returns an error describing the failed probe or the mismatch
    pub async fn ping(&self) -> AppResult<()> {
        let vector = self.embed_query("Ping!").await?;
        let expected = usize::try_from(self.config.dimensions).unwrap_or(0);
        if vector.len() != expected {
            return Err(AppError::external_service(format!(
                "Embedding vector length mismatch: got {}, expected {expected}",
                vector.len()
            )));
        }
        tracing::debug!(
            "Ping embedding ok, first dims: {:?}",
            &vector[..vector.len().min(3)]
        );
        Ok(())
    }

    async fn embed_openai(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let req = EmbedRequest {
                model: &self.config.name,
                input: chunk.to_vec(),
            };

            let resp = self
                .http
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&req)
                .send()
                .await
                .map_err(|e| {
                    AppError::external_service(format!("Failed to reach embedding provider: {e}"))
                })?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(AppError::external_service(format!(
                    "Embedding provider returned {status}: {body}"
                )));
            }

            let body: EmbedResponse = resp.json().await.map_err(|e| {
                AppError::external_service(format!("Failed to parse embedding response: {e}"))
            })?;

            all_embeddings.extend(body.data.into_iter().map(|d| d.embedding));
        }

        Ok(all_embeddings)
    }
}
