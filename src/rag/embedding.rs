//! Embedding client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::core::config::{AppConfig, EmbeddingConfig};
use crate::core::errors::ApiError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded alongside the index.
    fn model(&self) -> &str;

    /// Embeds `inputs`, returning one vector per input in the same order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, ApiError> {
        let mut vectors = self.embed(&[query.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ApiError::Internal("Embedding response was empty".to_string()))
    }
}

/// OpenAI-compatible `/embeddings` client.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    batch_size: usize,
    client: Client,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: &str,
        api_key: &str,
        config: &EmbeddingConfig,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
            client,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ApiError> {
        let api_key = config
            .openai
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is not set".to_string()))?;
        Self::new(
            &config.openai.base_url,
            api_key,
            &config.embedding,
            Duration::from_secs(config.llm.timeout_secs),
        )
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "Embedding request failed ({}): {}",
                status, text
            )));
        }

        let mut payload: EmbeddingResponse = res.json().await.map_err(ApiError::internal)?;
        if payload.data.len() != inputs.len() {
            return Err(ApiError::Internal(format!(
                "Embedding count mismatch: sent {}, received {}",
                inputs.len(),
                payload.data.len()
            )));
        }
        payload.data.sort_by_key(|item| item.index);

        Ok(payload.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let mut embeddings = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.batch_size) {
            tracing::debug!(model = %self.model, batch = batch.len(), "Requesting embeddings");
            embeddings.extend(self.embed_batch(batch).await?);
        }
        Ok(embeddings)
    }
}
