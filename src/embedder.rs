//! Embedding client for OpenAI-compatible `/embeddings` endpoints

use crate::config::EmbedderConfig;
use crate::error::{RagError, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Client for a single embeddings upstream
pub struct EmbeddingClient {
    client: reqwest::Client,
    config: EmbedderConfig,
    /// Declared dimension D every returned vector is coerced to
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    /// Create a new embedding client with the manifest-declared dimension
    pub fn new(config: EmbedderConfig, dimension: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }

    /// Embed a batch of texts in one request.
    ///
    /// Vectors longer than the declared dimension are truncated locally;
    /// shorter vectors are a hard error. The `dimensions` request parameter
    /// is never sent.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(batch = texts.len(), "Embedding batch");

        let model = match self.config.model.as_str() {
            "" => None,
            name => Some(name),
        };
        let request = EmbeddingsRequest {
            input: texts,
            model,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Upstream(format!("embeddings request: {}", e)))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::RateLimited(format!("embeddings: {}", body)));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Upstream(format!(
                "embeddings returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| RagError::Upstream(format!("parse embeddings response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(RagError::Upstream(format!(
                "embeddings returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        let mut vectors = Vec::with_capacity(parsed.data.len());
        for item in parsed.data {
            let mut embedding = item.embedding;
            if embedding.len() < self.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
            embedding.truncate(self.dimension);
            vectors.push(embedding);
        }
        Ok(vectors)
    }

    /// Embed a single query string
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Upstream("embeddings returned no vector".to_string()))
    }
}
