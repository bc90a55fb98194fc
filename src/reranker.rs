//! Rerank client for Cohere-compatible `/rerank` endpoints
//!
//! Optional: retrieval runs without it. Relevance scores come back on an
//! arbitrary scale and are passed through without renormalization.

use crate::config::RerankerConfig;
use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const RERANK_TIMEOUT_SECS: u64 = 30;

/// One reranked document reference
#[derive(Debug, Clone, Deserialize)]
pub struct RerankResult {
    /// Index into the submitted documents
    pub index: usize,
    pub relevance_score: f32,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

/// Client for a rerank upstream
pub struct RerankClient {
    client: reqwest::Client,
    config: RerankerConfig,
}

impl RerankClient {
    pub fn new(config: RerankerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(RERANK_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Score `documents` against `query`, best first
    pub async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankResult>> {
        debug!(documents = documents.len(), "Reranking");

        let request = RerankRequest {
            model: &self.config.model,
            query,
            documents,
            top_n,
        };

        let response = self
            .client
            .post(self.config.resolve_endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Upstream(format!("rerank request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Upstream(format!(
                "rerank returned {}: {}",
                status, body
            )));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RagError::Upstream(format!("parse rerank response: {}", e)))?;

        for result in &parsed.results {
            if result.index >= documents.len() {
                return Err(RagError::Upstream(format!(
                    "rerank result index {} out of range for {} documents",
                    result.index,
                    documents.len()
                )));
            }
        }
        Ok(parsed.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RerankClient {
        RerankClient::new(RerankerConfig {
            base_url: server.uri(),
            api_key: "key".to_string(),
            model: "rerank-v3".to_string(),
            endpoint: String::new(),
        })
    }

    #[tokio::test]
    async fn test_rerank_returns_scores() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"index": 1, "relevance_score": 9.7},
                    {"index": 0, "relevance_score": 0.3}
                ]
            })))
            .mount(&server)
            .await;

        let docs = vec!["first".to_string(), "second".to_string()];
        let results = client_for(&server).rerank("query", &docs, 2).await.unwrap();

        assert_eq!(results[0].index, 1);
        assert!(results[0].relevance_score > results[1].relevance_score);
    }

    #[tokio::test]
    async fn test_rerank_rejects_out_of_range_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"index": 5, "relevance_score": 1.0}]
            })))
            .mount(&server)
            .await;

        let docs = vec!["only".to_string()];
        let result = client_for(&server).rerank("query", &docs, 1).await;
        assert!(matches!(result, Err(RagError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_rerank_failure_maps_to_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let docs = vec!["a".to_string(), "b".to_string()];
        let result = client_for(&server).rerank("query", &docs, 2).await;
        assert!(matches!(result, Err(RagError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;

        let docs = vec!["doc a".to_string()];
        client_for(&server).rerank("the query", &docs, 1).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "rerank-v3");
        assert_eq!(body["query"], "the query");
        assert_eq!(body["documents"][0], "doc a");
        assert_eq!(body["top_n"], 1);
    }
}
