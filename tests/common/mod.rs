//! Shared fixtures for integration tests

use ragforge::config::{EmbedderConfig, LlmConfig};
use ragforge::embedder::EmbeddingClient;
use ragforge::knowledge::types::{RecordMetadata, VectorRecord};
use ragforge::knowledge::{FlatVectorIndex, GraphStore, LexicalGraphStore, Triple, VectorIndex};
use ragforge::llm::LlmClient;
use ragforge::manifest::{AgentManifest, McpToolSpec};
use ragforge::search::HybridSearchEngine;
use ragforge::server::AppState;
use std::sync::Arc;
use wiremock::MockServer;

pub const DIMENSION: usize = 3;

/// Build an AppState whose upstreams all point at `server`
pub fn test_state(server: &MockServer, api_key: Option<String>) -> AppState {
    let mut index = FlatVectorIndex::new("unused", DIMENSION).unwrap();
    index
        .add_many(vec![
            VectorRecord {
                id: "x_md_0".to_string(),
                content: "AI is the simulation of intelligence.".to_string(),
                metadata: RecordMetadata {
                    source: "x.md".to_string(),
                    index: 0,
                },
                embedding: vec![1.0, 0.0, 0.0],
            },
            VectorRecord {
                id: "x_md_1".to_string(),
                content: "Machine learning finds patterns in data.".to_string(),
                metadata: RecordMetadata {
                    source: "x.md".to_string(),
                    index: 1,
                },
                embedding: vec![0.0, 1.0, 0.0],
            },
        ])
        .unwrap();

    let mut graph = LexicalGraphStore::new("unused");
    graph
        .add_many(vec![
            Triple::new("AI", "is", "simulation of intelligence").unwrap(),
            Triple::new("machine learning", "is part of", "AI").unwrap(),
        ])
        .unwrap();

    let embedder = Arc::new(EmbeddingClient::new(
        EmbedderConfig {
            base_url: server.uri(),
            api_key: "test".to_string(),
            model: String::new(),
            dimensions: DIMENSION,
            timeout: 5,
        },
        DIMENSION,
    ));
    let llm = Arc::new(LlmClient::new(LlmConfig {
        base_url: server.uri(),
        api_key: "test".to_string(),
        model: "test-model".to_string(),
        timeout: 5,
    }));

    let engine = Arc::new(HybridSearchEngine::new(
        Arc::new(index),
        Arc::new(graph),
        embedder,
        None,
    ));

    let manifest = AgentManifest {
        name: "test-agent".to_string(),
        description: "Test knowledge agent".to_string(),
        system_prompt: "You are a test agent.".to_string(),
        embedding_dimension: DIMENSION,
        mcp_tools: vec![McpToolSpec {
            name: "search_test_agent_knowledge".to_string(),
            description: "Search the test knowledge base.".to_string(),
        }],
        ..Default::default()
    };

    AppState {
        manifest: Arc::new(manifest),
        engine,
        llm,
        api_key,
    }
}
