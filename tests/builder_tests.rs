//! End-to-end build pipeline tests against mocked upstreams

use ragforge::context::AppContext;
use ragforge::error::RagError;
use ragforge::knowledge::{
    graph_dir, vectors_dir, FlatVectorIndex, GraphStore, LexicalGraphStore, VectorIndex,
};
use ragforge::manifest::{AgentManifest, MANIFEST_FILE};
use serde_json::json;
use std::path::Path;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIMENSION: usize = 4;

fn write_project(dir: &Path, server_uri: &str) {
    std::fs::create_dir_all(dir.join("data")).unwrap();
    std::fs::write(
        dir.join(MANIFEST_FILE),
        "name: test-kb\nembedding_dimension: 4\nsystem_prompt: Test prompt.\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("config.yaml"),
        format!(
            "llm:\n  base_url: {uri}\n  api_key: test\n  model: test-model\n\
             embedder:\n  base_url: {uri}\n  api_key: test\n",
            uri = server_uri
        ),
    )
    .unwrap();
}

/// Mount embeddings (longer than D, exercising truncation), triple
/// extraction, and tool description mocks.
async fn mount_upstreams(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.1, 0.2, 0.3, 0.4, 0.5, 0.6]}]
        })))
        .mount(server)
        .await;

    // The two chat calls are told apart by their system prompts
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("knowledge graph extraction"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-model",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "```json\n[{\"subject\": \"AI\", \"predicate\": \"is\", \"object\": \"simulation of intelligence\"}]\n```"
                },
                "finish_reason": "stop"
            }]
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("describe knowledge-base search tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-model",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Search the AI fundamentals knowledge base."
                },
                "finish_reason": "stop"
            }]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_build_single_document() {
    let server = MockServer::start().await;
    mount_upstreams(&server).await;

    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path(), &server.uri());
    std::fs::write(
        dir.path().join("data").join("x.md"),
        "# AI\n\nAI is the simulation of intelligence.",
    )
    .unwrap();

    let ctx = AppContext::load(dir.path(), None).unwrap();
    let report = ragforge::builder::build(&ctx).await.unwrap();

    assert_eq!(report.documents, 1);
    assert_eq!(report.chunks, 1);
    assert_eq!(report.vectors, 1);
    assert!(report.triples >= 1);
    assert_eq!(report.skipped_triple_groups, 0);

    // Artifacts are on disk and loadable
    let index = FlatVectorIndex::open(vectors_dir(dir.path()), DIMENSION)
        .await
        .unwrap();
    assert_eq!(index.count(), 1);

    let graph = LexicalGraphStore::open(graph_dir(dir.path())).await.unwrap();
    assert!(graph.count() >= 1);

    // The manifest was updated with the generated tool
    let manifest = AgentManifest::load(&dir.path().join(MANIFEST_FILE)).unwrap();
    assert_eq!(manifest.mcp_tools.len(), 1);
    assert_eq!(manifest.mcp_tools[0].name, "search_test_kb_knowledge");
    assert_eq!(
        manifest.mcp_tools[0].description,
        "Search the AI fundamentals knowledge base."
    );
    assert_eq!(report.tool_description, manifest.mcp_tools[0].description);
}

#[tokio::test]
async fn test_build_is_deterministic_across_runs() {
    let server = MockServer::start().await;
    mount_upstreams(&server).await;

    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path(), &server.uri());
    std::fs::write(
        dir.path().join("data").join("x.md"),
        "# AI\n\nAI is the simulation of intelligence.",
    )
    .unwrap();

    let ctx = AppContext::load(dir.path(), None).unwrap();
    let first = ragforge::builder::build(&ctx).await.unwrap();
    let second = ragforge::builder::build(&ctx).await.unwrap();

    assert_eq!(first.chunks, second.chunks);
    assert_eq!(first.vectors, second.vectors);
    assert_eq!(first.triples, second.triples);
}

#[tokio::test]
async fn test_build_empty_data_directory_fails() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path(), &server.uri());

    let ctx = AppContext::load(dir.path(), None).unwrap();
    let result = ragforge::builder::build(&ctx).await;
    assert!(matches!(result, Err(RagError::InvalidInput(_))));
}

#[tokio::test]
async fn test_build_refuses_missing_credentials() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("data")).unwrap();
    std::fs::write(
        dir.path().join(MANIFEST_FILE),
        "name: test-kb\nembedding_dimension: 4\n",
    )
    .unwrap();
    // No config.yaml: no upstream credentials at all

    let ctx = AppContext::load(dir.path(), None).unwrap();
    let result = ragforge::builder::build(&ctx).await;
    assert!(matches!(result, Err(RagError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_build_skips_failed_triple_groups() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.1, 0.2, 0.3, 0.4]}]
        })))
        .mount(&server)
        .await;
    // Triple extraction always fails; description succeeds
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("knowledge graph extraction"))
        .respond_with(ResponseTemplate::new(500).set_body_string("no triples today"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("describe knowledge-base search tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "A search tool."}, "finish_reason": "stop"}]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path(), &server.uri());
    std::fs::write(dir.path().join("data").join("x.md"), "Some content here.").unwrap();

    let ctx = AppContext::load(dir.path(), None).unwrap();
    let report = ragforge::builder::build(&ctx).await.unwrap();

    // The build survives: vectors are complete, the graph is just empty
    assert_eq!(report.vectors, 1);
    assert_eq!(report.triples, 0);
    assert_eq!(report.skipped_triple_groups, 1);
}

#[tokio::test]
async fn test_build_aborts_on_embedding_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(500).set_body_string("embedder down"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path(), &server.uri());
    std::fs::write(dir.path().join("data").join("x.md"), "Some content here.").unwrap();

    let ctx = AppContext::load(dir.path(), None).unwrap();
    let result = ragforge::builder::build(&ctx).await;
    assert!(matches!(result, Err(RagError::Upstream(_))));
}
