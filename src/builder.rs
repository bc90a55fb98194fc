//! Build pipeline: documents -> chunks -> vector index + knowledge graph
//!
//! Embedding failures are fatal after retries because the vector index must
//! cover every chunk. Triple extraction and manifest mutation degrade to
//! warnings so a flaky LLM cannot sink an otherwise good build.

use crate::context::AppContext;
use crate::embedder::EmbeddingClient;
use crate::error::{RagError, Result};
use crate::knowledge::{
    graph_dir, vectors_dir, Chunk, Chunker, FlatVectorIndex, GraphStore, LexicalGraphStore,
    Triple, VectorIndex, VectorRecord,
};
use crate::llm::{system_message, user_message, CompletionOptions, LlmClient};
use crate::manifest::EmbeddingMode;
use crate::readers;
use futures::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Batch size for embedding requests
const EMBED_BATCH_SIZE: usize = 20;

/// Backoff schedule applied to rate-limited embedding batches
const EMBED_BACKOFF_SECS: [u64; 5] = [1, 2, 4, 8, 16];

/// Chunks concatenated per triple-extraction call
const TRIPLE_GROUP_SIZE: usize = 10;

/// Attempts per triple-extraction group before the group is skipped
const TRIPLE_MAX_ATTEMPTS: usize = 3;

/// Chunks sampled when generating the tool description
const DESCRIPTION_SAMPLE_CHUNKS: usize = 3;

const TRIPLE_EXTRACTION_PROMPT: &str = "You are a knowledge graph extraction system. Extract \
factual subject-predicate-object triples from the text you are given. Respond with a JSON array \
only, where each element is {\"subject\": \"...\", \"predicate\": \"...\", \"object\": \"...\"}. \
Prefer short noun phrases for subjects and objects and concise predicates. Return [] when the \
text contains no extractable facts.";

const DESCRIPTION_PROMPT: &str = "You describe knowledge-base search tools. Given sample content \
from a knowledge base, reply with one short sentence describing what the search tool covers. \
Reply with the sentence only.";

/// Summary of a completed build
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    pub vectors: usize,
    pub triples: usize,
    pub skipped_triple_groups: usize,
    pub tool_description: String,
}

/// Run the full build for a project
pub async fn build(ctx: &AppContext) -> Result<BuildReport> {
    // Stage 1: refuse to start on a broken manifest or missing credentials
    ctx.config.validate()?;
    ctx.manifest.validate()?;
    let dimension = ctx.embedding_dimension();

    // Stage 2: load documents
    let documents = readers::load_documents(&ctx.data_dir())?;
    if documents.is_empty() {
        return Err(RagError::InvalidInput(format!(
            "no readable documents in {}",
            ctx.data_dir().display()
        )));
    }
    info!(documents = documents.len(), "Loaded documents");

    // Stage 3: chunk everything into one ordered list
    let chunker = Chunker::new(ctx.manifest.chunker_config())?;
    let mut chunks: Vec<Chunk> = Vec::new();
    for document in &documents {
        chunks.extend(chunker.chunk(&document.content, &document.name)?);
    }
    if chunks.is_empty() {
        return Err(RagError::InvalidInput(
            "documents produced no chunks".to_string(),
        ));
    }
    info!(chunks = chunks.len(), "Chunked documents");

    // Stage 4: embed and index
    let embedder = EmbeddingClient::new(ctx.config.embedder.clone(), dimension);
    let embeddings = match ctx.manifest.embedding_mode {
        EmbeddingMode::Parallel => embed_parallel(&embedder, &chunks).await?,
        EmbeddingMode::Sequential => embed_sequential(&embedder, &chunks).await?,
    };

    let mut index = FlatVectorIndex::new(vectors_dir(&ctx.project_dir), dimension)?;
    let records: Vec<VectorRecord> = chunks
        .iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| VectorRecord::from_chunk(chunk, embedding))
        .collect();
    index.add_many(records)?;
    index.persist().await?;
    info!(vectors = index.count(), "Vector index persisted");

    // Stage 5: extract triples into the graph
    let llm = LlmClient::new(ctx.config.llm.clone());
    let mut graph = LexicalGraphStore::new(graph_dir(&ctx.project_dir));
    let mut skipped_groups = 0usize;

    for (group_index, group) in chunks.chunks(TRIPLE_GROUP_SIZE).enumerate() {
        let text: Vec<&str> = group.iter().map(|c| c.content.as_str()).collect();
        match extract_triples(&llm, &text.join("\n\n")).await {
            Ok(triples) => graph.add_many(triples)?,
            Err(e) => {
                warn!(group = group_index, "Skipping triple group: {}", e);
                skipped_groups += 1;
            }
        }
    }
    graph.persist().await?;
    info!(
        triples = graph.count(),
        skipped = skipped_groups,
        "Graph store persisted"
    );

    // Stage 6: generate the tool description, falling back to a template
    let description = generate_tool_description(&llm, &chunks, &ctx.manifest.slug()).await;

    // Stage 7: write the tool list back; failure leaves valid artifacts
    let mut manifest = ctx.manifest.clone();
    manifest.set_search_tool(description.clone());
    if let Err(e) = manifest.save(&ctx.manifest_path) {
        warn!("Build artifacts are valid but the manifest was not updated: {}", e);
    }

    Ok(BuildReport {
        documents: documents.len(),
        chunks: chunks.len(),
        vectors: index.count(),
        triples: graph.count(),
        skipped_triple_groups: skipped_groups,
        tool_description: description,
    })
}

/// Embed batches with worker fan-out sized to the host CPU count,
/// preserving chunk order.
async fn embed_parallel(embedder: &EmbeddingClient, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    info!(workers, "Embedding in parallel mode");

    let batches: Vec<Vec<String>> = chunks
        .chunks(EMBED_BATCH_SIZE)
        .map(|batch| batch.iter().map(|c| c.content.clone()).collect())
        .collect();

    let results: Vec<Vec<Vec<f32>>> = stream::iter(batches)
        .map(|batch| async move { embedder.embed_batch(&batch).await })
        .buffered(workers)
        .try_collect()
        .await
        .map_err(|e| e.context("embed documents"))?;

    Ok(results.into_iter().flatten().collect())
}

/// Embed batches one at a time, backing off on rate limits. Any other
/// failure aborts the batch and the build.
async fn embed_sequential(embedder: &EmbeddingClient, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
    info!("Embedding in sequential mode");
    let mut embeddings = Vec::with_capacity(chunks.len());

    for (batch_index, batch) in chunks.chunks(EMBED_BATCH_SIZE).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let mut retries = 0usize;

        loop {
            match embedder.embed_batch(&texts).await {
                Ok(vectors) => {
                    embeddings.extend(vectors);
                    break;
                }
                Err(RagError::RateLimited(msg)) if retries < EMBED_BACKOFF_SECS.len() => {
                    let delay = EMBED_BACKOFF_SECS[retries];
                    retries += 1;
                    warn!(
                        batch = batch_index,
                        retry = retries,
                        delay_secs = delay,
                        "Rate limited, backing off: {}",
                        msg
                    );
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                }
                Err(e) => {
                    return Err(e.context(&format!("embed batch {}", batch_index)));
                }
            }
        }
    }
    Ok(embeddings)
}

/// Ask the LLM for triples, retrying transient failures
async fn extract_triples(llm: &LlmClient, text: &str) -> Result<Vec<Triple>> {
    let messages = [
        system_message(TRIPLE_EXTRACTION_PROMPT),
        user_message(text),
    ];
    let options = CompletionOptions::default();

    let mut last_error = RagError::Internal("triple extraction never ran".to_string());
    for attempt in 1..=TRIPLE_MAX_ATTEMPTS {
        match llm.complete(&messages, &options).await {
            Ok(response) => match parse_triples(&response.text) {
                Ok(triples) => return Ok(triples),
                Err(e) => last_error = e,
            },
            Err(e) => last_error = e,
        }
        if attempt < TRIPLE_MAX_ATTEMPTS {
            warn!(attempt, "Triple extraction attempt failed: {}", last_error);
        }
    }
    Err(last_error.context("extract triples"))
}

#[derive(Debug, Deserialize)]
struct RawTriple {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    predicate: String,
    #[serde(default)]
    object: String,
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("static regex"))
}

/// Lenient parse of an LLM triple response: strip Markdown fences, take the
/// outermost JSON array, drop entries with an empty field.
pub fn parse_triples(text: &str) -> Result<Vec<Triple>> {
    let stripped = fence_regex().replace_all(text, "");

    let start = stripped
        .find('[')
        .ok_or_else(|| RagError::Upstream("parse triples response: no JSON array".to_string()))?;
    let end = stripped
        .rfind(']')
        .filter(|&end| end > start)
        .ok_or_else(|| RagError::Upstream("parse triples response: unterminated array".to_string()))?;

    let raw: Vec<RawTriple> = serde_json::from_str(&stripped[start..=end])
        .map_err(|e| RagError::Upstream(format!("parse triples response: {}", e)))?;

    Ok(raw
        .iter()
        .filter_map(|t| Triple::new(&t.subject, &t.predicate, &t.object))
        .collect())
}

/// Generate a one-line description of the knowledge-search tool, sampling a
/// few chunks for grounding. Falls back to a template on any failure.
async fn generate_tool_description(llm: &LlmClient, chunks: &[Chunk], slug: &str) -> String {
    let samples: Vec<&str> = chunks
        .iter()
        .take(DESCRIPTION_SAMPLE_CHUNKS)
        .map(|c| c.content.as_str())
        .collect();
    let messages = [
        system_message(DESCRIPTION_PROMPT),
        user_message(format!("Sample content:\n\n{}", samples.join("\n\n"))),
    ];

    match llm.complete(&messages, &CompletionOptions::default()).await {
        Ok(response) => {
            let description = response.text.trim().to_string();
            if description.is_empty() {
                warn!("Empty tool description from LLM, using the default");
                default_tool_description(slug)
            } else {
                description
            }
        }
        Err(e) => {
            warn!("Tool description generation failed, using the default: {}", e);
            default_tool_description(slug)
        }
    }
}

fn default_tool_description(slug: &str) -> String {
    format!(
        "Search the {} expert knowledge base for relevant information.",
        slug
    )
}
