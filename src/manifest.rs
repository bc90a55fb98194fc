//! Agent manifest: the editable `agent.yaml` descriptor
//!
//! The manifest owns the agent identity, the system prompt, the declared
//! embedding dimension, and the MCP tool list the builder writes back.
//! Unknown keys are kept in a catch-all map so load -> mutate -> save never
//! drops fields this version does not understand.

use crate::error::{ErrorContext, RagError, Result};
use crate::knowledge::ChunkerConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Manifest file name inside a project directory
pub const MANIFEST_FILE: &str = "agent.yaml";

/// A tool advertised over MCP
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpToolSpec {
    pub name: String,
    pub description: String,
}

/// How the builder drives the embedding upstream
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    /// Fan out across host CPUs; suited to local embedders
    Parallel,
    /// One batch at a time with rate-limit backoff; suited to hosted APIs
    #[default]
    Sequential,
}

/// The agent descriptor stored in `agent.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentManifest {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub system_prompt: String,

    /// Declared embedding dimension D; the single source of truth at build
    #[serde(default)]
    pub embedding_dimension: usize,

    /// Context window of the target model, used to auto-tune chunking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_token_limit: Option<usize>,

    /// Embedding fan-out strategy at build time
    #[serde(default)]
    pub embedding_mode: EmbeddingMode,

    #[serde(default)]
    pub mcp_tools: Vec<McpToolSpec>,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Keys this version does not model; preserved across save
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yml::Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_server_port() -> u16 {
    8000
}

impl Default for AgentManifest {
    fn default() -> Self {
        Self {
            name: "knowledge-agent".to_string(),
            description: String::new(),
            version: default_version(),
            system_prompt: "You are a helpful expert assistant. Answer using the provided \
                            knowledge base context when it is relevant."
                .to_string(),
            embedding_dimension: 768,
            model_token_limit: None,
            embedding_mode: EmbeddingMode::default(),
            mcp_tools: Vec::new(),
            server_port: default_server_port(),
            cors_origins: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl AgentManifest {
    /// Load a manifest from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RagError::InvalidInput(format!("read {}: {}", path.display(), e)))?;
        let manifest: Self =
            serde_yml::from_str(&content).with_context("parse agent manifest")?;
        Ok(manifest)
    }

    /// Write the manifest back to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yml::to_string(self).with_context("serialize agent manifest")?;
        std::fs::write(path, content).with_context("write agent manifest")?;
        info!(path = %path.display(), "Saved agent manifest");
        Ok(())
    }

    /// Validate the fields the builder and runtime depend on
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RagError::InvalidConfig(
                "manifest name cannot be empty".to_string(),
            ));
        }
        if self.embedding_dimension == 0 {
            return Err(RagError::InvalidConfig(
                "manifest embedding_dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Lowercased identifier derived from the agent name
    pub fn slug(&self) -> String {
        let mut slug = String::new();
        for c in self.name.to_lowercase().chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c);
            } else if !slug.ends_with('_') {
                slug.push('_');
            }
        }
        slug.trim_matches('_').to_string()
    }

    /// Name of the default knowledge-search tool
    pub fn search_tool_name(&self) -> String {
        format!("search_{}_knowledge", self.slug())
    }

    /// Chunking parameters, auto-tuned from the model token limit when set
    pub fn chunker_config(&self) -> ChunkerConfig {
        match self.model_token_limit {
            Some(limit) => ChunkerConfig::from_token_limit(limit),
            None => ChunkerConfig::default(),
        }
    }

    /// Replace the MCP tool list with the generated knowledge-search tool
    pub fn set_search_tool(&mut self, description: String) {
        self.mcp_tools = vec![McpToolSpec {
            name: self.search_tool_name(),
            description,
        }];
    }
}
