//! Configuration management for the builder and runtime
//!
//! Resolution order: built-in defaults, overridden by `<dir>/config.yaml`,
//! overridden by named environment variables.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Resolved configuration for build and serve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Chat completion upstream
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding upstream
    #[serde(default)]
    pub embedder: EmbedderConfig,

    /// Optional rerank upstream; empty base URL and endpoint disable it
    #[serde(default)]
    pub reranker: RerankerConfig,

    /// Listen port for the runtime server
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer key protecting every route except /health; empty means open
    #[serde(default)]
    pub agent_api_key: String,
}

/// Chat completion endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL, e.g. `https://api.example.com/v1`
    #[serde(default)]
    pub base_url: String,

    /// Bearer token
    #[serde(default)]
    pub api_key: String,

    /// Model name; empty lets a router pick
    #[serde(default)]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout: u64,
}

/// Embedding endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub model: String,

    /// Declared dimension; the manifest value wins when both are set
    #[serde(default)]
    pub dimensions: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embed_timeout")]
    pub timeout: u64,
}

/// Rerank endpoint configuration (Cohere-compatible)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RerankerConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub model: String,

    /// Full endpoint override; takes precedence over base_url
    #[serde(default)]
    pub endpoint: String,
}

fn default_port() -> u16 {
    8000
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_embed_timeout() -> u64 {
    30
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            embedder: EmbedderConfig::default(),
            reranker: RerankerConfig::default(),
            port: default_port(),
            agent_api_key: String::new(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            timeout: default_llm_timeout(),
        }
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            dimensions: 0,
            timeout: default_embed_timeout(),
        }
    }
}

impl RerankerConfig {
    /// Whether reranking is configured at all
    pub fn is_enabled(&self) -> bool {
        !self.base_url.is_empty() || !self.endpoint.is_empty()
    }

    /// Resolve the rerank URL: explicit endpoint override first, then a
    /// base URL that already points at /rerank, then base_url + "/rerank".
    pub fn resolve_endpoint(&self) -> String {
        if !self.endpoint.is_empty() {
            return self.endpoint.clone();
        }
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/rerank") {
            return base.to_string();
        }
        format!("{}/rerank", base)
    }
}

impl RuntimeConfig {
    /// Load configuration for a project directory: defaults, then
    /// `<dir>/config.yaml` when present, then environment variables.
    pub fn load(dir: &Path) -> Result<Self> {
        let defaults = config::Config::try_from(&RuntimeConfig::default())
            .map_err(|e| RagError::InvalidConfig(format!("defaults: {}", e)))?;

        let file = dir.join("config.yaml");
        let mut config: RuntimeConfig = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::from(file).required(false))
            .build()
            .map_err(|e| RagError::InvalidConfig(format!("read config.yaml: {}", e)))?
            .try_deserialize()
            .map_err(|e| RagError::InvalidConfig(format!("parse config.yaml: {}", e)))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply the named environment variable overrides
    fn apply_env_overrides(&mut self) {
        override_string("LLM_BASE_URL", &mut self.llm.base_url);
        override_string("LLM_API_KEY", &mut self.llm.api_key);
        override_string("LLM_MODEL", &mut self.llm.model);

        override_string("EMBED_BASE_URL", &mut self.embedder.base_url);
        override_string("EMBED_API_KEY", &mut self.embedder.api_key);
        override_string("EMBED_MODEL", &mut self.embedder.model);
        if let Ok(value) = std::env::var("EMBED_DIMENSIONS") {
            if let Ok(parsed) = value.parse() {
                self.embedder.dimensions = parsed;
            }
        }

        override_string("RERANK_BASE_URL", &mut self.reranker.base_url);
        override_string("RERANK_API_KEY", &mut self.reranker.api_key);
        override_string("RERANK_MODEL", &mut self.reranker.model);
        override_string("RERANK_ENDPOINT", &mut self.reranker.endpoint);

        if let Ok(value) = std::env::var("PORT") {
            if let Ok(parsed) = value.parse() {
                self.port = parsed;
            }
        }
        override_string("AGENT_API_KEY", &mut self.agent_api_key);
    }

    /// Both build and serve need a reachable LLM and embedder
    pub fn validate(&self) -> Result<()> {
        if self.llm.base_url.is_empty() {
            return Err(RagError::InvalidConfig(
                "llm.base_url is required (or set LLM_BASE_URL)".to_string(),
            ));
        }
        if self.llm.api_key.is_empty() {
            return Err(RagError::InvalidConfig(
                "llm.api_key is required (or set LLM_API_KEY)".to_string(),
            ));
        }
        if self.embedder.base_url.is_empty() {
            return Err(RagError::InvalidConfig(
                "embedder.base_url is required (or set EMBED_BASE_URL)".to_string(),
            ));
        }
        if self.embedder.api_key.is_empty() {
            return Err(RagError::InvalidConfig(
                "embedder.api_key is required (or set EMBED_API_KEY)".to_string(),
            ));
        }
        Ok(())
    }
}

fn override_string(var: &str, target: &mut String) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *target = value;
        }
    }
}
