//! Application context threaded through the builder and runtime
//!
//! Created once in `main`; nothing in the crate reads configuration or the
//! manifest from globals.

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::manifest::{AgentManifest, MANIFEST_FILE};
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything a build or serve run needs to know about its project
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Project root holding `agent.yaml`, `config.yaml`, and `data/`
    pub project_dir: PathBuf,
    /// Resolved runtime configuration
    pub config: RuntimeConfig,
    /// Loaded agent manifest
    pub manifest: AgentManifest,
    /// Where the manifest was loaded from (and is written back to)
    pub manifest_path: PathBuf,
}

impl AppContext {
    /// Load config and manifest for `project_dir`. `manifest_override`
    /// points at an alternative manifest file when set.
    pub fn load(project_dir: &Path, manifest_override: Option<&Path>) -> Result<Self> {
        let config = RuntimeConfig::load(project_dir)?;
        let manifest_path = manifest_override
            .map(Path::to_path_buf)
            .unwrap_or_else(|| project_dir.join(MANIFEST_FILE));
        let manifest = AgentManifest::load(&manifest_path)?;

        info!(
            project = %project_dir.display(),
            agent = %manifest.name,
            "Loaded application context"
        );
        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            config,
            manifest,
            manifest_path,
        })
    }

    /// The documents directory consumed by the builder
    pub fn data_dir(&self) -> PathBuf {
        self.project_dir.join("data")
    }

    /// Declared embedding dimension D; the manifest wins over the config
    pub fn embedding_dimension(&self) -> usize {
        if self.manifest.embedding_dimension > 0 {
            self.manifest.embedding_dimension
        } else {
            self.config.embedder.dimensions
        }
    }
}
