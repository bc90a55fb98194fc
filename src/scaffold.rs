//! Project scaffolding for `init`

use crate::error::{ErrorContext, RagError, Result};
use crate::manifest::{AgentManifest, MANIFEST_FILE};
use std::path::{Path, PathBuf};
use tracing::info;

const CONFIG_TEMPLATE: &str = r#"# Upstream endpoints. Environment variables override these values:
# LLM_BASE_URL, LLM_API_KEY, LLM_MODEL, EMBED_BASE_URL, EMBED_API_KEY,
# EMBED_MODEL, EMBED_DIMENSIONS, RERANK_BASE_URL, RERANK_API_KEY,
# RERANK_MODEL, RERANK_ENDPOINT, PORT, AGENT_API_KEY.
llm:
  base_url: ""
  api_key: ""
  model: ""
embedder:
  base_url: ""
  api_key: ""
  model: ""
# reranker:
#   base_url: ""
#   api_key: ""
#   model: ""
port: 8000
agent_api_key: ""
"#;

const SAMPLE_DOCUMENT: &str = r#"# Welcome

Replace the files in this directory with the documents your agent should
know about, then run `build`.
"#;

/// Create a new project directory with a manifest, config, and sample data
pub fn scaffold_project(name: &str, parent: &Path) -> Result<PathBuf> {
    if name.trim().is_empty() {
        return Err(RagError::InvalidInput("project name cannot be empty".to_string()));
    }

    let project_dir = parent.join(name);
    if project_dir.exists() {
        return Err(RagError::InvalidInput(format!(
            "{} already exists",
            project_dir.display()
        )));
    }

    std::fs::create_dir_all(project_dir.join("data")).with_context("create project layout")?;

    let manifest = AgentManifest {
        name: name.to_string(),
        description: format!("{} knowledge agent", name),
        ..Default::default()
    };
    manifest.save(&project_dir.join(MANIFEST_FILE))?;

    std::fs::write(project_dir.join("config.yaml"), CONFIG_TEMPLATE)
        .with_context("write config template")?;
    std::fs::write(project_dir.join("data").join("welcome.md"), SAMPLE_DOCUMENT)
        .with_context("write sample document")?;

    info!(path = %project_dir.display(), "Scaffolded project");
    Ok(project_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let project = scaffold_project("demo-agent", dir.path()).unwrap();

        assert!(project.join(MANIFEST_FILE).exists());
        assert!(project.join("config.yaml").exists());
        assert!(project.join("data").join("welcome.md").exists());

        let manifest = AgentManifest::load(&project.join(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest.name, "demo-agent");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_scaffold_refuses_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        scaffold_project("demo", dir.path()).unwrap();
        assert!(matches!(
            scaffold_project("demo", dir.path()),
            Err(RagError::InvalidInput(_))
        ));
    }
}
