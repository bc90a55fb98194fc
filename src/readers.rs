//! Document readers: turn the `data/` directory into `Document`s
//!
//! Plain text and Markdown are read as UTF-8. Unreadable files are logged
//! and skipped; the builder decides whether an empty result is fatal.

use crate::error::Result;
use crate::knowledge::Document;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extensions the shipped readers understand
const TEXT_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

/// Subdirectories of `data/` owned by the build artifacts, never read back
const ARTIFACT_DIRS: [&str; 2] = ["vectors", "graph"];

/// Load every readable document under `data_dir`, sorted by path so chunk
/// ids and insertion order are stable across runs.
pub fn load_documents(data_dir: &Path) -> Result<Vec<Document>> {
    let mut files = Vec::new();
    collect_files(data_dir, data_dir, &mut files)?;
    files.sort();

    let mut documents = Vec::new();
    for relative in files {
        let path = data_dir.join(&relative);
        match std::fs::read(&path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(content) => {
                    let name = relative.to_string_lossy().replace('\\', "/");
                    debug!(source = %name, bytes = content.len(), "Loaded document");
                    documents.push(Document::new(name, content));
                }
                Err(_) => {
                    warn!(path = %path.display(), "Skipping document with invalid UTF-8");
                }
            },
            Err(e) => {
                warn!(path = %path.display(), "Skipping unreadable document: {}", e);
            }
        }
    }
    Ok(documents)
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), "Skipping unreadable directory: {}", e);
            return Ok(());
        }
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }

        if path.is_dir() {
            if dir == root && ARTIFACT_DIRS.contains(&name.as_str()) {
                continue;
            }
            collect_files(root, &path, out)?;
        } else if is_supported(&path) {
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        } else {
            debug!(path = %path.display(), "Skipping unsupported file type");
        }
    }
    Ok(())
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_sorted_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "second").unwrap();
        std::fs::write(dir.path().join("a.txt"), "first").unwrap();
        std::fs::write(dir.path().join("ignored.pdf"), "binary").unwrap();

        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name, "a.txt");
        assert_eq!(docs[0].content, "first");
        assert_eq!(docs[1].name, "b.md");
    }

    #[test]
    fn test_artifact_dirs_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("vectors")).unwrap();
        std::fs::write(dir.path().join("vectors").join("stale.txt"), "no").unwrap();
        std::fs::create_dir_all(dir.path().join("notes")).unwrap();
        std::fs::write(dir.path().join("notes").join("inner.md"), "yes").unwrap();

        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name, "notes/inner.md");
    }

    #[test]
    fn test_invalid_utf8_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.txt"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::write(dir.path().join("good.txt"), "ok").unwrap();

        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name, "good.txt");
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let docs = load_documents(dir.path()).unwrap();
        assert!(docs.is_empty());
    }
}
