//! Markdown corpus loader.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use walkdir::WalkDir;

use super::types::Document;

/// Reads every `*.md` file under `dir` (recursively) into a [`Document`].
///
/// Files are returned in path order. `metadata.source` is the base file
/// name, so `policies/billing/refund.md` becomes `refund.md`.
pub fn load_documents(dir: &Path) -> anyhow::Result<Vec<Document>> {
    if !dir.is_dir() {
        bail!("Policies directory not found: {}", dir.display());
    }

    tracing::info!("Loading documents from directory: {}", dir.display());

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry =
            entry.with_context(|| format!("Failed to walk directory {}", dir.display()))?;
        if entry.file_type().is_file() && is_markdown(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        tracing::debug!(source = %source, chars = text.chars().count(), "Loaded document");
        documents.push(Document::new(text, source));
    }

    if documents.is_empty() {
        tracing::warn!("No documents found in {}.", dir.display());
    } else {
        tracing::info!("Successfully loaded {} document(s).", documents.len());
    }

    Ok(documents)
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}
