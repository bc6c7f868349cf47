//! Document chunking.
//!
//! Two strategies are supported:
//! - `Fixed`: a sliding character window that prefers to end on a sentence
//! - `Markdown`: heading-aware splitting via `text-splitter`, which keeps a
//!   section together whenever it fits in one chunk

use anyhow::{bail, Context};
use text_splitter::{ChunkConfig, MarkdownSplitter};

use super::types::{Chunk, Document};
use crate::core::config::{RagConfig, SplitterKind};

#[derive(Debug, Clone)]
pub struct Splitter {
    kind: SplitterKind,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Splitter {
    pub fn new(kind: SplitterKind, chunk_size: usize, chunk_overlap: usize) -> anyhow::Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be positive");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            kind,
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &RagConfig) -> anyhow::Result<Self> {
        Self::new(config.splitter, config.chunk_size, config.chunk_overlap)
    }

    pub fn split_documents(&self, documents: &[Document]) -> anyhow::Result<Vec<Chunk>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        tracing::info!("Splitting {} documents into chunks.", documents.len());
        let mut chunks = Vec::new();
        for document in documents {
            chunks.extend(self.split_document(document)?);
        }
        tracing::info!("Split documents into {} chunks.", chunks.len());
        Ok(chunks)
    }

    pub fn split_document(&self, document: &Document) -> anyhow::Result<Vec<Chunk>> {
        let pieces = match self.kind {
            SplitterKind::Fixed => self.split_fixed(&document.text),
            SplitterKind::Markdown => self.split_markdown(&document.text)?,
        };

        Ok(pieces
            .into_iter()
            .enumerate()
            .map(|(index, (offset, text))| Chunk::from_document(document, text, index, offset))
            .collect())
    }

    /// Returns `(char_offset, text)` pairs.
    ///
    /// Each window after the first starts `chunk_overlap` characters before
    /// the point where the previous one was cut, so no text is skipped.
    fn split_fixed(&self, text: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();
        let mut pieces = Vec::new();
        let mut start = 0;

        while start < total_chars {
            let end = (start + self.chunk_size).min(total_chars);
            let window: String = chars[start..end].iter().collect();

            let cut = if end < total_chars {
                cut_at_sentence_boundary(&window)
            } else {
                window.as_str()
            };
            let cut_chars = cut.chars().count();

            let leading_ws = cut.chars().take_while(|c| c.is_whitespace()).count();
            let trimmed = cut.trim();
            if !trimmed.is_empty() {
                pieces.push((start + leading_ws, trimmed.to_string()));
            }

            if end == total_chars {
                break;
            }
            let next = (start + cut_chars).saturating_sub(self.chunk_overlap);
            start = next.max(start + 1);
        }

        pieces
    }

    fn split_markdown(&self, text: &str) -> anyhow::Result<Vec<(usize, String)>> {
        let config = ChunkConfig::new(self.chunk_size)
            .with_overlap(self.chunk_overlap)
            .context("Invalid markdown splitter configuration")?
            .with_trim(true);
        let splitter = MarkdownSplitter::new(config);

        Ok(splitter
            .chunk_indices(text)
            .filter(|(_, piece)| !piece.trim().is_empty())
            .map(|(byte_offset, piece)| (text[..byte_offset].chars().count(), piece.to_string()))
            .collect())
    }
}

/// Cuts the window after the last sentence ending in its final 20%.
fn cut_at_sentence_boundary(text: &str) -> &str {
    const SENTENCE_ENDINGS: [&str; 6] = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

    let char_count = text.chars().count();
    let search_start_char = (char_count * 80) / 100;
    let search_start = text
        .char_indices()
        .nth(search_start_char)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let search_text = &text[search_start..];

    SENTENCE_ENDINGS
        .iter()
        .filter_map(|ending| search_text.rfind(ending).map(|pos| pos + ending.len()))
        .max()
        .map(|cut| &text[..search_start + cut])
        .unwrap_or(text)
}
