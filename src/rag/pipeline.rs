//! Index lifecycle and retrieval.
//!
//! The index is either loaded from disk or rebuilt from the policy corpus
//! exactly once at startup; the outcome is reported as an [`IndexInit`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;

use super::embedding::Embedder;
use super::loader::load_documents;
use super::splitter::Splitter;
use super::store::{MetadataFilter, VectorStore};
use super::types::{Chunk, Document, ScoredChunk};
use crate::core::errors::ApiError;

pub const META_EMBEDDING_MODEL: &str = "embedding_model";
pub const META_BUILT_AT: &str = "built_at";

/// Outcome of the one-time build-or-load step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexInit {
    Loaded { chunks: usize },
    BuiltFresh { chunks: usize, documents: usize },
    Failed { reason: String },
}

impl IndexInit {
    pub fn is_ready(&self) -> bool {
        !matches!(self, IndexInit::Failed { .. })
    }
}

#[derive(Clone)]
pub struct RagPipeline {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    splitter: Splitter,
    policies_dir: PathBuf,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        splitter: Splitter,
        policies_dir: PathBuf,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            splitter,
            policies_dir,
            top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model()
    }

    /// Loads the persisted index when it is usable, otherwise rebuilds it
    /// from the corpus. Never panics; failures are reported in the result.
    pub async fn initialize(&self, force_rebuild: bool) -> IndexInit {
        match self.try_initialize(force_rebuild).await {
            Ok(init) => init,
            Err(err) => {
                tracing::error!("Failed to initialize vector index: {:#}", err);
                IndexInit::Failed {
                    reason: format!("{:#}", err),
                }
            }
        }
    }

    async fn try_initialize(&self, force_rebuild: bool) -> anyhow::Result<IndexInit> {
        let existing = self.store.count().await?;
        let recorded_model = self.store.get_meta(META_EMBEDDING_MODEL).await?;

        if force_rebuild {
            tracing::info!("Rebuild requested; {} existing chunks will be replaced.", existing);
        } else if existing == 0 {
            tracing::info!("No existing vector index found or index is empty. Creating a new one.");
        } else if recorded_model.as_deref() != Some(self.embedder.model()) {
            tracing::warn!(
                "Index was built with embedding model {:?}, configured model is '{}'. Rebuilding.",
                recorded_model,
                self.embedder.model()
            );
        } else {
            tracing::info!("Loaded existing vector index with {} chunks.", existing);
            return Ok(IndexInit::Loaded { chunks: existing });
        }

        self.build_fresh().await
    }

    /// Loads, splits and embeds the whole corpus before touching the store,
    /// then swaps the new contents in with one transaction. A failure at any
    /// step leaves the previous index intact.
    async fn build_fresh(&self) -> anyhow::Result<IndexInit> {
        let documents = load_documents(&self.policies_dir)?;
        let chunks = self.splitter.split_documents(&documents)?;
        if chunks.is_empty() {
            tracing::warn!("No document chunks to embed. Creating an empty vector index.");
        }

        let items = self
            .embed_chunks(chunks)
            .await
            .context("Failed to embed document chunks")?;
        let added = items.len();

        let built_at = Utc::now().to_rfc3339();
        self.store
            .replace_all(
                items,
                &[
                    (META_EMBEDDING_MODEL, self.embedder.model()),
                    (META_BUILT_AT, built_at.as_str()),
                ],
            )
            .await
            .context("Failed to persist vector index")?;

        tracing::info!(
            "Vector index created with {} chunks from {} document(s).",
            added,
            documents.len()
        );
        Ok(IndexInit::BuiltFresh {
            chunks: added,
            documents: documents.len(),
        })
    }

    /// Appends documents to the index, splitting them first when `split`
    /// is set. Returns the number of chunks added.
    pub async fn add_documents(&self, documents: &[Document], split: bool) -> anyhow::Result<usize> {
        if documents.is_empty() {
            tracing::info!("No new documents provided to add.");
            return Ok(0);
        }

        tracing::info!("Adding {} new documents to the vector index.", documents.len());
        let chunks = if split {
            self.splitter.split_documents(documents)?
        } else {
            documents
                .iter()
                .map(|doc| Chunk::from_document(doc, doc.text.clone(), 0, 0))
                .collect()
        };

        let items = self.embed_chunks(chunks).await?;
        let added = items.len();
        self.store.insert_batch(items).await?;
        tracing::info!("Added {} chunks to the vector index.", added);
        Ok(added)
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<(Chunk, Vec<f32>)>, ApiError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let inputs: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed(&inputs).await?;
        if embeddings.len() != chunks.len() {
            return Err(ApiError::Internal(format!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        Ok(chunks.into_iter().zip(embeddings).collect())
    }

    pub async fn close(&self) {
        self.store.close().await;
    }

    /// Top-K chunks for `question`. An empty index yields an empty vec.
    pub async fn retrieve(
        &self,
        question: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        let filter = filter.filter(|f| !f.is_empty());
        tracing::info!(
            "Retrieving documents for: '{}' with filter: {:?}",
            question,
            filter
        );

        let query_embedding = self.embedder.embed_query(question).await?;
        let results = self.store.search(&query_embedding, self.top_k, filter).await?;

        for hit in &results {
            tracing::debug!(
                source = %hit.chunk.source,
                chunk_index = hit.chunk.chunk_index,
                score = hit.score,
                "Retrieved chunk"
            );
        }
        Ok(results)
    }
}
