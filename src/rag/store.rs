//! VectorStore trait: abstract interface for the persisted chunk index.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::types::{Chunk, ScoredChunk};
use crate::core::errors::ApiError;

/// Metadata predicate applied before similarity ranking.
///
/// Every key must be present in the chunk's metadata with an equal value.
/// A value of the form `{"$in": [..]}` matches any of the listed values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter(Map<String, Value>);

impl MetadataFilter {
    pub fn new(conditions: Map<String, Value>) -> Self {
        Self(conditions)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        self.0.iter().all(|(key, expected)| {
            let Some(actual) = metadata.get(key) else {
                return false;
            };
            match expected.get("$in").and_then(Value::as_array) {
                Some(options) if expected.as_object().map(|o| o.len()) == Some(1) => {
                    options.iter().any(|option| option == actual)
                }
                _ => expected == actual,
            }
        })
    }
}

impl From<Map<String, Value>> for MetadataFilter {
    fn from(conditions: Map<String, Value>) -> Self {
        Self::new(conditions)
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert chunks with their embedding vectors in one transaction.
    async fn insert_batch(&self, items: Vec<(Chunk, Vec<f32>)>) -> Result<(), ApiError>;

    /// Top-`limit` chunks by cosine similarity, best first.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>, ApiError>;

    async fn count(&self) -> Result<usize, ApiError>;

    async fn get_meta(&self, key: &str) -> Result<Option<String>, ApiError>;

    async fn set_meta(&self, key: &str, value: &str) -> Result<(), ApiError>;

    /// Atomically replaces every chunk and all index metadata.
    async fn replace_all(
        &self,
        items: Vec<(Chunk, Vec<f32>)>,
        meta: &[(&str, &str)],
    ) -> Result<(), ApiError>;

    /// Drop every chunk and all index metadata.
    async fn clear(&self) -> Result<(), ApiError>;

    /// Release connections on shutdown.
    async fn close(&self) {}
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
