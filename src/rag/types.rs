use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// A loaded policy file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), Value::String(source.into()));
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn source(&self) -> &str {
        self.metadata
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// A bounded span of a [`Document`], the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Hex SHA-256 over source, position and content. Stable across rebuilds.
    pub chunk_id: String,
    pub content: String,
    pub source: String,
    pub chunk_index: usize,
    /// Character offset of the chunk within its document.
    pub start_offset: usize,
    /// Inherited document metadata plus `chunk_index`.
    pub metadata: Map<String, Value>,
}

impl Chunk {
    pub fn from_document(
        document: &Document,
        content: String,
        chunk_index: usize,
        start_offset: usize,
    ) -> Self {
        let source = document.source().to_string();
        let mut metadata = document.metadata.clone();
        metadata.insert("chunk_index".to_string(), Value::from(chunk_index));

        Self {
            chunk_id: chunk_id(&source, chunk_index, &content),
            content,
            source,
            chunk_index,
            start_offset,
            metadata,
        }
    }
}

pub fn chunk_id(source: &str, chunk_index: usize, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(chunk_index.to_le_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity, higher is better.
    pub score: f32,
}
