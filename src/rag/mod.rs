//! Retrieval side of the assistant.
//!
//! This module provides:
//! - document loading and chunking of the markdown policy corpus
//! - the embedding client and the persisted SQLite vector index
//! - `RagPipeline`: build-or-load at startup and top-K retrieval per query
//! - grounding prompt assembly

pub mod embedding;
pub mod loader;
pub mod pipeline;
pub mod prompt;
pub mod splitter;
pub mod sqlite;
pub mod store;
pub mod types;

pub use embedding::{Embedder, OpenAiEmbedder};
pub use pipeline::{IndexInit, RagPipeline};
pub use splitter::Splitter;
pub use sqlite::SqliteVectorStore;
pub use store::{MetadataFilter, VectorStore};
pub use types::{Chunk, Document, ScoredChunk};
