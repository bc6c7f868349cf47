//! Policy assistant: retrieval-augmented question answering over a corpus
//! of markdown policy documents, served over HTTP with streamed answers.

pub mod answer;
pub mod core;
pub mod llm;
pub mod query;
pub mod rag;
pub mod server;
pub mod state;
