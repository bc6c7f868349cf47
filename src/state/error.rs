use thiserror::Error;

use crate::core::errors::ApiError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to initialize embedding client: {0}")]
    Embedding(#[source] ApiError),

    #[error("Failed to initialize LLM client: {0}")]
    Llm(#[source] ApiError),

    #[error("Invalid splitter configuration: {0}")]
    Splitter(#[source] anyhow::Error),
}
