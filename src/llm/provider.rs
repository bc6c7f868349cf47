use async_trait::async_trait;

use super::types::ChatRequest;
use crate::core::errors::ApiError;

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Chat completion (non-streaming). Returns the assistant message text.
    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError>;
}
