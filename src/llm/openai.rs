use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::ChatModel;
use super::types::{ChatRequest, ResponseFormat};
use crate::core::config::{AppConfig, LlmConfig};
use crate::core::errors::ApiError;

/// OpenAI-compatible `/chat/completions` client.
#[derive(Clone)]
pub struct OpenAiChat {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiChat {
    pub fn new(base_url: &str, api_key: &str, config: &LlmConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            client,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ApiError> {
        let api_key = config
            .openai
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is not set".to_string()))?;
        Self::new(&config.openai.base_url, api_key, &config.llm)
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
            if request.response_format == ResponseFormat::JsonObject {
                obj.insert("response_format".to_string(), json!({ "type": "json_object" }));
            }
        }

        body
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "Chat completion failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        extract_content(&payload)
    }
}

fn extract_content(payload: &Value) -> Result<String, ApiError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ApiError::Internal("Chat completion returned no message content".to_string()))
}
