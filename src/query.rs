//! Per-request orchestration: retrieve, prompt, generate, parse.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::answer::{self, Answer, GENERATION_ERROR_SUMMARY, STREAM_ERROR_SUMMARY};
use crate::core::config::AppConfig;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ResponseFormat};
use crate::rag::prompt::build_prompt;
use crate::rag::{MetadataFilter, RagPipeline};

const STREAM_CHANNEL_CAPACITY: usize = 8;

/// One validated question.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub question: String,
    pub chat_history: Vec<ChatMessage>,
    pub filter: Option<MetadataFilter>,
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
    pub history_window: usize,
}

impl GenerationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            json_mode: config.llm.json_mode,
            history_window: config.rag.history_window,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
            json_mode: true,
            history_window: 6,
        }
    }
}

#[derive(Clone)]
pub struct QueryService {
    pipeline: RagPipeline,
    chat: Arc<dyn ChatModel>,
    settings: GenerationSettings,
}

impl QueryService {
    pub fn new(pipeline: RagPipeline, chat: Arc<dyn ChatModel>, settings: GenerationSettings) -> Self {
        Self {
            pipeline,
            chat,
            settings,
        }
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.pipeline
    }

    pub fn chat_model(&self) -> &str {
        self.chat.model()
    }

    /// Runs the whole pipeline. Always returns an answer; failures come back
    /// as error-shaped answers rather than errors.
    pub async fn answer(&self, query: &Query) -> Answer {
        let chunks = match self
            .pipeline
            .retrieve(&query.question, query.filter.as_ref())
            .await
        {
            Ok(chunks) => chunks,
            Err(err) => {
                tracing::error!("Retrieval failed: {}", err);
                return Answer::diagnostic(GENERATION_ERROR_SUMMARY, err);
            }
        };

        if chunks.is_empty() {
            tracing::info!("No chunks retrieved; answering with insufficient context.");
            return Answer::insufficient_context();
        }

        let prompt = build_prompt(
            &chunks,
            &query.question,
            &query.chat_history,
            self.settings.history_window,
        );
        tracing::debug!(prompt = %prompt, "Full prompt being sent to LLM");

        let format = if self.settings.json_mode {
            ResponseFormat::JsonObject
        } else {
            ResponseFormat::Text
        };
        let request = ChatRequest::from_prompt(prompt)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens)
            .with_response_format(format);

        tracing::info!(model = %self.chat.model(), "Sending prompt to LLM.");
        match self.chat.chat(request).await {
            Ok(raw) => {
                tracing::info!("LLM returned response.");
                answer::parse_or_diagnose(&raw)
            }
            Err(err) => {
                tracing::error!("LLM call failed: {}", err);
                Answer::diagnostic(GENERATION_ERROR_SUMMARY, err)
            }
        }
    }

    /// Starts a producer task and returns the receiving end of a bounded
    /// channel. The channel closes once the final answer has been sent.
    pub fn stream(&self, query: Query) -> mpsc::Receiver<Answer> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let service = self.clone();

        tokio::spawn(async move {
            let question = query.question.clone();
            let worker = tokio::spawn(async move { service.answer(&query).await });

            let answer = match worker.await {
                Ok(answer) => answer,
                Err(err) => {
                    tracing::error!("Error during stream generation: {}", err);
                    Answer::diagnostic(STREAM_ERROR_SUMMARY, err)
                }
            };

            if tx.send(answer).await.is_err() {
                tracing::debug!("Client went away before the answer for '{}' was sent", question);
                return;
            }
            tracing::info!("Finished stream generation for question: '{}'", question);
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SplitterKind;
    use crate::core::errors::ApiError;
    use crate::rag::{Embedder, SqliteVectorStore, Splitter};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ConstantEmbedder;

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        fn model(&self) -> &str {
            "constant"
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct ScriptedChat {
        reply: Result<String, String>,
        prompts: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedChat {
        fn replying(reply: Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
            self.prompts.lock().unwrap().push(request);
            self.reply.clone().map_err(ApiError::Internal)
        }
    }

    async fn service(
        corpus: &std::path::Path,
        index: &std::path::Path,
        chat: Arc<ScriptedChat>,
    ) -> QueryService {
        let store = Arc::new(SqliteVectorStore::with_path(index.join("index.db")).await.unwrap());
        let splitter = Splitter::new(SplitterKind::Markdown, 500, 50).unwrap();
        let pipeline = RagPipeline::new(
            store,
            Arc::new(ConstantEmbedder),
            splitter,
            corpus.to_path_buf(),
            3,
        );
        assert!(pipeline.initialize(false).await.is_ready());
        QueryService::new(pipeline, chat, GenerationSettings::default())
    }

    fn query(question: &str) -> Query {
        Query {
            question: question.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_index_short_circuits_to_insufficient_context() {
        let corpus = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        let chat = ScriptedChat::replying(Ok(r#"{"summary":"never"}"#));

        let service = service(corpus.path(), index.path(), chat.clone()).await;
        let answer = service.answer(&query("Anything?")).await;

        assert_eq!(answer, Answer::insufficient_context());
        assert!(chat.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn model_output_is_parsed_and_request_is_deterministic() {
        let corpus = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        std::fs::write(corpus.path().join("refund.md"), "Refunds allowed within 14 days.").unwrap();
        let chat = ScriptedChat::replying(Ok(r#"{"summary":"14 days","bullets":["Unused"]}"#));

        let service = service(corpus.path(), index.path(), chat.clone()).await;
        let answer = service.answer(&query("How long for refunds?")).await;

        assert_eq!(answer, Answer::new("14 days", vec!["Unused".to_string()]));
        let prompts = chat.prompts.lock().unwrap();
        assert_eq!(prompts[0].temperature, Some(0.0));
        assert_eq!(prompts[0].response_format, ResponseFormat::JsonObject);
        assert!(prompts[0].messages[0].content.contains("Refunds allowed within 14 days."));
    }

    #[tokio::test]
    async fn failures_become_error_shaped_answers() {
        let corpus = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        std::fs::write(corpus.path().join("refund.md"), "Refunds allowed within 14 days.").unwrap();

        let garbled = service(corpus.path(), index.path(), ScriptedChat::replying(Ok("not json"))).await;
        let answer = garbled.answer(&query("q")).await;
        assert_eq!(answer.summary, answer::PARSE_ERROR_SUMMARY);

        let index = tempfile::tempdir().unwrap();
        let failing = service(corpus.path(), index.path(), ScriptedChat::replying(Err("boom"))).await;
        let answer = failing.answer(&query("q")).await;
        assert_eq!(answer.summary, GENERATION_ERROR_SUMMARY);
        assert!(answer.bullets[0].contains("boom"));
    }

    #[tokio::test]
    async fn stream_sends_one_answer_then_closes() {
        let corpus = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        let service = service(corpus.path(), index.path(), ScriptedChat::replying(Ok("{}"))).await;

        let mut rx = service.stream(query("q"));
        assert_eq!(rx.recv().await, Some(Answer::insufficient_context()));
        assert_eq!(rx.recv().await, None);
    }

    struct PanickingChat;

    #[async_trait]
    impl ChatModel for PanickingChat {
        fn model(&self) -> &str {
            "panicking"
        }

        async fn chat(&self, _request: ChatRequest) -> Result<String, ApiError> {
            panic!("model client crashed");
        }
    }

    #[tokio::test]
    async fn crashed_worker_becomes_stream_error_event() {
        let corpus = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        std::fs::write(corpus.path().join("refund.md"), "Refunds allowed within 14 days.").unwrap();

        let store = Arc::new(SqliteVectorStore::with_path(index.path().join("index.db")).await.unwrap());
        let pipeline = RagPipeline::new(
            store,
            Arc::new(ConstantEmbedder),
            Splitter::new(SplitterKind::Markdown, 500, 50).unwrap(),
            corpus.path().to_path_buf(),
            3,
        );
        assert!(pipeline.initialize(false).await.is_ready());
        let service = QueryService::new(pipeline, Arc::new(PanickingChat), GenerationSettings::default());

        let mut rx = service.stream(query("How long for refunds?"));
        let answer = rx.recv().await.unwrap();
        assert_eq!(answer.summary, STREAM_ERROR_SUMMARY);
        assert_eq!(answer.bullets.len(), 1);
        assert_eq!(rx.recv().await, None);
    }
}
