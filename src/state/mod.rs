use std::sync::Arc;

use crate::core::config::{AppConfig, AppPaths};
use crate::llm::{ChatModel, OpenAiChat};
use crate::query::{GenerationSettings, QueryService};
use crate::rag::{Embedder, IndexInit, OpenAiEmbedder, RagPipeline, Splitter, SqliteVectorStore};

pub mod error;

use error::InitializationError;

/// Shared application state handed to every route.
///
/// Built once at startup. `query` is `None` when the index could not be
/// loaded or built, in which case query requests answer 503.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub index: IndexInit,
    pub embedding_model: String,
    pub chat_model: String,
    pipeline: Option<RagPipeline>,
    query: Option<QueryService>,
}

impl AppState {
    /// Builds the production state: OpenAI clients, the SQLite index under
    /// `paths.index_dir`, and the one-time build-or-load of the index.
    ///
    /// Client misconfiguration is fatal. Index problems are not; they leave
    /// the service running in a degraded state.
    pub async fn initialize(
        config: AppConfig,
        paths: &AppPaths,
        force_rebuild: bool,
    ) -> Result<Arc<Self>, InitializationError> {
        let embedder =
            Arc::new(OpenAiEmbedder::from_config(&config).map_err(InitializationError::Embedding)?);
        let chat = Arc::new(OpenAiChat::from_config(&config).map_err(InitializationError::Llm)?);
        let splitter = Splitter::from_config(&config.rag).map_err(InitializationError::Splitter)?;

        let store = match SqliteVectorStore::new(paths).await {
            Ok(store) => Arc::new(store),
            Err(err) => {
                tracing::error!("Failed to open vector index: {}", err);
                return Ok(Arc::new(Self::degraded(
                    config,
                    IndexInit::Failed {
                        reason: err.to_string(),
                    },
                    embedder.model(),
                    chat.model(),
                )));
            }
        };

        let top_k = config.rag.top_k;
        let pipeline = RagPipeline::new(
            store,
            embedder,
            splitter,
            paths.policies_dir.clone(),
            top_k,
        );
        Ok(Self::with_services(config, pipeline, chat, force_rebuild).await)
    }

    /// Assembles state around already-constructed services and runs the
    /// index build-or-load step.
    pub async fn with_services(
        config: AppConfig,
        pipeline: RagPipeline,
        chat: Arc<dyn ChatModel>,
        force_rebuild: bool,
    ) -> Arc<Self> {
        let index = pipeline.initialize(force_rebuild).await;
        let embedding_model = pipeline.embedding_model().to_string();
        let chat_model = chat.model().to_string();

        let query = if index.is_ready() {
            let settings = GenerationSettings::from_config(&config);
            Some(QueryService::new(pipeline.clone(), chat, settings))
        } else {
            tracing::error!("RAG pipeline is not available; queries will be rejected.");
            None
        };

        Arc::new(Self {
            config: Arc::new(config),
            index,
            embedding_model,
            chat_model,
            pipeline: Some(pipeline),
            query,
        })
    }

    fn degraded(config: AppConfig, index: IndexInit, embedding_model: &str, chat_model: &str) -> Self {
        Self {
            config: Arc::new(config),
            index,
            embedding_model: embedding_model.to_string(),
            chat_model: chat_model.to_string(),
            pipeline: None,
            query: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.query.is_some()
    }

    pub fn query_service(&self) -> Option<&QueryService> {
        self.query.as_ref()
    }

    pub fn top_k(&self) -> usize {
        self.config.rag.top_k
    }

    /// Releases the index connection pool.
    pub async fn shutdown(&self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.close().await;
        }
        tracing::info!("Application state shut down.");
    }
}
