//! End-to-end tests against the real router on an ephemeral port, with the
//! embedding and chat backends replaced by deterministic fakes.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use policy_assistant::answer::Answer;
use policy_assistant::core::config::{AppConfig, Environment, SplitterKind};
use policy_assistant::core::errors::ApiError;
use policy_assistant::llm::{ChatModel, ChatRequest};
use policy_assistant::rag::{Embedder, IndexInit, RagPipeline, Splitter, SqliteVectorStore};
use policy_assistant::server::router::router;
use policy_assistant::state::AppState;

const VOCABULARY: [&str; 4] = ["refund", "return", "shipping", "support"];

#[derive(Default)]
struct FakeEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model(&self) -> &str {
        "fake-embedding"
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(inputs
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                VOCABULARY
                    .iter()
                    .map(|word| lower.matches(word).count() as f32 + 0.01)
                    .collect()
            })
            .collect())
    }
}

/// Answers with one bullet per context passage header found in the prompt,
/// which exposes the retrieved chunk set to the client.
#[derive(Default)]
struct FakeChat {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatModel for FakeChat {
    fn model(&self) -> &str {
        "fake-chat"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = &request.messages[0].content;
        let sources: Vec<&str> = prompt
            .lines()
            .filter(|line| line.starts_with('[') && line.contains("] Source: "))
            .collect();
        Ok(json!({ "summary": "Answer from context.", "bullets": sources }).to_string())
    }
}

struct TestServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    embedder: Arc<FakeEmbedder>,
    chat: Arc<FakeChat>,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(corpus: &Path, index: &Path) -> Self {
        let mut config = AppConfig::default();
        config.env = Environment::Testing;
        config.rag.top_k = 2;

        let store = Arc::new(
            SqliteVectorStore::with_path(index.join("index.db"))
                .await
                .unwrap(),
        );
        let embedder = Arc::new(FakeEmbedder::default());
        let chat = Arc::new(FakeChat::default());
        let splitter = Splitter::new(SplitterKind::Markdown, 500, 150).unwrap();
        let pipeline = RagPipeline::new(
            store,
            embedder.clone(),
            splitter,
            corpus.to_path_buf(),
            config.rag.top_k,
        );
        let state = AppState::with_services(config, pipeline, chat.clone(), false).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            embedder,
            chat,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn post_query(&self, content_type: &str, body: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/query"))
            .header("content-type", content_type)
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }

    async fn ask(&self, question: &str) -> Vec<Answer> {
        let response = self
            .post_query("application/json", &json!({ "question": question }).to_string())
            .await;
        assert_eq!(response.status(), 200);
        let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/event-stream"));
        parse_events(&response.text().await.unwrap())
    }

    fn downstream_calls(&self) -> usize {
        self.embedder.calls.load(Ordering::SeqCst) + self.chat.calls.load(Ordering::SeqCst)
    }
}

/// Splits an SSE body into its `data:` payloads, ignoring keep-alive comments.
fn parse_events(body: &str) -> Vec<Answer> {
    body.split("\n\n")
        .filter_map(|event| event.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

fn write_corpus(dir: &Path) {
    std::fs::write(
        dir.join("refund.md"),
        "# Refund Policy\n\nA refund is issued within 14 days of purchase.",
    )
    .unwrap();
    std::fs::write(
        dir.join("return.md"),
        "# Return Policy\n\nA return is accepted within 30 days of delivery.",
    )
    .unwrap();
    std::fs::write(
        dir.join("shipping.md"),
        "# Shipping Policy\n\nShipping takes five business days.",
    )
    .unwrap();
}

#[tokio::test]
async fn health_and_status_report_readiness() {
    let corpus = tempfile::tempdir().unwrap();
    let index = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());
    let server = TestServer::start(corpus.path(), index.path()).await;

    let health: Value = reqwest::get(server.url("/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        health,
        json!({ "status": "ok", "message": "Policy Assistant API is healthy." })
    );

    let status: Value = reqwest::get(server.url("/api/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["ready"], true);
    assert_eq!(status["index"]["state"], "built_fresh");
    assert_eq!(status["index"]["chunks"], 3);
    assert_eq!(status["embedding_model"], "fake-embedding");
    assert_eq!(status["chat_model"], "fake-chat");
    assert_eq!(status["top_k"], 2);
}

#[tokio::test]
async fn rejected_requests_make_no_downstream_calls() {
    let corpus = tempfile::tempdir().unwrap();
    let index = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());
    let server = TestServer::start(corpus.path(), index.path()).await;
    let baseline = server.downstream_calls();

    let response = server
        .post_query("text/plain", r#"{"question": "Refunds?"}"#)
        .await;
    assert_eq!(response.status(), 415);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid request");
    assert_eq!(body["details"], "Content-Type must be application/json.");

    let response = server.post_query("application/json", "{}").await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Validation Error");
    assert_eq!(body["details"][0]["loc"], json!(["question"]));

    let response = server
        .post_query("application/json", r#"{"question": "#)
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid JSON format");

    assert_eq!(server.downstream_calls(), baseline);
}

#[tokio::test]
async fn failed_index_answers_service_unavailable() {
    let root = tempfile::tempdir().unwrap();
    let index = tempfile::tempdir().unwrap();
    let server = TestServer::start(&root.path().join("missing"), index.path()).await;
    assert!(matches!(server.state.index, IndexInit::Failed { .. }));

    let response = server
        .post_query("application/json", r#"{"question": "Refunds?"}"#)
        .await;
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "error": "Service Unavailable",
            "details": "The LLM service is currently not available."
        })
    );
    assert_eq!(server.chat.calls.load(Ordering::SeqCst), 0);

    let status: Value = reqwest::get(server.url("/api/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["ready"], false);
    assert_eq!(status["index"]["state"], "failed");
}

#[tokio::test]
async fn empty_corpus_yields_insufficient_context() {
    let corpus = tempfile::tempdir().unwrap();
    let index = tempfile::tempdir().unwrap();
    let server = TestServer::start(corpus.path(), index.path()).await;

    let events = server.ask("How long do refunds take?").await;
    assert_eq!(events, vec![Answer::insufficient_context()]);
    assert_eq!(server.chat.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn answers_stream_as_server_sent_events() {
    let corpus = tempfile::tempdir().unwrap();
    let index = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());
    let server = TestServer::start(corpus.path(), index.path()).await;

    let response = server
        .post_query(
            "application/json; charset=utf-8",
            r#"{"question": "How long does a refund take?"}"#,
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.starts_with("data: "));
    assert!(body.ends_with("\n\n"));

    let events = parse_events(&body);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].summary, "Answer from context.");
    assert_eq!(events[0].bullets.len(), 2);
    assert!(events[0].bullets[0].contains("Refund_Policy.md"));
}

#[tokio::test]
async fn repeated_queries_retrieve_the_same_chunks() {
    let corpus = tempfile::tempdir().unwrap();
    let index = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());
    let server = TestServer::start(corpus.path(), index.path()).await;

    let first = server.ask("Can I return an item for a refund?").await;
    let second = server.ask("Can I return an item for a refund?").await;
    assert_eq!(first, second);
    assert_eq!(first[0].bullets.len(), 2);
}

#[tokio::test]
async fn restart_reuses_the_persisted_index() {
    let corpus = tempfile::tempdir().unwrap();
    let index = tempfile::tempdir().unwrap();
    write_corpus(corpus.path());
    let question = "When does shipping arrive?";

    let before = TestServer::start(corpus.path(), index.path()).await;
    let first = before.ask(question).await;
    before.state.shutdown().await;

    let after = TestServer::start(corpus.path(), index.path()).await;
    assert_eq!(after.state.index, IndexInit::Loaded { chunks: 3 });
    let second = after.ask(question).await;

    assert_eq!(first, second);
    assert!(second[0].bullets[0].contains("Shipping_Policy.md"));
    // Only the query itself was embedded after the restart.
    assert_eq!(after.embedder.calls.load(Ordering::SeqCst), 1);
}
