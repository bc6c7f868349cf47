use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn root() -> &'static str {
    "Policy Assistant API. POST questions to /api/query."
}

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "Policy Assistant API is healthy."
    }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "ready": state.is_ready(),
        "index": state.index,
        "embedding_model": state.embedding_model,
        "chat_model": state.chat_model,
        "top_k": state.top_k()
    }))
}
