use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use serde_json::{json, Map, Value};

use crate::core::errors::ApiError;
use crate::llm::ChatMessage;
use crate::query::Query;
use crate::rag::MetadataFilter;
use crate::state::AppState;

const UNSUPPORTED_MEDIA_TYPE: &str = "Content-Type must be application/json.";
const SERVICE_UNAVAILABLE: &str = "The LLM service is currently not available.";

/// `POST /api/query`: validates the request, then streams the answer as
/// server-sent events.
///
/// Every rejection happens before the pipeline is touched.
pub async fn query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    require_json_content_type(&headers)?;
    let query = parse_query(&body)?;

    let Some(service) = state.query_service() else {
        tracing::error!("Query rejected: RAG pipeline is not initialized.");
        return Err(ApiError::ServiceUnavailable(SERVICE_UNAVAILABLE.to_string()));
    };

    tracing::info!("Received query: '{}'", query.question);
    let receiver = service.stream(query);
    let events = stream::unfold(receiver, |mut receiver| async move {
        let answer = receiver.recv().await?;
        Some((Event::default().json_data(&answer), receiver))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn require_json_content_type(headers: &HeaderMap) -> Result<(), ApiError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(is_json_media_type)
        .unwrap_or(false);

    if is_json {
        Ok(())
    } else {
        Err(ApiError::UnsupportedMediaType(
            UNSUPPORTED_MEDIA_TYPE.to_string(),
        ))
    }
}

fn is_json_media_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

/// Parses and validates a query body.
///
/// Syntax errors are reported as invalid JSON; everything else that does not
/// fit `{question, chat_history?, filter_on_metadata?}` is collected into a
/// single validation error listing each offending field.
fn parse_query(body: &[u8]) -> Result<Query, ApiError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|err| ApiError::InvalidJson(err.to_string()))?;

    let Value::Object(fields) = value else {
        return Err(ApiError::field("body", "Input should be a valid object"));
    };

    let mut errors = Vec::new();
    let question = validate_question(&fields, &mut errors);
    let chat_history = validate_history(&fields, &mut errors);
    let filter = validate_filter(&fields, &mut errors);

    if !errors.is_empty() {
        let details = Value::Array(errors);
        tracing::warn!("Query validation failed: {}", details);
        return Err(ApiError::Validation(details));
    }

    Ok(Query {
        question,
        chat_history,
        filter,
    })
}

fn validation_entry(loc: &str, msg: &str) -> Value {
    json!({ "loc": [loc], "msg": msg })
}

fn validate_question(fields: &Map<String, Value>, errors: &mut Vec<Value>) -> String {
    match fields.get("question") {
        None | Some(Value::Null) => {
            errors.push(validation_entry("question", "Field required"));
            String::new()
        }
        Some(Value::String(question)) if question.trim().is_empty() => {
            errors.push(validation_entry("question", "Question must not be empty"));
            String::new()
        }
        Some(Value::String(question)) => question.trim().to_string(),
        Some(_) => {
            errors.push(validation_entry("question", "Input should be a valid string"));
            String::new()
        }
    }
}

fn validate_history(fields: &Map<String, Value>, errors: &mut Vec<Value>) -> Vec<ChatMessage> {
    match fields.get("chat_history") {
        None | Some(Value::Null) => Vec::new(),
        Some(history) => match serde_json::from_value::<Vec<ChatMessage>>(history.clone()) {
            Ok(messages) => messages,
            Err(_) => {
                errors.push(validation_entry(
                    "chat_history",
                    "Input should be a list of {role, content} objects",
                ));
                Vec::new()
            }
        },
    }
}

fn validate_filter(
    fields: &Map<String, Value>,
    errors: &mut Vec<Value>,
) -> Option<MetadataFilter> {
    match fields.get("filter_on_metadata") {
        None | Some(Value::Null) => None,
        Some(Value::Object(conditions)) => Some(MetadataFilter::new(conditions.clone())),
        Some(_) => {
            errors.push(validation_entry(
                "filter_on_metadata",
                "Input should be a valid object",
            ));
            None
        }
    }
}
