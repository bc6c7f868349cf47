//! The `{summary, bullets}` answer contract and model-output parsing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const INSUFFICIENT_CONTEXT: &str = "insufficient context";
pub const PARSE_ERROR_SUMMARY: &str = "Error parsing model response.";
pub const GENERATION_ERROR_SUMMARY: &str = "Error generating response";
pub const STREAM_ERROR_SUMMARY: &str = "Stream generation error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub summary: String,
    #[serde(default)]
    pub bullets: Vec<String>,
}

impl Answer {
    pub fn new(summary: impl Into<String>, bullets: Vec<String>) -> Self {
        Self {
            summary: summary.into(),
            bullets,
        }
    }

    pub fn insufficient_context() -> Self {
        Self::new(INSUFFICIENT_CONTEXT, Vec::new())
    }

    /// Error-shaped answer: a fixed summary with the error text as the only bullet.
    pub fn diagnostic(summary: &str, error: impl std::fmt::Display) -> Self {
        Self::new(summary, vec![error.to_string()])
    }
}

#[derive(Debug, Error)]
pub enum AnswerParseError {
    #[error("model returned an empty response")]
    Empty,
    #[error("invalid answer JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Strictly deserializes model output into an [`Answer`].
///
/// Surrounding whitespace and a wrapping markdown code fence are ignored;
/// anything else that is not `{"summary": string, "bullets": [string]}` is
/// an error.
pub fn parse_answer(raw: &str) -> Result<Answer, AnswerParseError> {
    let body = strip_code_fence(raw.trim());
    if body.is_empty() {
        return Err(AnswerParseError::Empty);
    }
    Ok(serde_json::from_str::<Answer>(body)?)
}

/// Parses model output, falling back to a diagnostic answer on failure.
pub fn parse_or_diagnose(raw: &str) -> Answer {
    match parse_answer(raw) {
        Ok(answer) => answer,
        Err(err) => {
            tracing::warn!("Failed to parse LLM response as an answer. Error: {}", err);
            tracing::debug!(raw = %raw, "Unparsable model output");
            Answer::diagnostic(PARSE_ERROR_SUMMARY, err)
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`) on the opening fence line.
    match inner.find('\n') {
        Some(newline) => inner[newline + 1..].trim(),
        None => inner.trim(),
    }
}
