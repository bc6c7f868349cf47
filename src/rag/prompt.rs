//! Grounding prompt assembly.

use super::types::ScoredChunk;
use crate::llm::ChatMessage;

const INSTRUCTIONS: &str = r#"You are a strict policy-answering assistant. You must answer questions using ONLY the provided context
(which consists of policy documents). You are not allowed to guess, merge, or combine data across different
documents unless they clearly agree.

### INSTRUCTIONS (MUST FOLLOW):

1. Use ONLY the context. No outside knowledge.
2. If different documents provide different answers, DO NOT merge them.
3. If conflicting information is found, STOP and ask the user which policy (e.g., Refund or Return) they are referring to.
4. NEVER mention file names, document titles, or technical metadata.
5. If the answer isn't clearly in the context, respond with: "insufficient context".
6. You must respond in this exact JSON format: {"summary": "...", "bullets": ["...", "..."]}

EXAMPLE SCENARIO:

Context: [1] "Refund Policy: Customer support is available via email and live chat" [2]
"Return Policy: Customer support is available 24/7 via chatbot." Question: At what times is customer support
available? Correct Answer: {"summary": "Customer support availability depends on the specific policy. Please
specify whether you're referring to the Refund or Return policy.", "bullets": []}

END OF EXAMPLE SCENARIO"#;

const RESPONSE_FORMAT: &str = r#"Think step-by-step. Extract only facts from the context above. Do NOT guess. Respond in this JSON format:
{"summary": "...", "bullets": ["...", "..."]}"#;

/// Renders the retrieved chunks as numbered, blank-line separated passages.
pub fn format_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[{}] Source: {}_Policy.md\n---\n{}",
                i + 1,
                source_label(&hit.chunk.source),
                hit.chunk.content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// `refund.md` -> `Refund`
fn source_label(source: &str) -> String {
    let stem = source
        .strip_suffix(".md")
        .or_else(|| source.strip_suffix(".MD"))
        .unwrap_or(source);
    let stem = if stem.is_empty() { "unknown" } else { stem };

    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn format_history(history: &[ChatMessage], window: usize) -> String {
    let start = history.len().saturating_sub(window);
    history[start..]
        .iter()
        .map(|turn| format!("{}: {}", turn.role.trim(), turn.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the full instruction string for one question.
///
/// Pure: the same chunks, question and history always render the same text.
pub fn build_prompt(
    chunks: &[ScoredChunk],
    question: &str,
    history: &[ChatMessage],
    history_window: usize,
) -> String {
    let mut prompt = String::with_capacity(INSTRUCTIONS.len() + 512);
    prompt.push_str(INSTRUCTIONS);
    prompt.push_str("\n\n");

    let recent = format_history(history, history_window);
    if !recent.is_empty() {
        prompt.push_str("Recent conversation:\n");
        prompt.push_str(&recent);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Context:\n");
    prompt.push_str(&format_context(chunks));
    prompt.push_str("\n\nQuestion:\n");
    prompt.push_str(question.trim());
    prompt.push_str("\n\n");
    prompt.push_str(RESPONSE_FORMAT);
    prompt
}
