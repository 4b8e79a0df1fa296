//! Answer synthesis
//!
//! Turns merged evidence (structured rows, semantic hits, the original
//! question) into a final natural-language answer. Handles all three
//! evidence shapes - rows only, hits only, rows plus hits - and the
//! empty/empty case, which always yields an explicit "no information"
//! answer rather than a fabricated one.
//!
//! When rows are empty but hits exist, a second refinement call asks for
//! an answer grounded only in the semantic evidence, signaling lower
//! confidence. Synthesis is the one stage whose failures degrade instead
//! of aborting: the orchestrator falls back to `render_evidence`.

use crate::ai::{prompts, ChatMessage, LlmClient, LlmError};
use crate::graph::Row;
use crate::intent::Intent;
use crate::semantic::SemanticHit;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Shown when there is genuinely nothing to answer from.
pub const NO_INFORMATION_ANSWER: &str =
    "I could not find any information matching your question in the researcher database.";

/// Shown when the open-question branch finds no semantic evidence at all.
pub const OPEN_NO_RESULTS_ANSWER: &str = "\
I could not find any relevant publications or researchers matching your question with high confidence.

**Suggestions:**
- Try asking about specific engineering topics like 'smart grids', 'reinforcement learning', or 'nanotechnology'.
- Ask about specific University of Alberta researchers or departments.
- Ensure you are asking about work within the Faculty of Engineering.";

const MAX_PAYLOAD_ITEMS: usize = 15;
const MAX_PAYLOAD_TEXT: usize = 500;

/// LLM-backed answer synthesizer.
pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// First-pass synthesis from structured rows plus any semantic hits.
    /// Empty/empty short-circuits to the explicit no-information answer
    /// without a model call.
    pub async fn synthesize(
        &self,
        question: &str,
        intent: &Intent,
        query_text: &str,
        rows: &[Row],
        hits: &[SemanticHit],
        history: &[ChatMessage],
    ) -> Result<String, LlmError> {
        if rows.is_empty() && hits.is_empty() {
            return Ok(NO_INFORMATION_ANSWER.to_string());
        }

        let payload = json!({
            "question": question,
            "intent": intent,
            "query": query_text,
            "db_rows": sanitize(&json!(rows)),
            "semantic_hits": sanitize(&json!(hits)),
        });
        let user_content = payload.to_string();

        let answer = self
            .llm
            .chat(prompts::ANSWER_SYSTEM_PROMPT, &user_content, history)
            .await?;
        Ok(answer.trim().to_string())
    }

    /// Refinement pass: rows were empty but hits exist, so re-answer
    /// grounded only in the semantic evidence.
    pub async fn refine_with_semantic(
        &self,
        question: &str,
        hits: &[SemanticHit],
        first_pass: &str,
    ) -> Result<String, LlmError> {
        let payload = json!({
            "question": question,
            "semantic_hits": sanitize(&json!(hits)),
            "first_pass_summary": first_pass,
        });

        debug!("refinement synthesis over {} semantic hits", hits.len());
        let answer = self
            .llm
            .chat(prompts::SEMANTIC_REASK_PROMPT, &payload.to_string(), &[])
            .await?;
        Ok(answer.trim().to_string())
    }

    /// Open-question synthesis: semantic hits plus whatever authors were
    /// recoverable for them.
    pub async fn synthesize_author_answer(
        &self,
        question: &str,
        hits: &[SemanticHit],
        author_rows: &[Row],
        history: &[ChatMessage],
    ) -> Result<String, LlmError> {
        if hits.is_empty() && author_rows.is_empty() {
            return Ok(NO_INFORMATION_ANSWER.to_string());
        }

        let payload = json!({
            "question": question,
            "semantic_hits": sanitize(&json!(hits)),
            "author_data": sanitize(&json!(author_rows)),
        });

        let answer = self
            .llm
            .chat(
                prompts::FINAL_AUTHOR_ANSWER_PROMPT,
                &payload.to_string(),
                history,
            )
            .await?;
        Ok(answer.trim().to_string())
    }
}

/// Degradation path: when synthesis itself fails, return the evidence as
/// plain text instead of failing the turn.
pub fn render_evidence(rows: &[Row], hits: &[SemanticHit]) -> String {
    if rows.is_empty() && hits.is_empty() {
        return NO_INFORMATION_ANSWER.to_string();
    }

    let mut out = String::from("I found the following, but could not compose a narrative answer:\n");
    for row in rows.iter().take(MAX_PAYLOAD_ITEMS) {
        out.push_str("- ");
        out.push_str(&Value::Object(row.clone()).to_string());
        out.push('\n');
    }
    for hit in hits.iter().take(MAX_PAYLOAD_ITEMS) {
        out.push_str(&format!(
            "- {} ({}, similarity {:.2})\n",
            hit.title,
            hit.publication_year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "year unknown".to_string()),
            hit.similarity
        ));
    }
    out
}

/// Cap list lengths and string lengths before prompting, so a fat result
/// set cannot blow the model's context window.
fn sanitize(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items.iter().take(MAX_PAYLOAD_ITEMS).map(sanitize).collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sanitize(v)))
                .collect(),
        ),
        Value::String(s) if s.len() > MAX_PAYLOAD_TEXT => {
            let mut end = MAX_PAYLOAD_TEXT;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            Value::String(format!("{}...(truncated)", &s[..end]))
        }
        other => other.clone(),
    }
}
