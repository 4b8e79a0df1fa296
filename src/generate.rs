//! Cypher query generation
//!
//! Template-eligible categories get a fixed, parameterized query shape:
//! generation is deterministic and side-effect-free, so the same intent
//! and entity always yield the same query text. Categories that need
//! free-form filtering logic (topic filters combined with structured
//! filters, department trend shapes) delegate to a language-model call
//! constrained by a fixed schema instruction.
//!
//! Everything that leaves this module passes a structural check first:
//! every `$placeholder` bound, read-only clauses only, labels and
//! relationship types restricted to the fixed schema. Out-of-schema model
//! output is rejected, never passed through.

use crate::ai::{prompts, utils, LlmClient};
use crate::error::GenerationError;
use crate::graph::Params;
use crate::intent::{Intent, IntentCategory};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// How a query came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySource {
    Template,
    LlmGenerated,
}

/// A validated, ready-to-execute read query. Immutable once produced and
/// never reused across intents.
#[derive(Debug, Clone)]
pub struct GeneratedQuery {
    pub text: String,
    pub params: Params,
    pub source: QuerySource,
}

/// Node labels and relationship types of the fixed schema. Anything else
/// in generated output is a schema violation.
const ALLOWED_SCHEMA_NAMES: [&str; 5] = [
    "Researcher",
    "Publication",
    "Department",
    "PUBLISHED",
    "BELONGS_TO",
];

/// Clauses that would write to the graph. The pipeline is read-only.
const WRITE_CLAUSES: [&str; 7] = [
    "CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP",
];

/// Query generator: fixed templates plus a constrained LLM path.
pub struct QueryGenerator {
    llm: Arc<dyn LlmClient>,
}

impl QueryGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Generate the query for a template-eligible intent. The resolved
    /// entity is already folded into the intent's `author_id`.
    pub async fn generate(&self, intent: &Intent) -> Result<GeneratedQuery, GenerationError> {
        if let Some(text) = template_for(intent.category) {
            let params = bind_referenced(text, &slot_bindings(intent))?;
            return Ok(GeneratedQuery {
                text: text.to_string(),
                params,
                source: QuerySource::Template,
            });
        }

        if intent.category == IntentCategory::OpenQuestion {
            return Err(GenerationError::NoTemplate(
                intent.category.name().to_string(),
            ));
        }

        self.generate_with_llm(intent).await
    }

    /// Author discovery for the open-question branch: recover the
    /// researchers behind a set of publication titles.
    pub async fn generate_author_discovery(
        &self,
        titles: &[String],
    ) -> Result<GeneratedQuery, GenerationError> {
        if titles.is_empty() {
            return Err(GenerationError::InvalidOutput(
                "no titles to discover authors for".to_string(),
            ));
        }

        let user_content = format!(
            "Here is the list of titles to find authors for: {}",
            serde_json::to_string(titles).unwrap_or_default()
        );
        let raw = self
            .llm
            .chat(prompts::AUTHOR_DISCOVERY_PROMPT, &user_content, &[])
            .await?;
        let text = utils::strip_code_fences(&raw);

        validate_structure(&text)?;
        let mut bindings = BTreeMap::new();
        bindings.insert("titles".to_string(), json!(titles));
        let params = bind_referenced(&text, &bindings)?;

        Ok(GeneratedQuery {
            text,
            params,
            source: QuerySource::LlmGenerated,
        })
    }

    async fn generate_with_llm(&self, intent: &Intent) -> Result<GeneratedQuery, GenerationError> {
        let user_content = serde_json::to_string(intent)
            .map_err(|e| GenerationError::InvalidOutput(e.to_string()))?;
        let raw = self
            .llm
            .chat(prompts::CYPHER_SYSTEM_PROMPT, &user_content, &[])
            .await?;
        let text = utils::strip_code_fences(&raw);
        debug!(category = intent.category.name(), "model-generated query");

        validate_structure(&text)?;
        let params = bind_referenced(&text, &slot_bindings(intent))?;

        Ok(GeneratedQuery {
            text,
            params,
            source: QuerySource::LlmGenerated,
        })
    }
}

/// Fixed query shapes for the author-centric categories.
fn template_for(category: IntentCategory) -> Option<&'static str> {
    use IntentCategory::*;
    let text = match category {
        AuthorPublicationsRange => {
            "\
MATCH (r:Researcher {id: $author_id})-[:PUBLISHED]->(p:Publication)
WHERE ($start_year IS NULL OR p.publication_year >= $start_year)
  AND ($end_year IS NULL OR p.publication_year <= $end_year)
RETURN p.title AS title, p.publication_year AS publication_year, p.venue AS venue
ORDER BY p.publication_year DESC
LIMIT 50"
        }
        AuthorLatestPublication => {
            "\
MATCH (r:Researcher {id: $author_id})-[:PUBLISHED]->(p:Publication)
RETURN p.title AS title, p.publication_year AS publication_year, p.venue AS venue
ORDER BY p.publication_year DESC
LIMIT 1"
        }
        AuthorTopVenue => {
            "\
MATCH (r:Researcher {id: $author_id})-[:PUBLISHED]->(p:Publication)
WHERE p.venue IS NOT NULL
RETURN p.venue AS venue, count(p) AS publications
ORDER BY publications DESC
LIMIT 5"
        }
        AuthorTopCoauthors => {
            "\
MATCH (r:Researcher {id: $author_id})-[:PUBLISHED]->(p:Publication)<-[:PUBLISHED]-(c:Researcher)
WHERE c.id <> r.id
RETURN c.name AS coauthor, count(DISTINCT p) AS shared_publications
ORDER BY shared_publications DESC
LIMIT 10"
        }
        AuthorPairSharedPublications => {
            "\
MATCH (r:Researcher {id: $author_id})-[:PUBLISHED]->(p:Publication)<-[:PUBLISHED]-(s:Researcher)
WHERE toLower(s.name) = toLower($second_author)
   OR toLower(s.normalized_name) = toLower($second_author)
RETURN p.title AS title, p.publication_year AS publication_year
ORDER BY p.publication_year DESC
LIMIT 50"
        }
        AuthorMainResearchAreas => {
            "\
MATCH (r:Researcher {id: $author_id})-[:PUBLISHED]->(p:Publication)
RETURN p.title AS title, p.venue AS venue, p.publication_year AS publication_year
ORDER BY coalesce(p.cited_by_count, 0) DESC
LIMIT 25"
        }
        AuthorInstitutionCollabFrequency => {
            "\
MATCH (r:Researcher {id: $author_id})-[:PUBLISHED]->(p:Publication)<-[:PUBLISHED]-(c:Researcher)
WHERE c.id <> r.id
MATCH (c)-[:BELONGS_TO]->(d:Department)
RETURN d.name AS department, count(DISTINCT p) AS collaborations
ORDER BY collaborations DESC
LIMIT 10"
        }
        // Free-form filtering: handled by the LLM path
        AuthorTopicPublicationCount | AuthorTopicExtent | AuthorTopicSynergy
        | AuthorTopicPeers | DepartmentTopicTrends | OpenQuestion => return None,
    };
    Some(text)
}

/// Everything an intent can legitimately bind. BTreeMap keeps parameter
/// order stable so generation stays deterministic.
fn slot_bindings(intent: &Intent) -> BTreeMap<String, Value> {
    let mut bindings = BTreeMap::new();
    bindings.insert("author_id".to_string(), json_or_null(&intent.author_id));
    bindings.insert("author".to_string(), json_or_null(&intent.author));
    bindings.insert(
        "second_author".to_string(),
        json_or_null(&intent.second_author),
    );
    bindings.insert("topic".to_string(), json_or_null(&intent.topic));
    bindings.insert(
        "departments".to_string(),
        intent
            .department
            .as_ref()
            .map(|d| json!(d.as_list()))
            .unwrap_or(Value::Null),
    );
    bindings.insert(
        "start_year".to_string(),
        intent.start_year.map(|y| json!(y)).unwrap_or(Value::Null),
    );
    bindings.insert(
        "end_year".to_string(),
        intent.end_year.map(|y| json!(y)).unwrap_or(Value::Null),
    );
    bindings
}

fn json_or_null(slot: &Option<String>) -> Value {
    slot.as_ref().map(|s| json!(s)).unwrap_or(Value::Null)
}

/// Bind exactly the placeholders the query references. A placeholder with
/// no corresponding binding is a generation failure, not a runtime graph
/// error.
fn bind_referenced(
    text: &str,
    bindings: &BTreeMap<String, Value>,
) -> Result<Params, GenerationError> {
    let placeholder = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("static regex");
    let mut params: Params = Vec::new();

    for capture in placeholder.captures_iter(text) {
        let name = &capture[1];
        if params.iter().any(|(n, _)| n == name) {
            continue;
        }
        let value = bindings
            .get(name)
            .ok_or_else(|| GenerationError::UnboundPlaceholder(name.to_string()))?;
        params.push((name.to_string(), value.clone()));
    }

    Ok(params)
}

/// Lightweight structural check on model output - not full execution.
fn validate_structure(text: &str) -> Result<(), GenerationError> {
    if text.is_empty() || !text.to_uppercase().contains("RETURN") {
        return Err(GenerationError::InvalidOutput(
            "output has no RETURN clause".to_string(),
        ));
    }

    let word = Regex::new(r"[A-Za-z_]+").expect("static regex");
    for m in word.find_iter(text) {
        let upper = m.as_str().to_uppercase();
        if WRITE_CLAUSES.contains(&upper.as_str()) {
            return Err(GenerationError::WriteClause(upper));
        }
    }

    // Labels and relationship types appear as `:Name` after `(` or `[`
    let label = Regex::new(r"[(\[]\s*[A-Za-z_0-9]*\s*:\s*([A-Za-z_][A-Za-z0-9_]*)")
        .expect("static regex");
    for capture in label.captures_iter(text) {
        let name = &capture[1];
        if !ALLOWED_SCHEMA_NAMES.contains(&name) {
            return Err(GenerationError::SchemaViolation(name.to_string()));
        }
    }

    Ok(())
}
