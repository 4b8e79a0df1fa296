//! Author entity resolution
//!
//! Resolves a person-name fragment into zero, one, or many canonical
//! author records. Strategy order, short-circuiting on the first
//! non-empty result:
//!
//! 1. exact case-insensitive equality on canonical or normalized name
//! 2. full-text fuzzy search (per-token `~` fuzzing), re-ranked by
//!    Jaro-Winkler against the fragment
//!
//! A single fuzzy candidate at or above the confidence floor is
//! auto-accepted; any other non-empty candidate set is surfaced for
//! disambiguation - even one low-confidence match goes to the user rather
//! than being silently accepted. NotFound means the fuzzy search returned
//! nothing at all; data-layer unavailability is a resolver failure,
//! which is a different thing entirely.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::graph::{param, GraphStore, Row, RESEARCHER_NAME_INDEX};
use crate::telemetry::ResolutionPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// A canonical author record with its fuzzy-match confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorCandidate {
    pub id: String,
    pub canonical_name: String,
    pub normalized_name: String,
    pub departments: Vec<String>,
    /// Normalized [0,1] confidence; 1.0 for exact matches.
    pub match_score: f32,
}

/// Outcome of resolving one name fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    /// Fuzzy search returned nothing at all
    NotFound,
    /// Auto-selected: exact match, or a lone fuzzy match above the floor
    SingleMatch(AuthorCandidate),
    /// Requires disambiguation; ordered by score descending
    MultipleMatches(Vec<AuthorCandidate>),
}

/// Exact-then-fuzzy author resolver over the graph.
pub struct EntityResolver {
    graph: Arc<dyn GraphStore>,
    confidence_floor: f32,
    max_candidates: usize,
}

impl EntityResolver {
    pub fn new(graph: Arc<dyn GraphStore>, config: &PipelineConfig) -> Self {
        Self {
            graph,
            confidence_floor: config.fuzzy_confidence_floor,
            max_candidates: config.max_candidates,
        }
    }

    /// Resolve a name fragment. Read-only; no side effects.
    pub async fn resolve(
        &self,
        fragment: &str,
    ) -> Result<(ResolutionOutcome, ResolutionPath), PipelineError> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok((ResolutionOutcome::NotFound, ResolutionPath::None));
        }

        if let Some(candidate) = self.exact_match(fragment).await? {
            debug!(author = %candidate.canonical_name, "exact author match");
            return Ok((
                ResolutionOutcome::SingleMatch(candidate),
                ResolutionPath::ExactMatch,
            ));
        }

        let mut candidates = self.fuzzy_search(fragment).await?;
        let outcome = if candidates.is_empty() {
            ResolutionOutcome::NotFound
        } else if candidates.len() == 1 && candidates[0].match_score >= self.confidence_floor {
            let candidate = candidates.remove(0);
            debug!(
                author = %candidate.canonical_name,
                score = candidate.match_score,
                "lone fuzzy match above floor, auto-selected"
            );
            ResolutionOutcome::SingleMatch(candidate)
        } else {
            ResolutionOutcome::MultipleMatches(candidates)
        };

        Ok((outcome, ResolutionPath::FuzzyMatch))
    }

    /// Fetch the canonical record for a caller-selected candidate id, so
    /// downstream stages see the real name rather than the typo from the
    /// original question.
    pub async fn fetch_by_id(&self, id: &str) -> Result<Option<AuthorCandidate>, PipelineError> {
        let query = "\
MATCH (r:Researcher {id: $id})
RETURN r.id AS id,
       coalesce(r.name, r.normalized_name) AS name,
       r.normalized_name AS normalized_name,
       [(r)-[:BELONGS_TO]->(d:Department) | d.name] AS departments";

        let rows = self
            .graph
            .run(query, vec![param("id", id)])
            .await
            .map_err(|e| PipelineError::Resolution(e.to_string()))?;

        Ok(rows.first().and_then(|row| candidate_from_row(row, 1.0)))
    }

    /// Case-insensitive equality on canonical or normalized name. The
    /// data layer is expected to keep names unique; if it does not, the
    /// lowest id wins deterministically.
    async fn exact_match(&self, fragment: &str) -> Result<Option<AuthorCandidate>, PipelineError> {
        let query = "\
MATCH (r:Researcher)
WHERE toLower(r.name) = toLower($name)
   OR toLower(r.normalized_name) = toLower($name)
RETURN r.id AS id,
       coalesce(r.name, r.normalized_name) AS name,
       r.normalized_name AS normalized_name,
       [(r)-[:BELONGS_TO]->(d:Department) | d.name] AS departments
ORDER BY r.id ASC
LIMIT 1";

        let rows = self
            .graph
            .run(query, vec![param("name", fragment)])
            .await
            .map_err(|e| PipelineError::Resolution(e.to_string()))?;

        Ok(rows.first().and_then(|row| candidate_from_row(row, 1.0)))
    }

    /// Full-text search tolerant of typos and partial tokens. Raw index
    /// scores are not comparable across backends, so candidates are
    /// re-ranked by Jaro-Winkler against the fragment and the confidence
    /// floor applies to that normalized score.
    async fn fuzzy_search(&self, fragment: &str) -> Result<Vec<AuthorCandidate>, PipelineError> {
        let term = fuzzy_term(fragment);
        let query = format!(
            "\
CALL db.index.fulltext.queryNodes(\"{}\", $term) YIELD node, score
OPTIONAL MATCH (node)-[:BELONGS_TO]->(d:Department)
RETURN node.id AS id,
       coalesce(node.name, node.normalized_name) AS name,
       node.normalized_name AS normalized_name,
       collect(DISTINCT d.name) AS departments,
       score
ORDER BY score DESC
LIMIT $limit",
            RESEARCHER_NAME_INDEX
        );

        let rows = self
            .graph
            .run(
                &query,
                vec![param("term", term), param("limit", self.max_candidates as i64)],
            )
            .await
            .map_err(|e| PipelineError::Resolution(e.to_string()))?;

        let wanted = fragment.to_lowercase();
        let mut candidates: Vec<AuthorCandidate> = rows
            .iter()
            .filter_map(|row| {
                let name = row.get("name")?.as_str()?;
                let normalized = row
                    .get("normalized_name")
                    .and_then(Value::as_str)
                    .unwrap_or(name);
                let score = strsim::jaro_winkler(&wanted, &name.to_lowercase())
                    .max(strsim::jaro_winkler(&wanted, &normalized.to_lowercase()))
                    as f32;
                candidate_from_row(row, score)
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.match_score
                .partial_cmp(&a.match_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates.truncate(self.max_candidates);

        Ok(candidates)
    }
}

/// Per-token `~` fuzzing for the Lucene full-text query.
fn fuzzy_term(fragment: &str) -> String {
    fragment
        .split_whitespace()
        .map(|part| format!("{}~", part))
        .collect::<Vec<_>>()
        .join(" ")
}

fn candidate_from_row(row: &Row, match_score: f32) -> Option<AuthorCandidate> {
    let id = match row.get("id")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let canonical_name = row.get("name")?.as_str()?.to_string();
    let normalized_name = row
        .get("normalized_name")
        .and_then(Value::as_str)
        .unwrap_or(&canonical_name)
        .to_string();
    let departments = row
        .get("departments")
        .and_then(Value::as_array)
        .map(|ds| {
            ds.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(AuthorCandidate {
        id,
        canonical_name,
        normalized_name,
        departments,
        match_score,
    })
}
