//! Semantic search over publication abstract embeddings
//!
//! Embeds a topic (or the whole question) and queries the vector index
//! for the nearest publications. Runs speculatively in parallel with
//! intent classification: by the time classification decides whether
//! semantic evidence is needed, it is often already available.
//!
//! "No results" is never a failure here; only embedding-service or index
//! unavailability is.

use crate::ai::EmbeddingClient;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::graph::{param, GraphStore, Row, PUB_EMBEDDING_INDEX};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// One vector-index hit, ordered descending by similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticHit {
    pub publication_id: String,
    pub title: String,
    pub publication_year: Option<i64>,
    pub cited_by_count: i64,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    /// Cosine similarity in [0,1].
    pub similarity: f32,
    pub author_ids: Vec<String>,
}

/// Vector-index search service.
pub struct SemanticSearch {
    graph: Arc<dyn GraphStore>,
    embedder: Arc<dyn EmbeddingClient>,
    min_relevance: f32,
}

impl SemanticSearch {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        embedder: Arc<dyn EmbeddingClient>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            graph,
            embedder,
            min_relevance: config.min_relevance,
        }
    }

    /// Embed `text` and search. When `filtered` is set, hits below the
    /// relevance floor are dropped (used for topic augmentation, where
    /// marginal hits are noise rather than evidence).
    pub async fn search(
        &self,
        text: &str,
        top_k: usize,
        filtered: bool,
    ) -> Result<Vec<SemanticHit>, PipelineError> {
        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        let embedding = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| PipelineError::Execution(format!("embedding failed: {}", e)))?;

        self.search_with_embedding(&embedding, top_k, filtered).await
    }

    /// Search with a precomputed embedding (the speculative question
    /// embedding, or a resume-time one).
    pub async fn search_with_embedding(
        &self,
        embedding: &[f32],
        top_k: usize,
        filtered: bool,
    ) -> Result<Vec<SemanticHit>, PipelineError> {
        if embedding.is_empty() {
            return Ok(vec![]);
        }

        let query = format!(
            "\
CALL db.index.vector.queryNodes(\"{}\", $k, $embedding) YIELD node, score
RETURN node.id AS publication_id,
       node.title AS title,
       node.publication_year AS publication_year,
       coalesce(node.cited_by_count, 0) AS cited_by_count,
       node.abstract AS abstract,
       [(node)<-[:PUBLISHED]-(r:Researcher) | r.id] AS author_ids,
       score
ORDER BY score DESC
LIMIT $k",
            PUB_EMBEDDING_INDEX
        );

        let embedding_values: Vec<Value> =
            embedding.iter().map(|v| json!(*v as f64)).collect();
        let rows = self
            .graph
            .run(
                &query,
                vec![
                    param("k", top_k as i64),
                    ("embedding".to_string(), Value::Array(embedding_values)),
                ],
            )
            .await
            .map_err(|e| PipelineError::Execution(format!("vector query failed: {}", e)))?;

        let mut hits: Vec<SemanticHit> = rows.iter().filter_map(hit_from_row).collect();
        if filtered {
            hits.retain(|h| h.similarity >= self.min_relevance);
        }
        debug!(hits = hits.len(), filtered, "semantic search complete");

        Ok(hits)
    }
}

fn hit_from_row(row: &Row) -> Option<SemanticHit> {
    let publication_id = match row.get("publication_id")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(SemanticHit {
        publication_id,
        title: row.get("title")?.as_str()?.to_string(),
        publication_year: row.get("publication_year").and_then(Value::as_i64),
        cited_by_count: row
            .get("cited_by_count")
            .and_then(Value::as_i64)
            .unwrap_or(0),
        abstract_text: row
            .get("abstract")
            .and_then(Value::as_str)
            .map(str::to_string),
        similarity: row.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
        author_ids: row
            .get("author_ids")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::LlmError;
    use crate::graph::{GraphError, Params};
    use async_trait::async_trait;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingClient for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    struct CannedGraph(Vec<Row>);

    #[async_trait]
    impl GraphStore for CannedGraph {
        async fn run(&self, _query: &str, _params: Params) -> Result<Vec<Row>, GraphError> {
            Ok(self.0.clone())
        }
    }

    fn hit_row(id: &str, title: &str, score: f64) -> Row {
        json!({
            "publication_id": id,
            "title": title,
            "publication_year": 2021,
            "cited_by_count": 12,
            "abstract": "abstract text",
            "author_ids": ["author-7"],
            "score": score,
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn service(rows: Vec<Row>) -> SemanticSearch {
        SemanticSearch::new(
            Arc::new(CannedGraph(rows)),
            Arc::new(FixedEmbedder),
            &PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_empty_text_returns_no_hits() {
        let search = service(vec![]);
        let hits = search.search("  ", 10, true).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_relevance_floor_applied_when_filtered() {
        let rows = vec![
            hit_row("pub-1", "Smart Grid Stability", 0.91),
            hit_row("pub-2", "Unrelated Biology Paper", 0.41),
        ];
        let search = service(rows.clone());

        let filtered = search.search("smart grids", 10, true).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].publication_id, "pub-1");

        let unfiltered = service(rows).search("smart grids", 10, false).await.unwrap();
        assert_eq!(unfiltered.len(), 2);
    }

    #[tokio::test]
    async fn test_hit_parsing() {
        let search = service(vec![hit_row("pub-1", "Smart Grid Stability", 0.91)]);
        let hits = search.search("smart grids", 10, false).await.unwrap();
        let hit = &hits[0];
        assert_eq!(hit.title, "Smart Grid Stability");
        assert_eq!(hit.publication_year, Some(2021));
        assert_eq!(hit.author_ids, vec!["author-7".to_string()]);
        assert!((hit.similarity - 0.91).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_graph_failure_propagates() {
        struct DownGraph;
        #[async_trait]
        impl GraphStore for DownGraph {
            async fn run(&self, _q: &str, _p: Params) -> Result<Vec<Row>, GraphError> {
                Err(GraphError::Query("index missing".to_string()))
            }
        }
        let search = SemanticSearch::new(
            Arc::new(DownGraph),
            Arc::new(FixedEmbedder),
            &PipelineConfig::default(),
        );
        assert!(search.search("smart grids", 10, false).await.is_err());
    }
}
