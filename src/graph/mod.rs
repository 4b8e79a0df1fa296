//! Graph store abstraction
//!
//! The pipeline reads one fixed schema:
//!
//! ```text
//! (r:Researcher {id, name, normalized_name})
//! (p:Publication {id, title, abstract, publication_year, venue, cited_by_count, embedding})
//! (d:Department {name})
//! (r)-[:PUBLISHED]->(p)    (r)-[:BELONGS_TO]->(d)
//! ```
//!
//! plus two indices: a full-text index `researcher_name_index` over
//! researcher names and a vector index `pub_embedding_index` over
//! publication abstract embeddings.
//!
//! `GraphStore` is the seam: the production implementation speaks bolt to
//! Neo4j, tests substitute canned stores. Rows come back as JSON maps so
//! evidence can flow to the synthesizer and the caller unchanged.

mod neo4j;

pub use neo4j::Neo4jStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// One result row: column name to value, in query column order as far as
/// JSON objects preserve it.
pub type Row = serde_json::Map<String, Value>;

/// Named query parameters.
pub type Params = Vec<(String, Value)>;

/// Full-text index over Researcher.name / Researcher.normalized_name.
pub const RESEARCHER_NAME_INDEX: &str = "researcher_name_index";

/// Vector index over Publication.embedding.
pub const PUB_EMBEDDING_INDEX: &str = "pub_embedding_index";

/// Errors from the graph data layer.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("graph connection failed: {0}")]
    Connection(String),

    #[error("graph query failed: {0}")]
    Query(String),

    #[error("row decoding failed: {0}")]
    Decode(String),
}

/// Read-only access to the researcher/publication graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Execute a read query and collect all rows. An empty result is a
    /// valid, meaningful outcome, not an error.
    async fn run(&self, query: &str, params: Params) -> Result<Vec<Row>, GraphError>;
}

/// Convenience for building parameter lists.
pub fn param(name: &str, value: impl Into<Value>) -> (String, Value) {
    (name.to_string(), value.into())
}
