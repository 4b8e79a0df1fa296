//! Neo4j bolt implementation of `GraphStore`
//!
//! Parameters arrive as JSON values (the shape the rest of the pipeline
//! speaks) and are converted to bolt types at the boundary; rows are
//! deserialized back into JSON maps.

use super::{GraphError, GraphStore, Params, Row};
use async_trait::async_trait;
use neo4rs::{query, BoltList, BoltMap, BoltNull, BoltString, BoltType, Graph};
use serde_json::Value;
use tracing::{debug, warn};

/// Bolt-backed graph store. Cheap to clone; the underlying driver pools
/// connections and is safe for concurrent independent use.
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Connect to a Neo4j instance.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, GraphError> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        Ok(Self { graph })
    }

    /// Wrap an already-connected driver.
    pub fn from_graph(graph: Graph) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn run(&self, text: &str, params: Params) -> Result<Vec<Row>, GraphError> {
        debug!(query = text, "executing graph query");

        let mut q = query(text);
        for (name, value) in params {
            q = q.param(&name, json_to_bolt(value));
        }

        let mut stream = self
            .graph
            .execute(q)
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let mut rows = Vec::new();
        loop {
            let next = stream
                .next()
                .await
                .map_err(|e| GraphError::Query(e.to_string()))?;
            let Some(record) = next else { break };

            let value: Value = record
                .to::<Value>()
                .map_err(|e| GraphError::Decode(e.to_string()))?;
            match value {
                Value::Object(map) => rows.push(map),
                other => {
                    // Single-column rows may decode as a bare value
                    warn!("non-object row from graph: {}", other);
                    let mut map = Row::new();
                    map.insert("value".to_string(), other);
                    rows.push(map);
                }
            }
        }

        Ok(rows)
    }
}

fn json_to_bolt(value: Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BoltType::from(i)
            } else {
                BoltType::from(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => BoltType::from(s.as_str()),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(json_to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt = BoltMap::new();
            for (key, item) in map {
                bolt.put(BoltString::from(key.as_str()), json_to_bolt(item));
            }
            BoltType::Map(bolt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_conversion() {
        assert!(matches!(json_to_bolt(json!(null)), BoltType::Null(_)));
        assert!(matches!(json_to_bolt(json!(true)), BoltType::Boolean(_)));
        assert!(matches!(json_to_bolt(json!(2020)), BoltType::Integer(_)));
        assert!(matches!(json_to_bolt(json!(0.87)), BoltType::Float(_)));
        assert!(matches!(json_to_bolt(json!("Marek")), BoltType::String(_)));
    }

    #[test]
    fn test_embedding_list_conversion() {
        let bolt = json_to_bolt(json!([0.1, 0.2, 0.3]));
        match bolt {
            BoltType::List(list) => assert_eq!(list.len(), 3),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_map_conversion() {
        let bolt = json_to_bolt(json!({"titles": ["a", "b"], "k": 5}));
        assert!(matches!(bolt, BoltType::Map(_)));
    }
}
