//! Neo4j connection client.

use std::time::Duration;

use neo4rs::{ConfigBuilder, Graph, Query};
use serde::de::DeserializeOwned;
use tokio::time::timeout;

use emr_core::{EngineError, EngineResult, GraphSettings};

/// Bound on any single graph call. A hung store surfaces as a typed
/// timeout instead of stalling a sync pass or query indefinitely.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for graph store operations.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Create a new GraphClient from settings.
    ///
    /// Note: neo4rs uses a lazy deadpool — `Graph::connect` only creates the
    /// pool object and does NOT establish a real bolt connection yet. We run
    /// a cheap `RETURN 1` ping immediately so that callers get a fast failure
    /// when Neo4j is unreachable instead of hanging silently.
    pub async fn connect(settings: &GraphSettings) -> EngineResult<Self> {
        let config = ConfigBuilder::default()
            .uri(&settings.uri)
            .user(&settings.user)
            .password(&settings.password)
            .db("neo4j")
            .max_connections(8)
            .fetch_size(50)
            .build()
            .map_err(|e| EngineError::GraphWrite(format!("invalid Neo4j config: {}", e)))?;

        let graph = Graph::connect(config)
            .await
            .map_err(|e| EngineError::GraphWrite(format!("failed to create connection pool: {}", e)))?;

        // Ping to force an actual TCP+bolt handshake so the timeout applies.
        match timeout(QUERY_TIMEOUT, graph.run(Query::new("RETURN 1".to_string()))).await {
            Err(_) => return Err(EngineError::Timeout(QUERY_TIMEOUT)),
            Ok(Err(e)) => {
                return Err(EngineError::GraphWrite(format!(
                    "Neo4j is not responding to queries: {}",
                    e
                )))
            }
            Ok(Ok(_)) => {}
        }

        Ok(Self { graph })
    }

    /// Execute a write statement that returns no results.
    pub async fn execute(&self, query: Query) -> EngineResult<()> {
        match timeout(QUERY_TIMEOUT, self.graph.run(query)).await {
            Err(_) => Err(EngineError::Timeout(QUERY_TIMEOUT)),
            Ok(Err(e)) => Err(EngineError::GraphWrite(e.to_string())),
            Ok(Ok(_)) => Ok(()),
        }
    }

    /// Execute a read statement and return its rows.
    pub async fn query(&self, query: Query) -> EngineResult<Vec<neo4rs::Row>> {
        let fetch = async {
            let mut result = self.graph.execute(query).await?;
            let mut rows = Vec::new();
            while let Some(row) = result.next().await? {
                rows.push(row);
            }
            Ok::<_, neo4rs::Error>(rows)
        };

        match timeout(QUERY_TIMEOUT, fetch).await {
            Err(_) => Err(EngineError::Timeout(QUERY_TIMEOUT)),
            Ok(Err(e)) => Err(EngineError::GraphRead(e.to_string())),
            Ok(Ok(rows)) => Ok(rows),
        }
    }

    /// Execute a read statement and return each row as a JSON object keyed
    /// by column name. Used where the statement (and thus its columns) is
    /// not known at compile time.
    pub async fn query_json(&self, query: Query) -> EngineResult<Vec<serde_json::Value>> {
        let rows = self.query(query).await?;
        rows.iter()
            .map(|row| {
                row.to::<serde_json::Value>()
                    .map_err(|e| EngineError::GraphRead(format!("row decode failed: {}", e)))
            })
            .collect()
    }

    /// Execute a read statement and return a single scalar value.
    pub async fn query_scalar<T: DeserializeOwned>(
        &self,
        query: Query,
        field: &str,
    ) -> EngineResult<Option<T>> {
        let rows = self.query(query).await?;
        if let Some(row) = rows.into_iter().next() {
            let val: T = row
                .get(field)
                .map_err(|e| EngineError::GraphRead(format!("failed to get field '{}': {:?}", field, e)))?;
            Ok(Some(val))
        } else {
            Ok(None)
        }
    }

    /// Get node and relationship counts for status display.
    pub async fn counts(&self) -> EngineResult<GraphCounts> {
        let node_query = Query::new("MATCH (n) RETURN count(n) as count".to_string());
        let rel_query = Query::new("MATCH ()-[r]->() RETURN count(r) as count".to_string());

        let nodes: i64 = self.query_scalar(node_query, "count").await?.unwrap_or(0);
        let relationships: i64 = self.query_scalar(rel_query, "count").await?.unwrap_or(0);

        Ok(GraphCounts {
            nodes: nodes as usize,
            relationships: relationships as usize,
        })
    }

    /// Get a reference to the underlying neo4rs Graph.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }
}

/// Node and relationship counts.
#[derive(Debug, Clone)]
pub struct GraphCounts {
    pub nodes: usize,
    pub relationships: usize,
}
