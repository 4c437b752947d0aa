//! Neo4j adapter for the [`sage::stores::GraphStore`] port.
//!
//! Nodes are MERGEd on their `node_id` property, which is unique within a
//! document, so re-ingesting upserts the same graph. Labels and relationship
//! types come from the closed [`sage::domain::NodeKind`] /
//! [`sage::domain::EdgeKind`] enums and are interpolated into Cypher; all
//! values travel as parameters.

use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{Graph, Query};
use tracing::info;

use sage::domain::{GraphEdge, GraphNode};
use sage::error::{Error, Result};
use sage::resilience::CircuitBreaker;
use sage::stores::{GraphStore, Hit};

/// Fixed relevance assigned to substring matches; the graph does not rank.
const CHUNK_MATCH_SCORE: f32 = 0.5;

/// Graph store adapter over a Neo4j database.
pub struct Neo4jGraphStore {
    graph: Graph,
    breaker: CircuitBreaker,
}

impl Neo4jGraphStore {
    /// Connect to Neo4j and verify connectivity.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| Error::unavailable(format!("failed to connect to neo4j at {uri}: {e}")))?;

        let store = Self {
            graph,
            breaker: CircuitBreaker::new("neo4j", 5, Duration::from_secs(30)),
        };
        store.ping().await?;
        store.ensure_constraints().await?;
        info!(uri, "connected to neo4j");
        Ok(store)
    }

    /// `node_id` is the upsert key; make it unique per label.
    async fn ensure_constraints(&self) -> Result<()> {
        for label in ["Document", "Chunk", "Tree", "Entity"] {
            let cypher = format!(
                "CREATE CONSTRAINT uniq_{lower}_node_id IF NOT EXISTS FOR (n:{label}) REQUIRE n.node_id IS UNIQUE",
                lower = label.to_lowercase()
            );
            self.graph
                .run(Query::new(cypher))
                .await
                .map_err(|e| Error::api(format!("failed to create constraint: {e}")))?;
        }
        Ok(())
    }

    async fn upsert_node(&self, doc_id: &str, node: &GraphNode) -> Result<()> {
        let mut cypher = format!(
            "MERGE (n:{} {{node_id: $id}}) SET n.doc_id = $doc_id, n.text = $text",
            node.kind.label()
        );
        if node.name.is_some() {
            cypher.push_str(", n.name = $name");
        }
        if node.level.is_some() {
            cypher.push_str(", n.level = $level");
        }
        if node.page_number.is_some() {
            cypher.push_str(", n.page_number = $page_number");
        }

        let mut query = Query::new(cypher)
            .param("id", node.id.as_str())
            .param("doc_id", doc_id)
            .param("text", node.text.as_str());
        if let Some(name) = &node.name {
            query = query.param("name", name.as_str());
        }
        if let Some(level) = node.level {
            query = query.param("level", i64::from(level));
        }
        if let Some(page_number) = node.page_number {
            query = query.param("page_number", i64::from(page_number));
        }

        self.graph
            .run(query)
            .await
            .map_err(|e| Error::api(format!("node upsert failed for {}: {e}", node.id)))
    }

    async fn upsert_edge(&self, edge: &GraphEdge) -> Result<()> {
        let cypher = format!(
            "MATCH (a {{node_id: $from}}), (b {{node_id: $to}})
             MERGE (a)-[r:{}]->(b)
             SET r.description = $description",
            edge.kind.label()
        );
        let query = Query::new(cypher)
            .param("from", edge.from.as_str())
            .param("to", edge.to.as_str())
            .param("description", edge.description.as_deref().unwrap_or(""));

        self.graph
            .run(query)
            .await
            .map_err(|e| Error::api(format!("edge upsert failed {} -> {}: {e}", edge.from, edge.to)))
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn insert_nodes_and_edges(
        &self,
        doc_id: &str,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
    ) -> Result<()> {
        if nodes.is_empty() && edges.is_empty() {
            return Ok(());
        }

        self.breaker
            .call(|| async {
                // Nodes first so every edge endpoint exists.
                for node in nodes {
                    self.upsert_node(doc_id, node).await?;
                }
                for edge in edges {
                    self.upsert_edge(edge).await?;
                }
                Ok(())
            })
            .await
            .map_err(|e| match e {
                Error::Unavailable(_) => e,
                other => Error::api(format!("neo4j insert failed for doc {doc_id}: {other}")),
            })?;

        info!(doc_id, nodes = nodes.len(), edges = edges.len(), "inserted graph elements");
        Ok(())
    }

    async fn search_chunks(&self, query: &str, limit: u64) -> Result<Vec<Hit>> {
        let cypher = format!(
            "MATCH (c:Chunk) WHERE c.text CONTAINS $query
             RETURN c.node_id AS id, c.text AS text
             LIMIT {limit}"
        );

        let mut rows = self
            .breaker
            .call(|| async {
                self.graph
                    .execute(Query::new(cypher).param("query", query))
                    .await
                    .map_err(|e| Error::api(format!("chunk search failed: {e}")))
            })
            .await?;

        let mut hits = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Error::api(format!("failed to read search row: {e}")))?
        {
            let id: String = row
                .get("id")
                .map_err(|e| Error::api(format!("failed to get id from row: {e}")))?;
            let text: String = row
                .get("text")
                .map_err(|e| Error::api(format!("failed to get text from row: {e}")))?;
            hits.push(Hit {
                id,
                content: text,
                score: CHUNK_MATCH_SCORE,
            });
        }
        Ok(hits)
    }

    async fn delete_document(&self, doc_id: &str) -> Result<()> {
        self.breaker
            .call(|| async {
                self.graph
                    .run(Query::new("MATCH (n {doc_id: $doc_id}) DETACH DELETE n".to_string())
                        .param("doc_id", doc_id))
                    .await
                    .map_err(|e| Error::api(format!("neo4j delete failed for doc {doc_id}: {e}")))
            })
            .await?;

        info!(doc_id, "deleted document nodes");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .map_err(|e| Error::unavailable(format!("neo4j unreachable: {e}")))
    }
}
