//! Capability ports over the external vector and graph stores.
//!
//! Adapters implement these narrow interfaces; the engines never see a
//! concrete client. Concurrent writes to distinct `doc_id`s are safe; the
//! saga version check guarantees at most one executor per saga, so same-doc
//! writes are never concurrent.

use async_trait::async_trait;

use crate::domain::{ChunkPoint, GraphEdge, GraphNode};
use crate::error::Result;

/// A raw scored hit from a store, before the fusion layer tags its source.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub content: String,
    pub score: f32,
}

/// Dense-vector collection with payload-filtered delete and kNN search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert all chunk points for `doc_id`. Every point carries `doc_id`
    /// in its payload so the whole document can be deleted by filter.
    async fn insert_chunks(&self, doc_id: &str, chunks: &[ChunkPoint]) -> Result<()>;

    /// kNN search over the collection.
    async fn search(&self, vector: &[f32], limit: u64) -> Result<Vec<Hit>>;

    /// Filter-delete every point whose payload `doc_id` matches.
    async fn delete_document(&self, doc_id: &str) -> Result<()>;

    /// Cheap reachability probe for readiness checks.
    async fn ping(&self) -> Result<()>;
}

/// Labeled property graph with substring search over Chunk text.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Idempotently upsert the document's nodes and edges. Node ids are the
    /// MERGE keys, so re-running the same ingestion is a no-op.
    async fn insert_nodes_and_edges(
        &self,
        doc_id: &str,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
    ) -> Result<()>;

    /// Substring-match Chunk text. Hits carry a fixed score, the graph does
    /// not rank.
    async fn search_chunks(&self, query: &str, limit: u64) -> Result<Vec<Hit>>;

    /// Detach-delete every node belonging to `doc_id`.
    async fn delete_document(&self, doc_id: &str) -> Result<()>;

    /// Cheap reachability probe for readiness checks.
    async fn ping(&self) -> Result<()>;
}
