//! Domain entities shared by the ingestion and query engines.
//!
//! Identifiers are deterministic so that re-running an ingestion is
//! idempotent in both stores: chunk ids are `"{doc_id}-chunk-{index}"`, tree
//! nodes `"{doc_id}-tree-{key}"`, and entity nodes `"{doc_id}-ent-{name}"`.

use serde::{Deserialize, Serialize};

/// File metadata plus content hash. Created on the first upload of a unique
/// hash and never mutated afterwards except for metadata fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Surrogate id assigned by the saga store (0 until persisted).
    pub id: i64,
    /// Hex-encoded SHA-256 of the uploaded bytes. Unique.
    pub file_hash: String,
    pub title: String,
    pub author: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    /// Unix seconds.
    pub created_at: i64,
    pub updated_at: i64,
}

/// Lifecycle status of an ingestion saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SagaStatus {
    /// Stable integer code persisted in the saga store.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            SagaStatus::Pending => 0,
            SagaStatus::Processing => 1,
            SagaStatus::Completed => 2,
            SagaStatus::Failed => 3,
        }
    }

    /// Decode a persisted status code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(SagaStatus::Pending),
            1 => Some(SagaStatus::Processing),
            2 => Some(SagaStatus::Completed),
            3 => Some(SagaStatus::Failed),
            _ => None,
        }
    }

    /// Lowercase label used in API responses.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            SagaStatus::Pending => "pending",
            SagaStatus::Processing => "processing",
            SagaStatus::Completed => "completed",
            SagaStatus::Failed => "failed",
        }
    }
}

/// Named ingestion step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepName {
    Parsing,
    Chunking,
    Embedding,
    Indexing,
}

impl StepName {
    /// Stable integer code persisted in the saga store.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            StepName::Parsing => 0,
            StepName::Chunking => 1,
            StepName::Embedding => 2,
            StepName::Indexing => 3,
        }
    }

    /// Decode a persisted step code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(StepName::Parsing),
            1 => Some(StepName::Chunking),
            2 => Some(StepName::Embedding),
            3 => Some(StepName::Indexing),
            _ => None,
        }
    }

    /// Lowercase label used in API responses.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            StepName::Parsing => "parsing",
            StepName::Chunking => "chunking",
            StepName::Embedding => "embedding",
            StepName::Indexing => "indexing",
        }
    }
}

/// A single ingestion saga instance over a [`Document`].
///
/// Every successful status transition bumps `version`; updates are accepted
/// only when the caller's observed version matches the persisted one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSaga {
    pub id: i64,
    pub document_id: i64,
    pub status: SagaStatus,
    pub version: i64,
    pub current_step: StepName,
    pub error_message: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Per-step log row, upserted as the saga enters and leaves each step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaStep {
    pub id: i64,
    pub saga_id: i64,
    pub name: StepName,
    pub status: SagaStatus,
    pub metadata: String,
    pub error_log: String,
}

/// Structural classification of a parsed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Heading,
    Text,
    Table,
    Caption,
}

impl ChunkKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ChunkKind::Heading => "heading",
            ChunkKind::Text => "text",
            ChunkKind::Table => "table",
            ChunkKind::Caption => "caption",
        }
    }
}

/// Ordered structural unit produced by the external parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralChunk {
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    pub level: i32,
    pub content: String,
    #[serde(default)]
    pub page_number: i32,
}

/// A chunk with its dense vector attached, ready for the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPoint {
    /// `"{doc_id}-chunk-{index}"`.
    pub chunk_id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub page_number: i32,
    pub kind: ChunkKind,
}

impl ChunkPoint {
    /// Deterministic chunk id for position `index` within document `doc_id`.
    #[must_use]
    pub fn id_for(doc_id: &str, index: usize) -> String {
        format!("{doc_id}-chunk-{index}")
    }
}

/// Node kind in the labeled property graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Document,
    Chapter,
    Chunk,
    Tree,
    Entity,
}

impl NodeKind {
    /// Graph label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            NodeKind::Document => "Document",
            NodeKind::Chapter => "Chapter",
            NodeKind::Chunk => "Chunk",
            NodeKind::Tree => "Tree",
            NodeKind::Entity => "Entity",
        }
    }
}

/// Edge kind in the labeled property graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    HasChapter,
    HasChunk,
    NextChunk,
    MentionedIn,
    RelatedTo,
    GtLink,
}

impl EdgeKind {
    /// Relationship type as stored in the graph.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            EdgeKind::HasChapter => "HAS_CHAPTER",
            EdgeKind::HasChunk => "HAS_CHUNK",
            EdgeKind::NextChunk => "NEXT_CHUNK",
            EdgeKind::MentionedIn => "MENTIONED_IN",
            EdgeKind::RelatedTo => "RELATED_TO",
            EdgeKind::GtLink => "GT_LINK",
        }
    }
}

/// A node to upsert into the graph store. `id` doubles as the MERGE key, so
/// re-ingest upserts rather than duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub text: String,
    /// Entity display name, when the node is an entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Structural level, when the node came from a heading group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i32>,
}

/// A directed labeled edge between two graph nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Named concept extracted from a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

impl Entity {
    /// Deterministic entity node id within document `doc_id`.
    #[must_use]
    pub fn id_for(doc_id: &str, name: &str) -> String {
        format!("{doc_id}-ent-{name}")
    }
}

/// Directed relationship between two extracted entities, referenced by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub description: String,
}

/// Origin engine of a retrieval result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Vector,
    Graph,
    Tree,
}

impl EngineKind {
    /// Source tag used in events and in the fusion weight table.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            EngineKind::Vector => "vector",
            EngineKind::Graph => "graph",
            EngineKind::Tree => "tree",
        }
    }
}

/// A scored retrieval result from one of the engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub score: f32,
    pub source: EngineKind,
}

/// One entry of a remote catalog observed by the scout worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoutItem {
    /// Source-supplied stable id.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub download_url: String,
    /// Unix seconds the item was added to the catalog.
    pub added_at: i64,
    #[serde(default)]
    pub mime_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip() {
        for status in [
            SagaStatus::Pending,
            SagaStatus::Processing,
            SagaStatus::Completed,
            SagaStatus::Failed,
        ] {
            assert_eq!(SagaStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(SagaStatus::from_code(9), None);
    }

    #[test]
    fn test_step_codes_round_trip() {
        for step in [
            StepName::Parsing,
            StepName::Chunking,
            StepName::Embedding,
            StepName::Indexing,
        ] {
            assert_eq!(StepName::from_code(step.code()), Some(step));
        }
        assert_eq!(StepName::from_code(-1), None);
    }

    #[test]
    fn test_deterministic_ids() {
        assert_eq!(ChunkPoint::id_for("7", 0), "7-chunk-0");
        assert_eq!(Entity::id_for("7", "Ahab"), "7-ent-Ahab");
    }

    #[test]
    fn test_structural_chunk_deserializes_parser_payload() {
        let json = r#"{"type":"heading","level":1,"content":"Ch1","page_number":3}"#;
        let chunk: StructuralChunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.kind, ChunkKind::Heading);
        assert_eq!(chunk.level, 1);
        assert_eq!(chunk.page_number, 3);
    }

    #[test]
    fn test_edge_labels() {
        assert_eq!(EdgeKind::HasChunk.label(), "HAS_CHUNK");
        assert_eq!(EdgeKind::GtLink.label(), "GT_LINK");
        assert_eq!(EdgeKind::RelatedTo.label(), "RELATED_TO");
    }
}
