//! Test doubles for the capability ports.
//!
//! Shared by the unit suites in this crate, the integration tests, and the
//! binaries' own test setups. Everything here is deterministic and
//! fault-injectable; nothing talks to a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::{ChunkPoint, GraphEdge, GraphNode, NodeKind};
use crate::error::{Error, Result};
use crate::llm::{ChatClient, EmbeddingClient, LlmRouter};
use crate::stores::{GraphStore, Hit, VectorStore};

/// Chat double that replays a scripted queue of responses, then repeats the
/// last one forever.
pub struct ScriptedChat {
    responses: Mutex<Vec<std::result::Result<String, String>>>,
    last: std::result::Result<String, String>,
    pub calls: AtomicUsize,
}

impl ScriptedChat {
    /// Always answer with `response`.
    #[must_use]
    pub fn always(response: &str) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            last: Ok(response.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fail with `message`.
    #[must_use]
    pub fn always_err(message: &str) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            last: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replay `responses` in order (`Err` entries become API errors), then
    /// repeat the final entry.
    #[must_use]
    pub fn sequence(responses: Vec<std::result::Result<String, String>>) -> Self {
        let last = responses
            .last()
            .cloned()
            .unwrap_or_else(|| Ok(String::new()));
        let mut queue = responses;
        queue.reverse();
        Self {
            responses: Mutex::new(queue),
            last,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `generate` calls observed.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .responses
            .lock()
            .expect("scripted chat lock")
            .pop()
            .unwrap_or_else(|| self.last.clone());
        next.map_err(Error::Api)
    }

    fn name(&self) -> &str {
        "scripted-chat"
    }
}

/// Embedder returning a fixed-dimension vector derived from text length,
/// so outputs are deterministic and order is observable.
pub struct FixedEmbed {
    dim: usize,
    fail: AtomicBool,
}

impl FixedEmbed {
    #[must_use]
    pub fn dim(dim: usize) -> Self {
        Self {
            dim,
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingClient for FixedEmbed {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::unavailable("embedder offline"));
        }
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0; self.dim];
                if let Some(first) = v.first_mut() {
                    *first = t.len() as f32;
                }
                v
            })
            .collect())
    }

    fn name(&self) -> &str {
        "fixed-embed"
    }
}

/// Build a router whose chat routes both resolve to `chat` and whose
/// embedder is a 4-dimension [`FixedEmbed`].
#[must_use]
pub fn router_with_chat(chat: ScriptedChat) -> Arc<LlmRouter> {
    let chat = Arc::new(chat);
    Arc::new(LlmRouter::new(
        Arc::clone(&chat) as Arc<dyn ChatClient>,
        chat,
        Arc::new(FixedEmbed::dim(4)),
    ))
}

/// Build a router with distinct light and heavy chat doubles.
#[must_use]
pub fn router_with_chats(light: ScriptedChat, heavy: ScriptedChat) -> Arc<LlmRouter> {
    Arc::new(LlmRouter::new(
        Arc::new(light),
        Arc::new(heavy),
        Arc::new(FixedEmbed::dim(4)),
    ))
}

/// In-memory vector store with fault injection.
#[derive(Default)]
pub struct MemoryVectorStore {
    points: Mutex<HashMap<String, Vec<ChunkPoint>>>,
    search_results: Mutex<Vec<Hit>>,
    fail_insert: AtomicBool,
    fail_search: AtomicBool,
    deletes: AtomicUsize,
}

impl MemoryVectorStore {
    pub fn fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    /// Fix the hits returned by [`VectorStore::search`].
    pub fn set_search_results(&self, hits: Vec<Hit>) {
        *self.search_results.lock().expect("vector lock") = hits;
    }

    /// Stored point count for a document.
    #[must_use]
    pub fn point_count(&self, doc_id: &str) -> usize {
        self.points
            .lock()
            .expect("vector lock")
            .get(doc_id)
            .map_or(0, Vec::len)
    }

    /// Number of `delete_document` calls observed.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn insert_chunks(&self, doc_id: &str, chunks: &[ChunkPoint]) -> Result<()> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(Error::api("vector backend offline"));
        }
        let mut points = self.points.lock().expect("vector lock");
        let entry = points.entry(doc_id.to_string()).or_default();
        for chunk in chunks {
            entry.retain(|existing| existing.chunk_id != chunk.chunk_id);
            entry.push(chunk.clone());
        }
        Ok(())
    }

    async fn search(&self, _vector: &[f32], limit: u64) -> Result<Vec<Hit>> {
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(Error::api("vector backend offline"));
        }
        let hits = self.search_results.lock().expect("vector lock").clone();
        Ok(hits.into_iter().take(limit as usize).collect())
    }

    async fn delete_document(&self, doc_id: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.points.lock().expect("vector lock").remove(doc_id);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory graph store with fault injection. Chunk text is substring-
/// searchable, mirroring the real adapter's contract.
#[derive(Default)]
pub struct MemoryGraphStore {
    nodes: Mutex<HashMap<String, Vec<GraphNode>>>,
    edges: Mutex<HashMap<String, Vec<GraphEdge>>>,
    fail_insert: AtomicBool,
    fail_search: AtomicBool,
}

impl MemoryGraphStore {
    pub fn fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    /// Whether a Document root node exists for `doc_id`.
    #[must_use]
    pub fn has_document(&self, doc_id: &str) -> bool {
        self.nodes
            .lock()
            .expect("graph lock")
            .get(doc_id)
            .is_some_and(|nodes| {
                nodes
                    .iter()
                    .any(|n| n.kind == NodeKind::Document && n.id == doc_id)
            })
    }

    /// Number of Chunk nodes stored for `doc_id`.
    #[must_use]
    pub fn chunk_count(&self, doc_id: &str) -> usize {
        self.nodes
            .lock()
            .expect("graph lock")
            .get(doc_id)
            .map_or(0, |nodes| {
                nodes.iter().filter(|n| n.kind == NodeKind::Chunk).count()
            })
    }

    /// Full (nodes, edges) snapshot for equality assertions.
    #[must_use]
    pub fn snapshot(&self, doc_id: &str) -> (Vec<GraphNode>, Vec<GraphEdge>) {
        let nodes = self
            .nodes
            .lock()
            .expect("graph lock")
            .get(doc_id)
            .cloned()
            .unwrap_or_default();
        let edges = self
            .edges
            .lock()
            .expect("graph lock")
            .get(doc_id)
            .cloned()
            .unwrap_or_default();
        (nodes, edges)
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn insert_nodes_and_edges(
        &self,
        doc_id: &str,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
    ) -> Result<()> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(Error::api("graph backend offline"));
        }
        let mut stored_nodes = self.nodes.lock().expect("graph lock");
        let entry = stored_nodes.entry(doc_id.to_string()).or_default();
        for node in nodes {
            entry.retain(|existing| existing.id != node.id);
            entry.push(node.clone());
        }
        let mut stored_edges = self.edges.lock().expect("graph lock");
        let entry = stored_edges.entry(doc_id.to_string()).or_default();
        for edge in edges {
            entry.retain(|existing| {
                !(existing.from == edge.from && existing.to == edge.to && existing.kind == edge.kind)
            });
            entry.push(edge.clone());
        }
        Ok(())
    }

    async fn search_chunks(&self, query: &str, limit: u64) -> Result<Vec<Hit>> {
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(Error::api("graph backend offline"));
        }
        let nodes = self.nodes.lock().expect("graph lock");
        let mut hits = Vec::new();
        for doc_nodes in nodes.values() {
            for node in doc_nodes {
                if node.kind == NodeKind::Chunk && node.text.contains(query) {
                    hits.push(Hit {
                        id: node.id.clone(),
                        content: node.text.clone(),
                        score: 0.5,
                    });
                    if hits.len() as u64 >= limit {
                        return Ok(hits);
                    }
                }
            }
        }
        Ok(hits)
    }

    async fn delete_document(&self, doc_id: &str) -> Result<()> {
        self.nodes.lock().expect("graph lock").remove(doc_id);
        self.edges.lock().expect("graph lock").remove(doc_id);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
