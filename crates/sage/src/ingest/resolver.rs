//! Entity resolution against previously ingested vectors.
//!
//! Each extracted entity name is embedded and matched against the nearest
//! existing vector. A match above the similarity threshold is logged; the
//! new entity id is still used, so resolution is informational in this
//! release. Missing embedder and upstream errors are both non-fatal.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::Entity;
use crate::llm::EmbeddingClient;
use crate::stores::VectorStore;

/// Similarity above which two entity names are considered the same concept.
const MATCH_THRESHOLD: f32 = 0.9;

/// Resolves extracted entities against the vector store.
pub struct EntityResolver {
    vector_store: Arc<dyn VectorStore>,
    embedder: Option<Arc<dyn EmbeddingClient>>,
}

impl EntityResolver {
    #[must_use]
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedder: Option<Arc<dyn EmbeddingClient>>,
    ) -> Self {
        Self {
            vector_store,
            embedder,
        }
    }

    /// Find an existing vector whose similarity to `entity.name` exceeds the
    /// threshold. Returns the matched id and score, or `None` when there is
    /// no embedder, no match, or any upstream error.
    pub async fn resolve(&self, entity: &Entity) -> Option<(String, f32)> {
        let embedder = self.embedder.as_ref()?;

        let vectors = match embedder.embed(&[entity.name.clone()]).await {
            Ok(vectors) => vectors,
            Err(err) => {
                debug!(entity = %entity.name, error = %err, "entity embedding failed, skipping resolution");
                return None;
            }
        };
        let vector = vectors.first()?;

        let hits = match self.vector_store.search(vector, 1).await {
            Ok(hits) => hits,
            Err(err) => {
                debug!(entity = %entity.name, error = %err, "entity lookup failed, skipping resolution");
                return None;
            }
        };

        let top = hits.first()?;
        if top.score > MATCH_THRESHOLD {
            info!(entity = %entity.name, matched = %top.id, score = top.score, "entity resolved to existing vector");
            Some((top.id.clone(), top.score))
        } else {
            None
        }
    }
}
