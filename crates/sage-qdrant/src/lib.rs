//! Qdrant adapter for the [`sage::stores::VectorStore`] port.
//!
//! The collection uses cosine distance at 768 dimensions by default and
//! carries a keyword payload index on `doc_id` so whole documents can be
//! deleted by filter. Point ids are deterministic: the first 8 bytes of
//! SHA-256 of the chunk id, big-endian, so re-ingesting a document upserts
//! the same points.

use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, Condition, CreateCollectionBuilder,
    CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance, FieldType, Filter,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use sha2::{Digest, Sha256};
use tracing::info;

use sage::domain::ChunkPoint;
use sage::error::{Error, Result};
use sage::resilience::CircuitBreaker;
use sage::stores::{Hit, VectorStore};

/// Default vector dimension, matching common embedding models.
pub const DEFAULT_DIMENSION: u64 = 768;

/// Configuration for [`QdrantVectorStore`].
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub host: String,
    pub port: u16,
    pub collection: String,
    /// Vector dimension used when the collection has to be created.
    pub dimension: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6334,
            collection: "sage_chunks".to_string(),
            dimension: DEFAULT_DIMENSION,
        }
    }
}

/// Vector store adapter over a Qdrant collection.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    breaker: CircuitBreaker,
}

impl QdrantVectorStore {
    /// Connect to Qdrant and ensure the collection (and its `doc_id`
    /// payload index) exists.
    pub async fn connect(config: QdrantConfig) -> Result<Self> {
        let url = format!("http://{}:{}", config.host, config.port);
        let client = Qdrant::from_url(&url)
            .build()
            .map_err(|e| Error::unavailable(format!("failed to connect to qdrant at {url}: {e}")))?;

        let store = Self {
            client,
            collection: config.collection.clone(),
            breaker: CircuitBreaker::new("qdrant", 5, Duration::from_secs(30)),
        };
        store.ensure_collection(config.dimension).await?;
        info!(url, collection = %config.collection, "connected to qdrant");
        Ok(store)
    }

    async fn ensure_collection(&self, dimension: u64) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| Error::unavailable(format!("collection check failed: {e}")))?;
        if exists {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimension, Distance::Cosine)),
            )
            .await
            .map_err(|e| Error::api(format!("failed to create collection: {e}")))?;

        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                &self.collection,
                "doc_id",
                FieldType::Keyword,
            ))
            .await
            .map_err(|e| Error::api(format!("failed to create doc_id index: {e}")))?;

        info!(collection = %self.collection, dimension, "created qdrant collection");
        Ok(())
    }
}

/// Deterministic u64 point id from the first 8 bytes of SHA-256 of the
/// chunk id.
#[must_use]
pub fn deterministic_point_id(chunk_id: &str) -> u64 {
    let digest = Sha256::digest(chunk_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn chunk_payload_json(doc_id: &str, chunk: &ChunkPoint) -> serde_json::Value {
    serde_json::json!({
        "doc_id": doc_id,
        "chunk_id": chunk.chunk_id,
        "text": chunk.text,
        "page_number": chunk.page_number,
        "type": chunk.kind.label(),
    })
}

fn chunk_payload(doc_id: &str, chunk: &ChunkPoint) -> Result<Payload> {
    Payload::try_from(chunk_payload_json(doc_id, chunk))
        .map_err(|e| Error::api(format!("failed to build qdrant payload: {e}")))
}

fn payload_str(point: &qdrant_client::qdrant::ScoredPoint, key: &str) -> Option<String> {
    point.payload.get(key).and_then(|value| match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    })
}

fn point_id_string(point: &qdrant_client::qdrant::ScoredPoint) -> String {
    match point.id.as_ref().and_then(|id| id.point_id_options.as_ref()) {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(u)) => u.clone(),
        None => String::new(),
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn insert_chunks(&self, doc_id: &str, chunks: &[ChunkPoint]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut points = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            points.push(PointStruct::new(
                deterministic_point_id(&chunk.chunk_id),
                chunk.vector.clone(),
                chunk_payload(doc_id, chunk)?,
            ));
        }

        let count = points.len();
        self.breaker
            .call(|| async {
                self.client
                    .upsert_points(UpsertPointsBuilder::new(&self.collection, points))
                    .await
                    .map_err(|e| Error::api(format!("qdrant upsert failed: {e}")))
            })
            .await?;

        info!(doc_id, count, "upserted points");
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: u64) -> Result<Vec<Hit>> {
        let response = self
            .breaker
            .call(|| async {
                self.client
                    .search_points(
                        SearchPointsBuilder::new(&self.collection, vector.to_vec(), limit)
                            .with_payload(true),
                    )
                    .await
                    .map_err(|e| Error::api(format!("qdrant search failed: {e}")))
            })
            .await?;

        Ok(response
            .result
            .into_iter()
            .map(|point| Hit {
                id: payload_str(&point, "chunk_id").unwrap_or_else(|| point_id_string(&point)),
                content: payload_str(&point, "text").unwrap_or_default(),
                score: point.score,
            })
            .collect())
    }

    async fn delete_document(&self, doc_id: &str) -> Result<()> {
        self.breaker
            .call(|| async {
                self.client
                    .delete_points(
                        DeletePointsBuilder::new(&self.collection)
                            .points(Filter::must([Condition::matches(
                                "doc_id",
                                doc_id.to_string(),
                            )]))
                            .wait(true),
                    )
                    .await
                    .map_err(|e| Error::api(format!("qdrant delete failed: {e}")))
            })
            .await?;

        info!(doc_id, "deleted document points");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .health_check()
            .await
            .map(|_| ())
            .map_err(|e| Error::unavailable(format!("qdrant unreachable: {e}")))
    }
}
