//! The ingestion saga orchestrator.
//!
//! Drives a document through the dual-store pipeline with compensating
//! actions: vector upsert first, then the graph payload. A graph failure
//! rolls the vector effects back by filtered delete; a failed rollback is
//! reported as needing manual repair and logged at critical level. Every
//! status transition is version-checked, which serializes executors per saga
//! and makes crash-resume safe.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::extractor::GraphExtractor;
use super::graph_builder::GraphBuilder;
use super::raptor::RaptorBuilder;
use super::resolver::EntityResolver;
use crate::domain::{
    ChunkPoint, Document, Entity, IngestSaga, Relation, SagaStatus, SagaStep, StepName,
    StructuralChunk,
};
use crate::error::{Error, Result};
use crate::llm::LlmRouter;
use crate::saga_store::SagaStore;
use crate::stores::{GraphStore, VectorStore};

/// Coordinates ingestion across the saga store, vector store, and graph
/// store.
pub struct SagaOrchestrator {
    vector_store: Arc<dyn VectorStore>,
    graph_store: Arc<dyn GraphStore>,
    store: Arc<dyn SagaStore>,
    raptor: RaptorBuilder,
    extractor: GraphExtractor,
    resolver: EntityResolver,
}

impl SagaOrchestrator {
    /// Wire up the orchestrator. The embedder is optional; without it entity
    /// resolution is a no-op.
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        graph_store: Arc<dyn GraphStore>,
        store: Arc<dyn SagaStore>,
        router: Arc<LlmRouter>,
    ) -> Self {
        let resolver = EntityResolver::new(Arc::clone(&vector_store), Some(router.embedder()));
        Self {
            vector_store,
            graph_store,
            store,
            raptor: RaptorBuilder::new(Arc::clone(&router)),
            extractor: GraphExtractor::new(router),
            resolver,
        }
    }

    /// Prepare or resume an ingestion saga for `doc`.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyIngested`] when the document's latest saga is already
    /// `Completed`.
    pub async fn start_or_resume(&self, doc: &Document) -> Result<IngestSaga> {
        let document_id = match self.store.get_document_by_hash(&doc.file_hash).await? {
            Some(existing) => {
                if let Some(saga) = self.store.latest_saga_for_document(existing.id).await? {
                    if saga.status == SagaStatus::Completed {
                        return Err(Error::AlreadyIngested {
                            hash: existing.file_hash,
                        });
                    }
                    info!(saga_id = saga.id, document_id = existing.id, "resuming ingestion saga");
                    return Ok(saga);
                }
                // Document exists but has no saga yet.
                existing.id
            }
            None => self.store.create_document(doc).await?,
        };

        let mut saga = IngestSaga {
            id: 0,
            document_id,
            status: SagaStatus::Pending,
            version: 1,
            current_step: StepName::Parsing,
            error_message: String::new(),
            created_at: 0,
            updated_at: 0,
        };
        saga.id = self.store.create_saga(&saga).await?;
        info!(saga_id = saga.id, document_id, "created ingestion saga");
        Ok(saga)
    }

    /// Execute the dual-store ingestion for `saga`.
    ///
    /// `points` are the embedded chunks bound for the vector store; `chunks`
    /// are the same units in structural form, used for tree construction and
    /// extraction. On a graph failure the vector effects are compensated
    /// before the saga is marked failed.
    ///
    /// # Errors
    ///
    /// [`Error::ConcurrentUpdate`] when another executor holds the saga;
    /// [`Error::VectorInsertionFailed`] / [`Error::GraphInsertionFailed`] on
    /// terminal step failures.
    pub async fn run_ingestion_saga(
        &self,
        saga: &IngestSaga,
        doc_title: &str,
        points: &[ChunkPoint],
        chunks: &[StructuralChunk],
    ) -> Result<()> {
        info!(saga_id = saga.id, "starting ingestion saga");
        let doc_id = saga.document_id.to_string();

        // Claim the saga. A stale version here means another executor won.
        self.store
            .update_saga_status(
                saga.id,
                saga.version,
                SagaStatus::Processing,
                StepName::Embedding,
                "",
            )
            .await?;
        let mut version = saga.version + 1;

        // Step: Embedding, the vector store upsert.
        let mut step = SagaStep {
            id: 0,
            saga_id: saga.id,
            name: StepName::Embedding,
            status: SagaStatus::Processing,
            metadata: String::new(),
            error_log: String::new(),
        };
        step.id = self.store.upsert_saga_step(&step).await?;

        info!(saga_id = saga.id, count = points.len(), "inserting chunks into vector store");
        if let Err(err) = self.vector_store.insert_chunks(&doc_id, points).await {
            let err = Error::VectorInsertionFailed(err.to_string());
            self.fail_step(saga.id, version, &mut step, StepName::Embedding, &err)
                .await;
            return Err(err);
        }
        step.status = SagaStatus::Completed;
        self.log_step_result(&step).await;

        // Advance to Indexing.
        self.store
            .update_saga_status(
                saga.id,
                version,
                SagaStatus::Processing,
                StepName::Indexing,
                "",
            )
            .await?;
        version += 1;

        // Step: Indexing, the tree build plus extraction and graph payload.
        let mut step = SagaStep {
            id: 0,
            saga_id: saga.id,
            name: StepName::Indexing,
            status: SagaStatus::Processing,
            metadata: String::new(),
            error_log: String::new(),
        };
        step.id = self.store.upsert_saga_step(&step).await?;

        let tree_nodes = self.raptor.build_tree(&doc_id, chunks).await;

        let (entities, relations) = self.extract_all(chunks).await;
        for entity in &entities {
            // Resolution is informational in this release: matches are
            // logged, the new entity id is still used.
            let _ = self.resolver.resolve(entity).await;
        }

        let (nodes, edges) =
            GraphBuilder::build(&doc_id, doc_title, points, tree_nodes, &entities, &relations);

        info!(saga_id = saga.id, nodes = nodes.len(), edges = edges.len(), "inserting graph payload");
        if let Err(err) = self
            .graph_store
            .insert_nodes_and_edges(&doc_id, &nodes, &edges)
            .await
        {
            warn!(saga_id = saga.id, error = %err, "graph insertion failed, compensating vector store");
            let err = Error::GraphInsertionFailed(err.to_string());
            self.compensate_vectors(saga.id, &doc_id).await;
            self.fail_step(saga.id, version, &mut step, StepName::Indexing, &err)
                .await;
            return Err(err);
        }
        step.status = SagaStatus::Completed;
        self.log_step_result(&step).await;

        self.store
            .update_saga_status(
                saga.id,
                version,
                SagaStatus::Completed,
                StepName::Indexing,
                "",
            )
            .await?;

        info!(saga_id = saga.id, "ingestion saga completed");
        Ok(())
    }

    /// Latest saga for the document with `hash`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no document or saga exists for the hash.
    pub async fn get_document_status(&self, hash: &str) -> Result<IngestSaga> {
        let doc = self
            .store
            .get_document_by_hash(hash)
            .await?
            .ok_or_else(|| Error::not_found(format!("document {hash}")))?;
        self.store
            .latest_saga_for_document(doc.id)
            .await?
            .ok_or_else(|| Error::not_found(format!("saga for document {}", doc.id)))
    }

    /// Latest saga for a document by surrogate id.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no document or saga exists for the id.
    pub async fn get_document_saga(&self, document_id: i64) -> Result<IngestSaga> {
        self.store
            .get_document(document_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("document {document_id}")))?;
        self.store
            .latest_saga_for_document(document_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("saga for document {document_id}")))
    }

    /// Whether a document row exists for `document_id`.
    pub async fn document_exists(&self, document_id: i64) -> Result<bool> {
        Ok(self.store.get_document(document_id).await?.is_some())
    }

    async fn extract_all(&self, chunks: &[StructuralChunk]) -> (Vec<Entity>, Vec<Relation>) {
        let mut entities = Vec::new();
        let mut relations = Vec::new();
        for chunk in chunks {
            match self.extractor.extract(&chunk.content).await {
                Ok((mut chunk_entities, mut chunk_relations)) => {
                    entities.append(&mut chunk_entities);
                    relations.append(&mut chunk_relations);
                }
                Err(err) => {
                    warn!(error = %err, "extraction failed for chunk, skipping");
                }
            }
        }
        (entities, relations)
    }

    async fn compensate_vectors(&self, saga_id: i64, doc_id: &str) {
        if let Err(comp_err) = self.vector_store.delete_document(doc_id).await {
            // The partial vector state needs manual repair.
            error!(
                saga_id,
                doc_id,
                error = %comp_err,
                critical = true,
                "compensation failed, vector points need manual repair"
            );
        }
    }

    async fn fail_step(
        &self,
        saga_id: i64,
        version: i64,
        step: &mut SagaStep,
        name: StepName,
        err: &Error,
    ) {
        if let Err(status_err) = self
            .store
            .update_saga_status(saga_id, version, SagaStatus::Failed, name, &err.to_string())
            .await
        {
            warn!(saga_id, error = %status_err, "failed to record saga failure");
        }
        step.status = SagaStatus::Failed;
        step.error_log = err.to_string();
        self.log_step_result(step).await;
    }

    async fn log_step_result(&self, step: &SagaStep) {
        if let Err(err) = self.store.upsert_saga_step(step).await {
            warn!(saga_id = step.saga_id, error = %err, "failed to upsert saga step");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChunkKind;
    use crate::saga_store::SqliteSagaStore;
    use crate::testing::{
        router_with_chat, MemoryGraphStore, MemoryVectorStore, ScriptedChat,
    };

    fn doc(hash: &str) -> Document {
        Document {
            id: 0,
            file_hash: hash.to_string(),
            title: "T".into(),
            author: "A".into(),
            file_path: "t.epub".into(),
            file_size: 4096,
            mime_type: "application/epub+zip".into(),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn chunks() -> Vec<StructuralChunk> {
        vec![
            StructuralChunk {
                kind: ChunkKind::Heading,
                level: 1,
                content: "Ch1".into(),
                page_number: 1,
            },
            StructuralChunk {
                kind: ChunkKind::Text,
                level: 0,
                content: "Para A".into(),
                page_number: 1,
            },
            StructuralChunk {
                kind: ChunkKind::Text,
                level: 0,
                content: "Para B".into(),
                page_number: 2,
            },
        ]
    }

    fn points(doc_id: &str) -> Vec<ChunkPoint> {
        chunks()
            .iter()
            .enumerate()
            .map(|(i, c)| ChunkPoint {
                chunk_id: ChunkPoint::id_for(doc_id, i),
                text: c.content.clone(),
                vector: vec![0.1; 4],
                page_number: c.page_number,
                kind: c.kind,
            })
            .collect()
    }

    struct Fixture {
        orchestrator: SagaOrchestrator,
        vector: Arc<MemoryVectorStore>,
        graph: Arc<MemoryGraphStore>,
        store: Arc<SqliteSagaStore>,
    }

    fn fixture() -> Fixture {
        let vector = Arc::new(MemoryVectorStore::default());
        let graph = Arc::new(MemoryGraphStore::default());
        let store = Arc::new(SqliteSagaStore::in_memory().unwrap());
        // Extraction responses are not valid JSON, so extraction degrades to
        // empty, which keeps these tests about saga mechanics.
        let router = router_with_chat(ScriptedChat::always("summary"));
        let orchestrator = SagaOrchestrator::new(
            Arc::clone(&vector) as _,
            Arc::clone(&graph) as _,
            Arc::clone(&store) as _,
            router,
        );
        Fixture {
            orchestrator,
            vector,
            graph,
            store,
        }
    }

    #[tokio::test]
    async fn test_happy_path_completes_with_version_4() {
        let f = fixture();
        let saga = f.orchestrator.start_or_resume(&doc("h1")).await.unwrap();
        let doc_id = saga.document_id.to_string();

        f.orchestrator
            .run_ingestion_saga(&saga, "T", &points(&doc_id), &chunks())
            .await
            .unwrap();

        let final_saga = f.store.get_saga(saga.id).await.unwrap().unwrap();
        assert_eq!(final_saga.status, SagaStatus::Completed);
        assert_eq!(final_saga.current_step, StepName::Indexing);
        assert!(final_saga.version >= 4);

        assert_eq!(f.vector.point_count(&doc_id), 3);
        assert!(f.graph.has_document(&doc_id));
        assert_eq!(f.graph.chunk_count(&doc_id), 3);
    }

    #[tokio::test]
    async fn test_duplicate_ingest_is_refused() {
        let f = fixture();
        let saga = f.orchestrator.start_or_resume(&doc("h2")).await.unwrap();
        let doc_id = saga.document_id.to_string();
        f.orchestrator
            .run_ingestion_saga(&saga, "T", &points(&doc_id), &chunks())
            .await
            .unwrap();

        let err = f.orchestrator.start_or_resume(&doc("h2")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyIngested { .. }));
    }

    #[tokio::test]
    async fn test_incomplete_saga_is_resumed() {
        let f = fixture();
        let first = f.orchestrator.start_or_resume(&doc("h3")).await.unwrap();
        let second = f.orchestrator.start_or_resume(&doc("h3")).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_vector_failure_fails_at_embedding_without_compensation() {
        let f = fixture();
        f.vector.fail_insert(true);
        let saga = f.orchestrator.start_or_resume(&doc("h4")).await.unwrap();
        let doc_id = saga.document_id.to_string();

        let err = f
            .orchestrator
            .run_ingestion_saga(&saga, "T", &points(&doc_id), &chunks())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VectorInsertionFailed(_)));

        let final_saga = f.store.get_saga(saga.id).await.unwrap().unwrap();
        assert_eq!(final_saga.status, SagaStatus::Failed);
        assert_eq!(final_saga.current_step, StepName::Embedding);
        // No delete was issued: nothing was committed before this step.
        assert_eq!(f.vector.delete_count(), 0);
    }

    #[tokio::test]
    async fn test_graph_failure_compensates_vector_store() {
        let f = fixture();
        f.graph.fail_insert(true);
        let saga = f.orchestrator.start_or_resume(&doc("h5")).await.unwrap();
        let doc_id = saga.document_id.to_string();

        let err = f
            .orchestrator
            .run_ingestion_saga(&saga, "T", &points(&doc_id), &chunks())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GraphInsertionFailed(_)));
        assert!(err.to_string().contains("neo4j insertion failed"));

        let final_saga = f.store.get_saga(saga.id).await.unwrap().unwrap();
        assert_eq!(final_saga.status, SagaStatus::Failed);
        assert_eq!(final_saga.current_step, StepName::Indexing);
        assert!(final_saga.error_message.contains("neo4j insertion failed"));

        // Compensation removed every point for this document.
        assert_eq!(f.vector.point_count(&doc_id), 0);
    }

    #[tokio::test]
    async fn test_stale_version_aborts_run() {
        let f = fixture();
        let saga = f.orchestrator.start_or_resume(&doc("h6")).await.unwrap();
        let doc_id = saga.document_id.to_string();

        // Another executor advances the saga first.
        f.store
            .update_saga_status(saga.id, saga.version, SagaStatus::Processing, StepName::Embedding, "")
            .await
            .unwrap();

        let err = f
            .orchestrator
            .run_ingestion_saga(&saga, "T", &points(&doc_id), &chunks())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConcurrentUpdate { .. }));
        // The loser made no store writes.
        assert_eq!(f.vector.point_count(&doc_id), 0);
    }

    #[tokio::test]
    async fn test_rerun_after_completion_leaves_stores_identical() {
        let f = fixture();
        let saga = f.orchestrator.start_or_resume(&doc("h7")).await.unwrap();
        let doc_id = saga.document_id.to_string();
        f.orchestrator
            .run_ingestion_saga(&saga, "T", &points(&doc_id), &chunks())
            .await
            .unwrap();

        let snapshot = f.graph.snapshot(&doc_id);

        // Run the saga body again with the same inputs, as a crashed-and-
        // resumed executor would. Deterministic ids mean both stores land in
        // the same state.
        let current = f.store.get_saga(saga.id).await.unwrap().unwrap();
        f.orchestrator
            .run_ingestion_saga(&current, "T", &points(&doc_id), &chunks())
            .await
            .unwrap();

        assert_eq!(f.vector.point_count(&doc_id), 3);
        assert_eq!(f.graph.snapshot(&doc_id), snapshot);
    }

    #[tokio::test]
    async fn test_get_document_status() {
        let f = fixture();
        let saga = f.orchestrator.start_or_resume(&doc("h8")).await.unwrap();

        let status = f.orchestrator.get_document_status("h8").await.unwrap();
        assert_eq!(status.id, saga.id);

        let err = f.orchestrator.get_document_status("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
