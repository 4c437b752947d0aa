//! End-to-end pipeline tests over the in-memory ports: ingest a document
//! through the saga engine, then answer a query against the ingested state.

use std::sync::Arc;

use sage::domain::{ChunkKind, ChunkPoint, Document, SagaStatus, StepName, StructuralChunk};
use sage::embedding::Batcher;
use sage::ingest::SagaOrchestrator;
use sage::llm::EmbeddingClient;
use sage::query::{answer_stream, AgenticGenerator, EventKind, FusionRetriever};
use sage::saga_store::{SagaStore, SqliteSagaStore};
use sage::stores::{GraphStore, Hit};
use sage::testing::{
    router_with_chats, FixedEmbed, MemoryGraphStore, MemoryVectorStore, ScriptedChat,
};

fn document(hash: &str) -> Document {
    Document {
        id: 0,
        file_hash: hash.to_string(),
        title: "Moby Dick".into(),
        author: "Herman Melville".into(),
        file_path: "moby.epub".into(),
        file_size: 4096,
        mime_type: "application/epub+zip".into(),
        created_at: 0,
        updated_at: 0,
    }
}

fn structural_chunks() -> Vec<StructuralChunk> {
    vec![
        StructuralChunk {
            kind: ChunkKind::Heading,
            level: 1,
            content: "Loomings".into(),
            page_number: 1,
        },
        StructuralChunk {
            kind: ChunkKind::Text,
            level: 0,
            content: "Call me Ishmael.".into(),
            page_number: 1,
        },
        StructuralChunk {
            kind: ChunkKind::Text,
            level: 0,
            content: "Ahab pursues the white whale.".into(),
            page_number: 2,
        },
    ]
}

async fn embed_chunks(doc_id: &str, chunks: &[StructuralChunk]) -> Vec<ChunkPoint> {
    let batcher = Batcher::new(Arc::new(FixedEmbed::dim(4)) as Arc<dyn EmbeddingClient>, 2);
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let (embedded, _) = batcher.generate(&texts, "dense", "retrieval").await.unwrap();
    embedded
        .into_iter()
        .zip(chunks)
        .enumerate()
        .map(|(i, (e, c))| ChunkPoint {
            chunk_id: ChunkPoint::id_for(doc_id, i),
            text: e.text,
            vector: e.vector,
            page_number: c.page_number,
            kind: c.kind,
        })
        .collect()
}

#[tokio::test]
async fn test_ingest_then_query_round_trip() {
    let vector = Arc::new(MemoryVectorStore::default());
    let graph = Arc::new(MemoryGraphStore::default());
    let store = Arc::new(SqliteSagaStore::in_memory().unwrap());
    let router = router_with_chats(
        ScriptedChat::always("Relevant"),
        ScriptedChat::always("Ishmael narrates the voyage."),
    );

    // Ingest.
    let orchestrator = SagaOrchestrator::new(
        Arc::clone(&vector) as _,
        Arc::clone(&graph) as _,
        Arc::clone(&store) as _,
        Arc::clone(&router),
    );
    let saga = orchestrator.start_or_resume(&document("feed1")).await.unwrap();
    let doc_id = saga.document_id.to_string();
    let chunks = structural_chunks();
    let points = embed_chunks(&doc_id, &chunks).await;
    orchestrator
        .run_ingestion_saga(&saga, "Moby Dick", &points, &chunks)
        .await
        .unwrap();

    let final_saga = store.get_saga(saga.id).await.unwrap().unwrap();
    assert_eq!(final_saga.status, SagaStatus::Completed);
    assert_eq!(final_saga.current_step, StepName::Indexing);
    assert!(final_saga.version >= 4);

    // Both stores carry the document, linkable by chunk id.
    assert_eq!(vector.point_count(&doc_id), 3);
    assert!(graph.has_document(&doc_id));
    let hits = graph.search_chunks("Ishmael", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, format!("{doc_id}-chunk-1"));

    // The step log records both steps as completed.
    let steps = store.list_saga_steps(saga.id).await.unwrap();
    let names: Vec<StepName> = steps.iter().map(|s| s.name).collect();
    assert!(names.contains(&StepName::Embedding));
    assert!(names.contains(&StepName::Indexing));
    assert!(steps.iter().all(|s| s.status == SagaStatus::Completed));

    // Query against the ingested state. The vector engine surfaces the
    // chunk the memory store is primed with; the graph engine substring-
    // matches the ingested chunks.
    vector.set_search_results(vec![Hit {
        id: format!("{doc_id}-chunk-2"),
        content: "Ahab pursues the white whale.".into(),
        score: 0.88,
    }]);

    let batcher = Arc::new(Batcher::new(
        Arc::new(FixedEmbed::dim(4)) as Arc<dyn EmbeddingClient>,
        8,
    ));
    let retriever = Arc::new(FusionRetriever::new(
        Arc::clone(&vector) as _,
        Arc::clone(&graph) as _,
        batcher,
        Arc::clone(&router),
    ));
    let generator = Arc::new(AgenticGenerator::new(router, retriever));

    let mut events = answer_stream(generator, "Ahab".to_string());
    let mut kinds = Vec::new();
    let mut answer = String::new();
    while let Some(event) = events.recv().await {
        if event.kind == EventKind::Answer {
            answer = event.content.clone();
        }
        kinds.push(event.kind);
    }

    assert_eq!(*kinds.last().unwrap(), EventKind::Answer);
    assert!(kinds.contains(&EventKind::Source));
    assert_eq!(answer, "Ishmael narrates the voyage.");
}

#[tokio::test]
async fn test_failed_indexing_leaves_no_vector_points() {
    let vector = Arc::new(MemoryVectorStore::default());
    let graph = Arc::new(MemoryGraphStore::default());
    graph.fail_insert(true);
    let store = Arc::new(SqliteSagaStore::in_memory().unwrap());
    let router = router_with_chats(
        ScriptedChat::always("Relevant"),
        ScriptedChat::always("summary"),
    );

    let orchestrator = SagaOrchestrator::new(
        Arc::clone(&vector) as _,
        Arc::clone(&graph) as _,
        Arc::clone(&store) as _,
        router,
    );
    let saga = orchestrator.start_or_resume(&document("feed2")).await.unwrap();
    let doc_id = saga.document_id.to_string();
    let chunks = structural_chunks();
    let points = embed_chunks(&doc_id, &chunks).await;

    let err = orchestrator
        .run_ingestion_saga(&saga, "Moby Dick", &points, &chunks)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("neo4j insertion failed"));

    // Compensation held: no points remain for the document, and the saga
    // records the failure at Indexing.
    assert_eq!(vector.point_count(&doc_id), 0);
    let failed = store.get_saga(saga.id).await.unwrap().unwrap();
    assert_eq!(failed.status, SagaStatus::Failed);
    assert_eq!(failed.current_step, StepName::Indexing);

    // A later retry can resume: the saga is returned, not refused.
    let resumed = orchestrator.start_or_resume(&document("feed2")).await.unwrap();
    assert_eq!(resumed.id, saga.id);
}
