//! Concurrent multi-store retrieval with intent-weighted rank fusion.
//!
//! The vector, graph, and tree engines are dispatched in parallel under one
//! global deadline; any engine failure or timeout degrades to an empty
//! result set. Per-engine rankings are combined with weighted Reciprocal
//! Rank Fusion (k = 60), deduplicated by exact content, then pruned to the
//! Pareto skyline.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::intent::{IntentClassifier, QueryIntent, RouteOperator};
use super::keys::{DualKeyExtractor, SearchKeys};
use super::skyline::SkylineRanker;
use crate::domain::{EngineKind, SearchResult};
use crate::embedding::Batcher;
use crate::error::{Error, Result};
use crate::llm::LlmRouter;
use crate::stores::{GraphStore, VectorStore};

/// RRF constant from the original paper.
const RRF_K: f64 = 60.0;

/// Results fetched per engine.
const ENGINE_LIMIT: u64 = 5;

/// Fan-out retriever over the enabled engines.
pub struct FusionRetriever {
    vector_store: Arc<dyn VectorStore>,
    graph_store: Arc<dyn GraphStore>,
    batcher: Arc<Batcher>,
    extractor: DualKeyExtractor,
    deadline: Duration,
}

impl FusionRetriever {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        graph_store: Arc<dyn GraphStore>,
        batcher: Arc<Batcher>,
        router: Arc<LlmRouter>,
    ) -> Self {
        Self {
            vector_store,
            graph_store,
            batcher,
            extractor: DualKeyExtractor::new(router),
            deadline: Duration::from_secs(5),
        }
    }

    /// Override the global retrieval deadline (default 5 s).
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Classify the intent of `query` (exposed for event reporting).
    #[must_use]
    pub fn classify_intent(&self, query: &str) -> QueryIntent {
        IntentClassifier::classify(query)
    }

    /// Run the full retrieval pipeline for `query`.
    ///
    /// # Errors
    ///
    /// Only on empty input; engine failures degrade to empty result sets.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(Error::invalid_input("query must not be empty"));
        }

        let intent = IntentClassifier::classify(query);
        let keys = self.extractor.extract(query).await;
        info!(
            intent = intent.label(),
            entities = keys.entities.len(),
            themes = keys.themes.len(),
            "fusion retrieval starting"
        );

        let (vector_hits, graph_hits, tree_hits) = tokio::join!(
            self.run_engine(EngineKind::Vector, self.vector_search(query, &keys)),
            self.run_engine(EngineKind::Graph, self.graph_search(query, &keys, intent)),
            self.run_engine(EngineKind::Tree, self.tree_search()),
        );

        let fused = fuse(vec![vector_hits, graph_hits, tree_hits], intent);
        Ok(SkylineRanker::rank(fused))
    }

    /// Apply the shared deadline and fail-soft policy to one engine future.
    async fn run_engine<F>(&self, engine: EngineKind, search: F) -> Vec<SearchResult>
    where
        F: std::future::Future<Output = Result<Vec<SearchResult>>>,
    {
        match tokio::time::timeout(self.deadline, search).await {
            Ok(Ok(results)) => {
                info!(engine = engine.label(), count = results.len(), "engine returned");
                results
            }
            Ok(Err(err)) => {
                warn!(engine = engine.label(), error = %err, "engine failed, contributing empty set");
                Vec::new()
            }
            Err(_) => {
                warn!(engine = engine.label(), "engine deadline fired, contributing empty set");
                Vec::new()
            }
        }
    }

    /// Dense search over the query (or the joined entities when present).
    async fn vector_search(&self, query: &str, keys: &SearchKeys) -> Result<Vec<SearchResult>> {
        let term = if keys.entities.is_empty() {
            query.to_string()
        } else {
            keys.entities.join(" ")
        };

        let (embedded, _) = self.batcher.generate(&[term], "dense", "query").await?;
        let vector = embedded
            .first()
            .map(|e| e.vector.clone())
            .ok_or_else(|| Error::api("no embedding result returned"))?;

        let hits = self.vector_store.search(&vector, ENGINE_LIMIT).await?;
        Ok(hits
            .into_iter()
            .map(|h| SearchResult {
                id: h.id,
                content: h.content,
                score: h.score,
                source: EngineKind::Vector,
            })
            .collect())
    }

    /// Substring search over Chunk text (themes replace the query for
    /// summary-intent queries).
    async fn graph_search(
        &self,
        query: &str,
        keys: &SearchKeys,
        intent: QueryIntent,
    ) -> Result<Vec<SearchResult>> {
        let term = if intent == QueryIntent::Summary && !keys.themes.is_empty() {
            keys.themes.join(" ")
        } else {
            query.to_string()
        };

        let hits = self.graph_store.search_chunks(&term, ENGINE_LIMIT).await?;
        Ok(hits
            .into_iter()
            .map(|h| SearchResult {
                id: h.id,
                content: h.content,
                score: h.score,
                source: EngineKind::Graph,
            })
            .collect())
    }

    /// The RAPTOR retrieval slot. Authored during ingestion but not yet
    /// queried; contributes an empty set.
    async fn tree_search(&self) -> Result<Vec<SearchResult>> {
        Ok(Vec::new())
    }
}

/// Weighted Reciprocal Rank Fusion over per-engine rankings.
///
/// Each result at 1-based rank `r` in its engine list contributes
/// `w_engine / (60 + r)`. Duplicates (by exact content) are merged by
/// summing scores; the first occurrence keeps its id and source. The output
/// is sorted by fused score descending. The final ranking depends only on
/// the multiset of per-engine lists and the intent, not on engine
/// completion order.
#[must_use]
pub fn fuse(engine_lists: Vec<Vec<SearchResult>>, intent: QueryIntent) -> Vec<SearchResult> {
    let weights = RouteOperator::weights(intent);

    let mut order: Vec<String> = Vec::new();
    let mut merged: std::collections::HashMap<String, SearchResult> =
        std::collections::HashMap::new();

    for list in engine_lists {
        for (rank0, result) in list.into_iter().enumerate() {
            let rank = (rank0 + 1) as f64;
            let weight = weights.for_engine(result.source);
            let rrf = (weight / (RRF_K + rank)) as f32;

            match merged.get_mut(&result.content) {
                Some(existing) => existing.score += rrf,
                None => {
                    order.push(result.content.clone());
                    merged.insert(
                        result.content.clone(),
                        SearchResult {
                            score: rrf,
                            ..result
                        },
                    );
                }
            }
        }
    }

    let mut fused: Vec<SearchResult> = order
        .into_iter()
        .filter_map(|content| merged.remove(&content))
        .collect();
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::Hit;
    use crate::testing::{
        router_with_chat, FixedEmbed, MemoryGraphStore, MemoryVectorStore, ScriptedChat,
    };
    use crate::llm::EmbeddingClient;

    fn result(content: &str, source: EngineKind) -> SearchResult {
        SearchResult {
            id: content.to_string(),
            content: content.to_string(),
            score: 1.0,
            source,
        }
    }

    #[test]
    fn test_intent_weighting_orders_engines() {
        // One result per engine, all at rank 1, summary intent:
        // tree (0.7) > graph (0.2) > vector (0.1).
        let fused = fuse(
            vec![
                vec![result("v", EngineKind::Vector)],
                vec![result("g", EngineKind::Graph)],
                vec![result("t", EngineKind::Tree)],
            ],
            QueryIntent::Summary,
        );

        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].content, "t");
        assert_eq!(fused[1].content, "g");
        assert_eq!(fused[2].content, "v");
        assert!(fused[0].score > fused[1].score && fused[1].score > fused[2].score);
    }

    #[test]
    fn test_duplicate_content_sums_scores() {
        let fused = fuse(
            vec![
                vec![result("same", EngineKind::Vector)],
                vec![result("same", EngineKind::Graph)],
            ],
            QueryIntent::General,
        );

        assert_eq!(fused.len(), 1);
        let expected = (0.33 / 61.0 + 0.34 / 61.0) as f32;
        assert!((fused[0].score - expected).abs() < 1e-6);
        // First occurrence keeps its source.
        assert_eq!(fused[0].source, EngineKind::Vector);
    }

    #[test]
    fn test_fusion_commutes_over_engine_order() {
        let lists = vec![
            vec![result("a", EngineKind::Vector), result("b", EngineKind::Vector)],
            vec![result("b", EngineKind::Graph), result("c", EngineKind::Graph)],
        ];
        let mut reversed = lists.clone();
        reversed.reverse();

        let forward = fuse(lists, QueryIntent::Relationship);
        let backward = fuse(reversed, QueryIntent::Relationship);

        let forward_scores: Vec<(String, f32)> = forward
            .iter()
            .map(|r| (r.content.clone(), r.score))
            .collect();
        let backward_scores: Vec<(String, f32)> = backward
            .iter()
            .map(|r| (r.content.clone(), r.score))
            .collect();
        assert_eq!(forward_scores, backward_scores);
    }

    #[test]
    fn test_rank_decay() {
        let fused = fuse(
            vec![vec![
                result("first", EngineKind::Vector),
                result("second", EngineKind::Vector),
            ]],
            QueryIntent::Definition,
        );
        assert!(fused[0].score > fused[1].score);
        assert_eq!(fused[0].content, "first");
    }

    fn retriever(
        vector: Arc<MemoryVectorStore>,
        graph: Arc<MemoryGraphStore>,
    ) -> FusionRetriever {
        let router = router_with_chat(ScriptedChat::always("not json"));
        let batcher = Arc::new(Batcher::new(
            Arc::new(FixedEmbed::dim(4)) as Arc<dyn EmbeddingClient>,
            8,
        ));
        FusionRetriever::new(vector as _, graph as _, batcher, router)
    }

    #[tokio::test]
    async fn test_retrieve_merges_both_stores() {
        let vector = Arc::new(MemoryVectorStore::default());
        vector.set_search_results(vec![Hit {
            id: "1-chunk-0".into(),
            content: "the whale surfaced".into(),
            score: 0.92,
        }]);
        let graph = Arc::new(MemoryGraphStore::default());
        graph
            .insert_nodes_and_edges(
                "1",
                &[crate::domain::GraphNode {
                    id: "1-chunk-1".into(),
                    kind: crate::domain::NodeKind::Chunk,
                    text: "whale hunting gear".into(),
                    name: None,
                    level: None,
                    page_number: None,
                }],
                &[],
            )
            .await
            .unwrap();

        let retriever = retriever(vector, graph);
        let results = retriever.retrieve("whale").await.unwrap();

        assert!(!results.is_empty());
        assert!(results.iter().any(|r| r.source == EngineKind::Vector));
        assert!(results.iter().any(|r| r.source == EngineKind::Graph));
    }

    #[tokio::test]
    async fn test_engine_failure_is_fail_soft() {
        let vector = Arc::new(MemoryVectorStore::default());
        vector.fail_search(true);
        let graph = Arc::new(MemoryGraphStore::default());
        graph
            .insert_nodes_and_edges(
                "1",
                &[crate::domain::GraphNode {
                    id: "1-chunk-0".into(),
                    kind: crate::domain::NodeKind::Chunk,
                    text: "storm at sea".into(),
                    name: None,
                    level: None,
                    page_number: None,
                }],
                &[],
            )
            .await
            .unwrap();

        let retriever = retriever(vector, graph);
        let results = retriever.retrieve("storm").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, EngineKind::Graph);
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let retriever = retriever(
            Arc::new(MemoryVectorStore::default()),
            Arc::new(MemoryGraphStore::default()),
        );
        assert!(retriever.retrieve("  ").await.is_err());
    }
}
