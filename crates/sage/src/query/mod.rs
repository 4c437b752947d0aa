//! The agentic fusion query engine.

pub mod fusion;
pub mod generator;
pub mod intent;
pub mod keys;
pub mod self_rag;
pub mod skyline;

use std::sync::Arc;

use tokio::sync::mpsc;

pub use fusion::{fuse, FusionRetriever};
pub use generator::{AgenticGenerator, EventKind, GeneratorEvent};
pub use intent::{IntentClassifier, QueryIntent, RouteOperator, RouteWeights};
pub use keys::{DualKeyExtractor, SearchKeys};
pub use self_rag::{SelfRagCritique, SupportLevel};
pub use skyline::SkylineRanker;

/// Spawn the generation pipeline for `query` and return the ordered event
/// receiver. The channel closes exactly once, when generation finishes;
/// consumers treat closure as end-of-answer.
#[must_use]
pub fn answer_stream(
    generator: Arc<AgenticGenerator>,
    query: String,
) -> mpsc::Receiver<GeneratorEvent> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        generator.generate_answer(&query, tx).await;
    });
    rx
}
