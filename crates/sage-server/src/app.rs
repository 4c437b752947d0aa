//! Router construction and shared handler state.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use sage::embedding::Batcher;
use sage::ingest::SagaOrchestrator;
use sage::parser::ParserClient;
use sage::query::AgenticGenerator;
use sage::stores::{GraphStore, VectorStore};

use crate::handlers;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SagaOrchestrator>,
    pub generator: Arc<AgenticGenerator>,
    pub parser: Arc<dyn ParserClient>,
    pub batcher: Arc<Batcher>,
    pub vector_store: Arc<dyn VectorStore>,
    pub graph_store: Arc<dyn GraphStore>,
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/ingest", post(handlers::ingest))
        .route("/api/v1/ingest/status", get(handlers::ingest_status))
        .route(
            "/api/v1/documents/:document_id/status",
            get(handlers::document_status),
        )
        .route(
            "/api/v1/documents/:document_id",
            axum::routing::head(handlers::document_exists),
        )
        .route("/api/v1/query", post(handlers::query))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
