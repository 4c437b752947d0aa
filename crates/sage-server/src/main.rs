//! Sage API server entry point.
//!
//! Explicit construction at startup: configuration from the environment,
//! one client per external system, capability ports injected into the two
//! engines, then the axum router.

mod app;
mod handlers;

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sage::embedding::Batcher;
use sage::ingest::SagaOrchestrator;
use sage::llm::{ChatClient, EmbeddingClient, LlmRouter};
use sage::parser::HttpParserClient;
use sage::query::{AgenticGenerator, FusionRetriever};
use sage::saga_store::SqliteSagaStore;
use sage::AppConfig;
use sage_gemini::ChatGemini;
use sage_neo4j::Neo4jGraphStore;
use sage_ollama::{ChatOllama, OllamaEmbeddings};
use sage_qdrant::{QdrantConfig, QdrantVectorStore};

#[derive(Debug, Parser)]
#[command(name = "sage-server", about = "RAG orchestrator API for book documents")]
struct Args {
    /// Listen port (overrides SAGE_PORT).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }

    // LLM backends and routing.
    let local: Arc<dyn ChatClient> = Arc::new(
        ChatOllama::with_base_url(&config.ollama_host).with_model(&config.ollama_llm_model),
    );
    let heavy: Arc<dyn ChatClient> = match &config.gemini_api_key {
        Some(key) => Arc::new(ChatGemini::new(key).with_timeout(config.default_timeout)),
        None => Arc::clone(&local),
    };
    let embedder: Arc<dyn EmbeddingClient> = Arc::new(
        OllamaEmbeddings::with_base_url(&config.ollama_host)
            .with_model(&config.ollama_embed_model),
    );
    let router = Arc::new(
        LlmRouter::new(local, heavy, embedder).with_local_only(config.use_local_only_llm),
    );

    // Stores.
    let vector_store = Arc::new(
        QdrantVectorStore::connect(QdrantConfig {
            host: config.qdrant_host.clone(),
            port: config.qdrant_port,
            collection: config.qdrant_collection.clone(),
            ..QdrantConfig::default()
        })
        .await?,
    );
    let graph_store = Arc::new(
        Neo4jGraphStore::connect(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password)
            .await?,
    );
    let saga_store = Arc::new(SqliteSagaStore::new(&config.db_path)?);

    // Engines.
    let batcher = Arc::new(
        Batcher::new(router.embedder(), config.embed_batch_size)
            .with_batch_timeout(config.embedding_timeout),
    );
    let orchestrator = Arc::new(SagaOrchestrator::new(
        vector_store.clone() as _,
        graph_store.clone() as _,
        saga_store,
        Arc::clone(&router),
    ));
    let retriever = Arc::new(FusionRetriever::new(
        vector_store.clone() as _,
        graph_store.clone() as _,
        Arc::clone(&batcher),
        Arc::clone(&router),
    ));
    let generator = Arc::new(AgenticGenerator::new(router, retriever));
    let parser = Arc::new(
        HttpParserClient::new(&config.worker_addr).with_timeout(config.parser_timeout),
    );

    let state = app::AppState {
        orchestrator,
        generator,
        parser,
        batcher,
        vector_store,
        graph_store,
    };
    let api = app::build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    info!(addr, "sage server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, api).await?;
    Ok(())
}
