//! Sage core: the engines behind a RAG orchestrator for long, structured
//! book documents.
//!
//! Two tightly coupled subsystems share this crate's domain model, stores,
//! and LLM routing:
//!
//! - the **ingestion saga engine** ([`ingest`]), a durable, compensating
//!   state machine taking an uploaded binary through parsing, embedding,
//!   vector indexing, knowledge-graph extraction, and cross-store indexing
//!   with at-most-once effects under crash and retry;
//! - the **agentic fusion query engine** ([`query`]), a concurrent hybrid
//!   retriever with intent-weighted rank fusion, skyline pruning, and a
//!   Self-RAG critique loop streaming its reasoning to the caller.
//!
//! External systems appear only as capability ports: [`stores::VectorStore`]
//! and [`stores::GraphStore`] for the two indexes, [`llm::ChatClient`] and
//! [`llm::EmbeddingClient`] for the model backends, [`parser::ParserClient`]
//! for the binary parser, and [`saga_store::SagaStore`] for durable saga
//! state. Adapter crates (`sage-qdrant`, `sage-neo4j`, `sage-ollama`,
//! `sage-gemini`) plug real services into those ports.

pub mod config;
pub mod domain;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod parser;
pub mod query;
pub mod resilience;
pub mod saga_store;
pub mod stores;
pub mod testing;

pub use config::AppConfig;
pub use error::{Error, Result};
