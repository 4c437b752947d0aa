//! Ollama integration for Sage.
//!
//! Local inference without external API dependencies: [`ChatOllama`] backs
//! the light chat route and [`OllamaEmbeddings`] the embedding route. Both
//! talk to the Ollama HTTP API and retry transient failures.

pub mod chat;
pub mod embeddings;

pub use chat::ChatOllama;
pub use embeddings::OllamaEmbeddings;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
