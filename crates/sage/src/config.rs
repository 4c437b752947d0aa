//! Server-side configuration, built explicitly at program entry from
//! `SAGE_*` environment variables and passed down by reference. No ambient
//! singletons.

use std::time::Duration;

use crate::error::{Error, Result};

/// Read an environment variable, treating empty values as unset.
#[must_use]
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::config(format!("{key} is not a valid value: {raw}"))),
        None => Ok(default),
    }
}

/// Top-level configuration for the orchestrator process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Base URL of the parser worker, e.g. `http://worker:50051`.
    pub worker_addr: String,
    /// Gemini API key; absent means the heavy route must be local-only.
    pub gemini_api_key: Option<String>,
    /// Ollama base URL, e.g. `http://localhost:11434`.
    pub ollama_host: String,
    /// Ollama chat model name.
    pub ollama_llm_model: String,
    /// Ollama embedding model name.
    pub ollama_embed_model: String,
    /// Substitute the heavy route with the local chat model.
    pub use_local_only_llm: bool,
    pub qdrant_host: String,
    pub qdrant_port: u16,
    pub qdrant_collection: String,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    /// Path of the sqlite saga store.
    pub db_path: String,
    /// Default deadline for LLM and store calls.
    pub default_timeout: Duration,
    /// Per-batch deadline for embedding calls.
    pub embedding_timeout: Duration,
    /// Deadline for a full parser round trip.
    pub parser_timeout: Duration,
    /// Texts per embedding batch.
    pub embed_batch_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            worker_addr: "http://localhost:50051".to_string(),
            gemini_api_key: None,
            ollama_host: "http://localhost:11434".to_string(),
            ollama_llm_model: "llama3.2".to_string(),
            ollama_embed_model: "nomic-embed-text".to_string(),
            use_local_only_llm: false,
            qdrant_host: "localhost".to_string(),
            qdrant_port: 6334,
            qdrant_collection: "sage_chunks".to_string(),
            neo4j_uri: "bolt://localhost:7687".to_string(),
            neo4j_user: "neo4j".to_string(),
            neo4j_password: String::new(),
            db_path: "sage.db".to_string(),
            default_timeout: Duration::from_secs(30),
            embedding_timeout: Duration::from_secs(5),
            parser_timeout: Duration::from_secs(60),
            embed_batch_size: 32,
        }
    }
}

impl AppConfig {
    /// Build the configuration from `SAGE_*` environment variables, falling
    /// back to defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a variable is present but unparseable,
    /// or when validation fails.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let cfg = Self {
            port: env_parse("SAGE_PORT", defaults.port)?,
            worker_addr: env_string("SAGE_WORKER_ADDR").unwrap_or(defaults.worker_addr),
            gemini_api_key: env_string("SAGE_GEMINI_API_KEY"),
            ollama_host: env_string("SAGE_OLLAMA_HOST").unwrap_or(defaults.ollama_host),
            ollama_llm_model: env_string("SAGE_OLLAMA_LLM_MODEL")
                .unwrap_or(defaults.ollama_llm_model),
            ollama_embed_model: env_string("SAGE_OLLAMA_EMBED_MODEL")
                .unwrap_or(defaults.ollama_embed_model),
            use_local_only_llm: env_string("SAGE_USE_LOCAL_ONLY_LLM")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            qdrant_host: env_string("SAGE_QDRANT_HOST").unwrap_or(defaults.qdrant_host),
            qdrant_port: env_parse("SAGE_QDRANT_PORT", defaults.qdrant_port)?,
            qdrant_collection: env_string("SAGE_QDRANT_COLLECTION")
                .unwrap_or(defaults.qdrant_collection),
            neo4j_uri: env_string("SAGE_NEO4J_URI").unwrap_or(defaults.neo4j_uri),
            neo4j_user: env_string("SAGE_NEO4J_USER").unwrap_or(defaults.neo4j_user),
            neo4j_password: env_string("SAGE_NEO4J_PASSWORD").unwrap_or_default(),
            db_path: env_string("SAGE_DB_PATH").unwrap_or(defaults.db_path),
            default_timeout: Duration::from_secs(env_parse(
                "SAGE_DEFAULT_TIMEOUT_SEC",
                defaults.default_timeout.as_secs(),
            )?),
            embedding_timeout: Duration::from_secs(env_parse(
                "SAGE_EMBEDDING_TIMEOUT_SEC",
                defaults.embedding_timeout.as_secs(),
            )?),
            parser_timeout: Duration::from_secs(env_parse(
                "SAGE_PARSER_TIMEOUT_SEC",
                defaults.parser_timeout.as_secs(),
            )?),
            embed_batch_size: env_parse("SAGE_EMBED_BATCH_SIZE", defaults.embed_batch_size)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.embed_batch_size == 0 {
            return Err(Error::config("SAGE_EMBED_BATCH_SIZE must be at least 1"));
        }
        if !self.use_local_only_llm && self.gemini_api_key.is_none() {
            return Err(Error::config(
                "SAGE_GEMINI_API_KEY is required unless SAGE_USE_LOCAL_ONLY_LLM is set",
            ));
        }
        Ok(())
    }
}
