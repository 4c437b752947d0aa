//! Ollama embedding client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sage::error::{Error, Result};
use sage::llm::EmbeddingClient;
use sage::resilience::{with_retry, RetryPolicy};

const DEFAULT_MODEL: &str = "nomic-embed-text";

/// Embedding client over a local Ollama server.
pub struct OllamaEmbeddings {
    base_url: String,
    model: String,
    client: Client,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddings {
    /// Create a client against `base_url`.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: DEFAULT_MODEL.to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::exponential(3),
        }
    }

    /// Create a client against the default local server.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(crate::DEFAULT_BASE_URL)
    }

    /// Set the embedding model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the per-request deadline (default 30 s).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy for API calls.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

impl Default for OllamaEmbeddings {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url.trim_end_matches('/'));
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        debug!(model = %self.model, count = texts.len(), "dispatching ollama embed");
        let response = with_retry(&self.retry_policy, || async {
            let response = self
                .client
                .post(&url)
                .json(&request)
                .timeout(self.timeout)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(Error::api(format!(
                    "ollama embed returned {}",
                    response.status()
                )));
            }
            response
                .json::<EmbedResponse>()
                .await
                .map_err(|e| Error::api(format!("failed to parse ollama embeddings: {e}")))
        })
        .await?;

        if response.embeddings.len() != texts.len() {
            return Err(Error::api(format!(
                "ollama returned {} embeddings for {} inputs",
                response.embeddings.len(),
                texts.len()
            )));
        }
        Ok(response.embeddings)
    }

    fn name(&self) -> &str {
        "ollama-embed"
    }
}
