//! Ollama chat model client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sage::error::{Error, Result};
use sage::llm::ChatClient;
use sage::resilience::{with_retry, RetryPolicy};

const DEFAULT_MODEL: &str = "llama3.2";

/// Chat client over a local Ollama server.
///
/// # Example
///
/// ```rust,no_run
/// use sage_ollama::ChatOllama;
///
/// let model = ChatOllama::with_base_url("http://localhost:11434")
///     .with_model("llama3.2")
///     .with_temperature(0.2);
/// ```
pub struct ChatOllama {
    base_url: String,
    model: String,
    client: Client,
    temperature: Option<f32>,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl ChatOllama {
    /// Create a client against `base_url`.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: DEFAULT_MODEL.to_string(),
            client: Client::new(),
            temperature: None,
            timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::exponential(3),
        }
    }

    /// Create a client against the default local server.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(crate::DEFAULT_BASE_URL)
    }

    /// Set the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
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

impl Default for ChatOllama {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatClient for ChatOllama {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: self
                .temperature
                .map(|temperature| GenerateOptions { temperature }),
        };

        debug!(model = %self.model, "dispatching ollama generate");
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
                    "ollama generate returned {}",
                    response.status()
                )));
            }
            response
                .json::<GenerateResponse>()
                .await
                .map_err(|e| Error::api(format!("failed to parse ollama response: {e}")))
        })
        .await?;

        Ok(response.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
