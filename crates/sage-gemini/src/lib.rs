//! Google Gemini chat client for Sage.
//!
//! Backs the heavy route: agentic reasoning and deep summarization over
//! large contexts. Single-shot completions only; no partial results.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sage::error::{Error, Result};
use sage::llm::ChatClient;
use sage::resilience::{with_retry, RetryPolicy};

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini chat model client.
///
/// # Example
///
/// ```rust,no_run
/// use sage_gemini::ChatGemini;
///
/// let model = ChatGemini::new("api-key")
///     .with_model("gemini-2.0-flash")
///     .with_temperature(0.7);
/// ```
pub struct ChatGemini {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

// Custom Debug to keep the API key out of logs.
impl std::fmt::Debug for ChatGemini {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatGemini")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

impl ChatGemini {
    /// Create a client with the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: API_BASE.to_string(),
            client: Client::new(),
            temperature: None,
            max_tokens: None,
            timeout: Duration::from_secs(60),
            retry_policy: RetryPolicy::exponential(3),
        }
    }

    /// Set the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL (used by tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the sampling temperature (0.0 to 2.0).
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of output tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the per-request deadline (default 60 s).
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

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl ChatClient for ChatGemini {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(Error::config("gemini api key is not set"));
        }

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: if self.temperature.is_some() || self.max_tokens.is_some() {
                Some(GenerationConfig {
                    temperature: self.temperature,
                    max_output_tokens: self.max_tokens,
                })
            } else {
                None
            },
        };

        debug!(model = %self.model, "dispatching gemini generate");
        let response = with_retry(&self.retry_policy, || async {
            let response = self
                .client
                .post(self.endpoint())
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .timeout(self.timeout)
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status.is_server_error()
            {
                return Err(Error::unavailable(format!("gemini returned {status}")));
            }
            if !status.is_success() {
                return Err(Error::api(format!("gemini returned {status}")));
            }
            response
                .json::<GenerateContentResponse>()
                .await
                .map_err(|e| Error::api(format!("failed to parse gemini response: {e}")))
        })
        .await?;

        let text = response
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(Error::api("gemini returned no candidates"));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
