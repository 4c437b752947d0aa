//! Capability port over the external binary parser worker.
//!
//! The worker accepts the raw document bytes plus metadata and returns the
//! ordered structural chunks. The authoritative wire definition lives with
//! the worker; this client only speaks the multipart surface it exposes.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::domain::StructuralChunk;
use crate::error::{Error, Result};

/// Metadata accompanying a parse request.
#[derive(Debug, Clone)]
pub struct ParseMetadata {
    pub filename: String,
    pub mime_type: String,
    pub document_id: String,
}

/// Parses uploaded bytes into ordered structural chunks.
#[async_trait]
pub trait ParserClient: Send + Sync {
    /// Parse `bytes`, returning chunks in document order.
    async fn parse(&self, meta: &ParseMetadata, bytes: Vec<u8>) -> Result<Vec<StructuralChunk>>;
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    #[allow(dead_code)]
    #[serde(default)]
    document_id: String,
    documents: Vec<StructuralChunk>,
}

/// HTTP multipart client for the parser worker.
pub struct HttpParserClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpParserClient {
    /// Create a client against `base_url` (e.g. `http://worker:50051`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Override the parse deadline (default 60 s).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ParserClient for HttpParserClient {
    async fn parse(&self, meta: &ParseMetadata, bytes: Vec<u8>) -> Result<Vec<StructuralChunk>> {
        let url = format!("{}/parse", self.base_url.trim_end_matches('/'));
        debug!(url = %url, filename = %meta.filename, size = bytes.len(), "dispatching parse request");

        let file_part = reqwest::multipart::Part::bytes(bytes)
            .file_name(meta.filename.clone())
            .mime_str(&meta.mime_type)
            .map_err(|e| Error::invalid_input(format!("bad mime type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("document_id", meta.document_id.clone())
            .part("file", file_part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::api(format!(
                "parser worker returned {}",
                response.status()
            )));
        }

        let parsed: ParseResponse = response
            .json()
            .await
            .map_err(|e| Error::api(format!("parser response decode failed: {e}")))?;
        Ok(parsed.documents)
    }
}
