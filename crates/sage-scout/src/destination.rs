//! Submission of downloaded items to the Sage ingest endpoint.

use async_trait::async_trait;
use tracing::{debug, info};

use sage::domain::ScoutItem;
use sage::error::{Error, Result};

/// Where scouted items are delivered.
#[async_trait]
pub trait BookDestination: Send + Sync {
    /// Submit an item's content. Success means the item counts as
    /// processed; a duplicate already known to the API also counts.
    async fn submit(&self, item: &ScoutItem, content: Vec<u8>) -> Result<()>;
}

/// Multipart client for the Sage `/ingest` endpoint.
pub struct ApiDestination {
    client: reqwest::Client,
    base_url: String,
}

impl ApiDestination {
    /// Create a client against `base_url` (e.g. `http://api:8080/api/v1`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BookDestination for ApiDestination {
    async fn submit(&self, item: &ScoutItem, content: Vec<u8>) -> Result<()> {
        let url = format!("{}/ingest", self.base_url.trim_end_matches('/'));
        let metadata = serde_json::json!({
            "title": item.title,
            "author": item.author,
        })
        .to_string();

        let mime = if item.mime_type.is_empty() {
            "application/octet-stream"
        } else {
            &item.mime_type
        };
        let file_part = reqwest::multipart::Part::bytes(content)
            .file_name(format!("{}.bin", item.id.replace([':', '/'], "_")))
            .mime_str(mime)
            .map_err(|e| Error::invalid_input(format!("bad mime type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("metadata", metadata)
            .part("file", file_part);

        debug!(item = %item.id, url, "submitting item");
        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status();

        if status.is_success() {
            info!(item = %item.id, "submitted");
            return Ok(());
        }
        // The API already has this document; the item still counts as
        // delivered.
        if status == reqwest::StatusCode::CONFLICT {
            info!(item = %item.id, "already ingested");
            return Ok(());
        }
        Err(Error::api(format!(
            "ingest endpoint returned {status} for {}",
            item.id
        )))
    }
}
