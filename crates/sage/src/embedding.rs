//! Order-preserving batched embedding.
//!
//! Splits a text list into fixed-size batches, dispatches them concurrently,
//! and reassembles the vectors in input order. The first batch error wins and
//! all partial results are discarded.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::llm::EmbeddingClient;

/// One embedded text, preserving the input association.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedText {
    pub text: String,
    pub vector: Vec<f32>,
}

/// Batched front-end over an [`EmbeddingClient`].
pub struct Batcher {
    client: Arc<dyn EmbeddingClient>,
    batch_size: usize,
    batch_timeout: Duration,
}

impl Batcher {
    /// Create a batcher. `batch_size` must be at least 1.
    #[must_use]
    pub fn new(client: Arc<dyn EmbeddingClient>, batch_size: usize) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
            batch_timeout: Duration::from_secs(5),
        }
    }

    /// Override the per-batch deadline (default 5 s).
    #[must_use]
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    /// Embed `texts` in concurrent batches, returning one result per input in
    /// the original order plus an approximate token count.
    ///
    /// The `embedding_type` and `task_type` tags are forwarded for logging
    /// only; they are not interpreted here. Empty input returns `([], 0)`
    /// without touching the client.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered across batches; partial results
    /// are discarded.
    pub async fn generate(
        &self,
        texts: &[String],
        embedding_type: &str,
        task_type: &str,
    ) -> Result<(Vec<EmbeddedText>, u32)> {
        if texts.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let total = texts.len();
        let num_batches = total.div_ceil(self.batch_size);
        debug!(
            total,
            num_batches,
            batch_size = self.batch_size,
            embedding_type,
            task_type,
            "dispatching embedding batches"
        );

        let mut handles = Vec::with_capacity(num_batches);
        for (batch_index, batch) in texts.chunks(self.batch_size).enumerate() {
            let client = Arc::clone(&self.client);
            let batch: Vec<String> = batch.to_vec();
            let timeout = self.batch_timeout;
            handles.push(tokio::spawn(async move {
                let vectors = tokio::time::timeout(timeout, client.embed(&batch))
                    .await
                    .map_err(|_| Error::timeout(format!("embedding batch {batch_index}")))??;
                if vectors.len() != batch.len() {
                    return Err(Error::api(format!(
                        "embedding batch {batch_index}: got {} vectors for {} texts",
                        vectors.len(),
                        batch.len()
                    )));
                }
                Ok::<_, Error>((batch_index, batch, vectors))
            }));
        }

        let mut slots: Vec<Option<EmbeddedText>> = vec![None; total];
        let mut first_error: Option<Error> = None;
        for handle in handles {
            let joined = handle
                .await
                .map_err(|e| Error::other(format!("embedding task panicked: {e}")))?;
            match joined {
                Ok((batch_index, batch, vectors)) => {
                    let start = batch_index * self.batch_size;
                    for (offset, (text, vector)) in batch.into_iter().zip(vectors).enumerate() {
                        slots[start + offset] = Some(EmbeddedText { text, vector });
                    }
                }
                Err(err) => {
                    warn!(error = %err, "embedding batch failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        let results: Vec<EmbeddedText> = slots
            .into_iter()
            .map(|slot| slot.expect("every batch slot filled"))
            .collect();
        let approx_tokens = (total * 10) as u32;
        Ok((results, approx_tokens))
    }
}
