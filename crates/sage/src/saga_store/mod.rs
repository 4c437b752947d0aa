//! Durable state for documents and ingestion sagas.
//!
//! The store is append/update only: documents are created once per unique
//! content hash, sagas move through their lifecycle via version-checked
//! status transitions, and step rows are upserted as the saga enters and
//! leaves each step.

pub mod sqlite;

use async_trait::async_trait;

use crate::domain::{Document, IngestSaga, SagaStatus, SagaStep, StepName};
use crate::error::Result;

pub use sqlite::SqliteSagaStore;

/// Durable log of documents, sagas, and saga steps.
///
/// Every implementation must enforce the two core invariants: `file_hash` is
/// unique across documents, and [`SagaStore::update_saga_status`] fails with
/// [`crate::Error::ConcurrentUpdate`] whenever the persisted version differs
/// from the caller's observed version.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Insert a new document row, returning its id.
    async fn create_document(&self, doc: &Document) -> Result<i64>;

    /// Look up a document by hex content hash.
    async fn get_document_by_hash(&self, hash: &str) -> Result<Option<Document>>;

    /// Look up a document by surrogate id.
    async fn get_document(&self, document_id: i64) -> Result<Option<Document>>;

    /// Insert a new saga row at version 1, returning its id.
    async fn create_saga(&self, saga: &IngestSaga) -> Result<i64>;

    /// Fetch a saga by id.
    async fn get_saga(&self, saga_id: i64) -> Result<Option<IngestSaga>>;

    /// The most recently created saga for a document, if any.
    async fn latest_saga_for_document(&self, document_id: i64) -> Result<Option<IngestSaga>>;

    /// Version-checked status transition. Bumps the version by one on
    /// success.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ConcurrentUpdate`] when `observed_version` is stale,
    /// [`crate::Error::NotFound`] when the saga does not exist.
    async fn update_saga_status(
        &self,
        saga_id: i64,
        observed_version: i64,
        status: SagaStatus,
        step: StepName,
        error_message: &str,
    ) -> Result<()>;

    /// Upsert the step row keyed by `(saga_id, name)`, returning its id.
    async fn upsert_saga_step(&self, step: &SagaStep) -> Result<i64>;

    /// All step rows for a saga, in creation order.
    async fn list_saga_steps(&self, saga_id: i64) -> Result<Vec<SagaStep>>;
}

/// Current unix seconds.
#[must_use]
pub(crate) fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
