//! Error types shared across the Sage engines and adapters.
//!
//! Adapters wrap transport-level failures into the semantic kinds defined
//! here; the saga engine maps step failures onto saga state, and the HTTP
//! layer maps kinds onto status codes. Use [`Error::is_retryable`] to decide
//! whether an operation may be re-dispatched.

use thiserror::Error;

/// Result type alias for Sage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Sage operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Input validation error (missing file, empty query, malformed hash).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The document with this content hash already has a completed saga.
    #[error("document already ingested: {hash}")]
    AlreadyIngested {
        /// Hex-encoded content hash of the duplicate upload.
        hash: String,
    },

    /// No such document or saga.
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic version check failed; the caller must re-read and retry.
    #[error("concurrent update: expected version {expected}, found {found}")]
    ConcurrentUpdate {
        /// Version the caller observed.
        expected: i64,
        /// Version currently persisted.
        found: i64,
    },

    /// Vector store upsert failed during the Embedding step. Terminal for
    /// the step; nothing was committed before it, so no compensation runs.
    #[error("qdrant insertion failed: {0}")]
    VectorInsertionFailed(String),

    /// Graph store insert failed during the Indexing step. Compensation of
    /// the vector effects was attempted before this was returned.
    #[error("neo4j insertion failed, transaction rolled back: {0}")]
    GraphInsertionFailed(String),

    /// Compensation itself failed; the partial vector state needs manual
    /// repair. Always accompanied by a critical-level log record.
    #[error("compensation failed for doc {doc_id}: {reason}")]
    CompensationFailed {
        /// Document whose vector points could not be deleted.
        doc_id: String,
        /// Underlying failure.
        reason: String,
    },

    /// Deadline exceeded talking to a parser, embedder, LLM, or store.
    #[error("upstream timed out: {0}")]
    Timeout(String),

    /// Circuit breaker open or transport-level failure.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// Upstream API returned an error response.
    #[error("api error: {0}")]
    Api(String),

    /// Durable store (sqlite) failure.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization failure at a boundary.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid-input error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an unavailable error.
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an API error.
    pub fn api<S: Into<String>>(msg: S) -> Self {
        Self::Api(msg.into())
    }

    /// Create a store error.
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Whether the operation may succeed if re-dispatched.
    ///
    /// Transient upstream failures are retryable; validation failures,
    /// duplicate uploads, and saga-terminal failures are not.
    /// `ConcurrentUpdate` is retryable only after re-reading the row, so it
    /// is excluded here.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Unavailable(_) | Error::Io(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else if err.is_connect() {
            Error::Unavailable(err.to_string())
        } else if err.is_status() {
            Error::Api(err.to_string())
        } else {
            Error::Other(err.to_string())
        }
    }
}
