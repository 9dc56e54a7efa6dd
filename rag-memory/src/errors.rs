//! Unified error types for the crate.

use std::time::Duration;

use model_host::ModelHostError;
use thiserror::Error;

/// Top-level error for rag-memory operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// No model host is loaded into the embedder.
    #[error("embedding model is not loaded")]
    EmbeddingUnavailable,

    /// Text to embed is empty or whitespace-only.
    #[error("cannot embed empty input")]
    EmptyInput,

    /// Search text is empty; rejected before any network call.
    #[error("query text is empty")]
    EmptyQuery,

    /// Vector index transport or server failure.
    #[error("vector index unreachable: {0}")]
    IndexUnreachable(String),

    /// A hybrid query against a collection failed.
    #[error("hybrid query on '{collection}' failed: {reason}")]
    QueryFailed { collection: String, reason: String },

    /// Dense/sparse result lists are malformed.
    #[error("fusion input mismatch: {0}")]
    FusionInputMismatch(String),

    /// Mismatch in vector dimensionality.
    #[error("vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },

    /// Sparse vector with a repeated index.
    #[error("duplicate sparse index {0}")]
    DuplicateSparseIndex(u32),

    /// Invalid or unsupported configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Failed to parse an environment variable into the expected type.
    #[error("failed to parse env variable: {key} = '{value}'")]
    EnvParse { key: String, value: String },

    /// Errors from the model host (transport, decode, shape).
    #[error("model host error: {0}")]
    ModelHost(#[from] ModelHostError),

    /// Operation exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A blocking worker panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Join(String),
}

impl From<qdrant_client::QdrantError> for RagError {
    fn from(e: qdrant_client::QdrantError) -> Self {
        RagError::IndexUnreachable(e.to_string())
    }
}

impl From<tokio::task::JoinError> for RagError {
    fn from(e: tokio::task::JoinError) -> Self {
        RagError::Join(e.to_string())
    }
}
