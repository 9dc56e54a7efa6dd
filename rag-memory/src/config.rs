//! Runtime, collection and retrieval configuration.

use std::time::Duration;

use crate::errors::RagError;
use crate::index::CollectionSpec;

/// Which vector index implementation backs the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorBackend {
    /// Remote Qdrant over gRPC.
    Qdrant,
    /// Process-local index (tests, offline runs).
    InMemory,
}

impl VectorBackend {
    /// Parse from env string (case-insensitive). Defaults to Qdrant.
    pub fn from_env(s: Option<String>) -> Result<Self, RagError> {
        match s {
            None => Ok(VectorBackend::Qdrant),
            Some(v) => match v.trim().to_lowercase().as_str() {
                "" | "qdrant" => Ok(VectorBackend::Qdrant),
                "memory" | "in-memory" | "in_memory" => Ok(VectorBackend::InMemory),
                _ => Err(RagError::EnvParse {
                    key: "VECTOR_BACKEND".into(),
                    value: v,
                }),
            },
        }
    }
}

/// Configuration for memory, retrieval and ingestion.
#[derive(Clone, Debug)]
pub struct RagMemoryConfig {
    pub backend: VectorBackend,
    /// Qdrant gRPC endpoint, e.g. `http://localhost:6334`.
    pub qdrant_url: String,
    /// Optional API key for Qdrant Cloud.
    pub qdrant_api_key: Option<String>,
    /// Name of the dense vector slot.
    pub dense_vector_name: String,
    /// Name of the sparse vector slot.
    pub sparse_vector_name: String,
    /// Dense dimensionality (384 for the reference encoder).
    pub embedding_dim: usize,
    /// Maximum points kept per memory collection (K).
    pub memory_window: usize,
    /// Page size used to list memory points.
    pub memory_scroll_limit: usize,
    /// RRF damping constant.
    pub rrf_k: u32,
    /// Number of fused entries returned (N).
    pub context_cap: usize,
    /// Per-list limit for hybrid queries.
    pub knowledge_limit: usize,
    /// Payload keys projected into fused context blocks.
    pub knowledge_payload_keys: Vec<String>,
    /// Points per upsert batch during ingestion.
    pub ingest_batch_size: usize,
    /// Concurrent chunk embeddings during ingestion.
    pub ingest_concurrency: usize,
    /// Characters per knowledge chunk.
    pub chunk_size: usize,
    /// Overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Per-call timeout for the index client.
    pub index_timeout: Duration,
    /// Deadline for the composed retrieval pipeline.
    pub pipeline_timeout: Duration,
}

impl RagMemoryConfig {
    /// Creates a default config for a given Qdrant endpoint.
    pub fn new_default(url: impl Into<String>) -> Self {
        Self {
            backend: VectorBackend::Qdrant,
            qdrant_url: url.into(),
            qdrant_api_key: None,
            dense_vector_name: "text-embedding".into(),
            sparse_vector_name: "sparse-embedding".into(),
            embedding_dim: 384,
            memory_window: 50,
            memory_scroll_limit: 100,
            rrf_k: 60,
            context_cap: 5,
            knowledge_limit: 10,
            knowledge_payload_keys: vec!["text".into(), "source".into()],
            ingest_batch_size: 100,
            ingest_concurrency: 4,
            chunk_size: 512,
            chunk_overlap: 50,
            index_timeout: Duration::from_secs(30),
            pipeline_timeout: Duration::from_secs(60),
        }
    }

    /// Default config backed by the in-memory index.
    pub fn in_memory() -> Self {
        Self {
            backend: VectorBackend::InMemory,
            ..Self::new_default("http://localhost:6334")
        }
    }

    /// Build configuration from environment variables.
    ///
    /// Environment variables used:
    /// - `VECTOR_BACKEND` (`qdrant` | `memory`, default: `qdrant`)
    /// - `QDRANT_URL` (default: "http://localhost:6334")
    /// - `QDRANT_API_KEY` (optional)
    /// - `DENSE_VECTOR_NAME` (default: "text-embedding")
    /// - `SPARSE_VECTOR_NAME` (default: "sparse-embedding")
    /// - `EMBEDDING_DIM` (default: 384)
    /// - `MEMORY_WINDOW` (default: 50)
    /// - `MEMORY_SCROLL_LIMIT` (default: 100)
    /// - `RRF_K` (default: 60)
    /// - `CONTEXT_CAP` (default: 5)
    /// - `KNOWLEDGE_LIMIT` (default: 10)
    /// - `KNOWLEDGE_PAYLOAD_KEYS` (default: "text,source")
    /// - `INGEST_BATCH_SIZE` (default: 100)
    /// - `INGEST_CONCURRENCY` (default: 4)
    /// - `CHUNK_SIZE` (default: 512)
    /// - `CHUNK_OVERLAP` (default: 50)
    /// - `INDEX_TIMEOUT_SECS` (default: 30)
    /// - `PIPELINE_TIMEOUT_SECS` (default: 60)
    pub fn from_env() -> Result<Self, RagError> {
        let d = Self::new_default(
            std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6334".into()),
        );

        let payload_keys = std::env::var("KNOWLEDGE_PAYLOAD_KEYS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or(d.knowledge_payload_keys);

        let cfg = Self {
            backend: VectorBackend::from_env(std::env::var("VECTOR_BACKEND").ok())?,
            qdrant_url: d.qdrant_url,
            qdrant_api_key: std::env::var("QDRANT_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            dense_vector_name: std::env::var("DENSE_VECTOR_NAME")
                .unwrap_or(d.dense_vector_name),
            sparse_vector_name: std::env::var("SPARSE_VECTOR_NAME")
                .unwrap_or(d.sparse_vector_name),
            embedding_dim: read_env("EMBEDDING_DIM", d.embedding_dim)?,
            memory_window: read_env("MEMORY_WINDOW", d.memory_window)?,
            memory_scroll_limit: read_env("MEMORY_SCROLL_LIMIT", d.memory_scroll_limit)?,
            rrf_k: read_env("RRF_K", d.rrf_k)?,
            context_cap: read_env("CONTEXT_CAP", d.context_cap)?,
            knowledge_limit: read_env("KNOWLEDGE_LIMIT", d.knowledge_limit)?,
            knowledge_payload_keys: payload_keys,
            ingest_batch_size: read_env("INGEST_BATCH_SIZE", d.ingest_batch_size)?,
            ingest_concurrency: read_env("INGEST_CONCURRENCY", d.ingest_concurrency)?,
            chunk_size: read_env("CHUNK_SIZE", d.chunk_size)?,
            chunk_overlap: read_env("CHUNK_OVERLAP", d.chunk_overlap)?,
            index_timeout: Duration::from_secs(read_env("INDEX_TIMEOUT_SECS", 30u64)?),
            pipeline_timeout: Duration::from_secs(read_env("PIPELINE_TIMEOUT_SECS", 60u64)?),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.backend == VectorBackend::Qdrant && self.qdrant_url.trim().is_empty() {
            return Err(RagError::Config("qdrant_url is empty".into()));
        }
        if self.dense_vector_name.trim().is_empty() || self.sparse_vector_name.trim().is_empty() {
            return Err(RagError::Config("vector slot names must not be empty".into()));
        }
        if self.dense_vector_name == self.sparse_vector_name {
            return Err(RagError::Config(
                "dense and sparse vector slots must have different names".into(),
            ));
        }
        if self.embedding_dim == 0 {
            return Err(RagError::Config("embedding_dim must be > 0".into()));
        }
        if self.memory_window == 0 {
            return Err(RagError::Config("memory_window must be > 0".into()));
        }
        if self.memory_scroll_limit <= self.memory_window {
            return Err(RagError::Config(
                "memory_scroll_limit must exceed memory_window".into(),
            ));
        }
        if self.context_cap == 0 || self.knowledge_limit == 0 {
            return Err(RagError::Config(
                "context_cap and knowledge_limit must be > 0".into(),
            ));
        }
        if self.knowledge_payload_keys.is_empty() {
            return Err(RagError::Config("knowledge_payload_keys is empty".into()));
        }
        if self.ingest_batch_size == 0 || self.ingest_concurrency == 0 {
            return Err(RagError::Config(
                "ingest_batch_size and ingest_concurrency must be > 0".into(),
            ));
        }
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(
                "chunk_overlap must be smaller than a non-zero chunk_size".into(),
            ));
        }
        Ok(())
    }

    /// Vector layout used when creating collections.
    pub fn collection_spec(&self) -> CollectionSpec {
        CollectionSpec {
            dense_name: self.dense_vector_name.clone(),
            sparse_name: self.sparse_vector_name.clone(),
            dense_dim: self.embedding_dim,
        }
    }
}

/// Read a value from env, falling back to `default` when unset.
fn read_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, RagError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().parse::<T>().map_err(|_| RagError::EnvParse {
            key: key.into(),
            value: v,
        }),
        _ => Ok(default),
    }
}
