//! Retrieval-augmented memory for a chat assistant.
//!
//! This crate provides:
//! - dense + sparse embeddings through an injected [`model_host::ModelHost`]
//! - a bounded per-user rolling memory window in a vector index
//! - hybrid (dense + sparse) queries against knowledge collections
//! - Reciprocal Rank Fusion of the two result lists into one context
//! - knowledge ingestion (chunk, embed, batch upsert)
//!
//! [`RagMemory`] wires everything from a [`RagMemoryConfig`]; the pieces are
//! also usable on their own.

mod config;
pub mod embed;
mod errors;
pub mod fusion;
mod hybrid;
pub mod index;
pub mod knowledge;
pub mod memory;
mod record;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use config::{RagMemoryConfig, VectorBackend};
pub use embed::Embedder;
pub use errors::RagError;
pub use fusion::{DEFAULT_RRF_K, FusedContext, FusedEntry, fuse};
pub use hybrid::HybridSearch;
pub use index::{CollectionSpec, InMemoryIndex, QdrantFacade, QueryVector, VectorIndex};
pub use knowledge::{IngestOptions, split_text};
pub use memory::{FIRST_MESSAGE_SENTINEL, IMAGE_PLACEHOLDER, MemoryHistory, MemoryWindow};
pub use record::{
    Embedding, EmbeddingPoint, HybridResults, IngestStats, KnowledgeDocument, Payload,
    PayloadValue, ScoredHit, SparseVector, StoredPoint, format_timestamp, keys,
};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use model_host::ModelHost;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Facade over the embedder, the vector index and the components built on them.
pub struct RagMemory {
    cfg: RagMemoryConfig,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<Embedder>,
    memory: MemoryWindow,
    search: HybridSearch,
}

impl RagMemory {
    /// Builds the engine with the index selected by `cfg.backend`.
    ///
    /// Models are not loaded; call [`RagMemory::load_models`] before use.
    ///
    /// # Errors
    /// `RagError::Config` on invalid configuration, `IndexUnreachable` if
    /// the Qdrant client cannot be built.
    pub fn new(cfg: RagMemoryConfig) -> Result<Self, RagError> {
        cfg.validate()?;
        let index: Arc<dyn VectorIndex> = match cfg.backend {
            VectorBackend::Qdrant => Arc::new(QdrantFacade::new(&cfg)?),
            VectorBackend::InMemory => Arc::new(InMemoryIndex::new(cfg.collection_spec())),
        };
        Self::with_index(cfg, index)
    }

    /// Builds the engine over an explicit index implementation.
    pub fn with_index(cfg: RagMemoryConfig, index: Arc<dyn VectorIndex>) -> Result<Self, RagError> {
        cfg.validate()?;
        trace!(backend = ?cfg.backend, window = cfg.memory_window, "RagMemory::with_index");

        let embedder = Arc::new(Embedder::new(cfg.embedding_dim));
        let memory = MemoryWindow::new(
            Arc::clone(&index),
            Arc::clone(&embedder),
            cfg.memory_window,
            cfg.memory_scroll_limit,
        );
        let search = HybridSearch::new(Arc::clone(&index), Arc::clone(&embedder));
        Ok(Self {
            cfg,
            index,
            embedder,
            memory,
            search,
        })
    }

    pub fn config(&self) -> &RagMemoryConfig {
        &self.cfg
    }

    pub fn embedder(&self) -> &Arc<Embedder> {
        &self.embedder
    }

    /// Installs the embedding models.
    pub fn load_models(&self, host: Arc<dyn ModelHost>) -> Result<(), RagError> {
        self.embedder.load(host)
    }

    /// Unloads the embedding models and returns them for disposal.
    pub fn release_models(&self) -> Option<Arc<dyn ModelHost>> {
        self.embedder.release()
    }

    pub async fn embed(&self, text: &str) -> Result<Embedding, RagError> {
        self.embedder.embed(text).await
    }

    /// Stores one exchange in `collection`; see [`MemoryWindow::record`].
    pub async fn record(
        &self,
        collection: &str,
        conversation_id: &str,
        user_text: &str,
        assistant_text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<String, RagError> {
        self.memory
            .record(collection, conversation_id, user_text, assistant_text, timestamp)
            .await
    }

    /// Fire-and-forget [`RagMemory::record`].
    ///
    /// Failures are logged and dropped; the handle only signals completion.
    pub fn record_in_background(
        self: &Arc<Self>,
        collection: String,
        conversation_id: String,
        user_text: String,
        assistant_text: String,
        timestamp: DateTime<Utc>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this
                .record(&collection, &conversation_id, &user_text, &assistant_text, timestamp)
                .await
            {
                Ok(id) => debug!(target: "rag_memory::memory", %collection, %id, "background record done"),
                Err(err) => warn!(
                    target: "rag_memory::memory",
                    %collection,
                    %conversation_id,
                    error = %err,
                    "background record failed"
                ),
            }
        })
    }

    /// Rendered history of `collection`; never fails.
    pub async fn recent(&self, collection: &str, limit: usize) -> MemoryHistory {
        self.memory.recent(collection, limit).await
    }

    pub async fn hybrid_query(
        &self,
        text: &str,
        collection: &str,
        limit: usize,
    ) -> Result<HybridResults, RagError> {
        self.search.query(text, collection, limit).await
    }

    /// Fuses hybrid results with the configured cap, payload keys and `k`.
    pub fn fuse(&self, results: &HybridResults) -> Result<FusedContext, RagError> {
        fuse(
            &results.dense,
            &results.sparse,
            self.cfg.context_cap,
            &self.cfg.knowledge_payload_keys,
            self.cfg.rrf_k,
        )
    }

    /// `hybrid_query` + `fuse` under the pipeline deadline.
    ///
    /// # Errors
    /// `RagError::Timeout` when the deadline elapses, otherwise the errors
    /// of the two stages.
    pub async fn retrieve_context(
        &self,
        text: &str,
        collection: &str,
    ) -> Result<FusedContext, RagError> {
        let deadline = self.cfg.pipeline_timeout;
        let pipeline = async {
            let results = self
                .hybrid_query(text, collection, self.cfg.knowledge_limit)
                .await?;
            self.fuse(&results)
        };
        match tokio::time::timeout(deadline, pipeline).await {
            Ok(res) => res,
            Err(_) => {
                warn!(target: "rag_memory::search", collection, ?deadline, "retrieval timed out");
                Err(RagError::Timeout(deadline))
            }
        }
    }

    pub async fn ingest_knowledge(
        &self,
        collection: &str,
        documents: &[KnowledgeDocument],
    ) -> Result<IngestStats, RagError> {
        knowledge::ingest_documents(
            self.index.as_ref(),
            &self.embedder,
            collection,
            documents,
            IngestOptions::from(&self.cfg),
        )
        .await
    }

    pub async fn forget_conversation(
        &self,
        collection: &str,
        conversation_id: &str,
    ) -> Result<usize, RagError> {
        self.memory
            .forget_conversation(collection, conversation_id)
            .await
    }

    pub async fn reconcile_window(&self, collection: &str) -> Result<usize, RagError> {
        self.memory.reconcile_window(collection).await
    }

    /// Deletes a whole collection (account deletion). `Ok(false)` if absent.
    pub async fn drop_collection(&self, collection: &str) -> Result<bool, RagError> {
        let dropped = self.index.delete_collection(collection).await?;
        info!(target: "rag_memory::index", collection, dropped, "drop collection");
        Ok(dropped)
    }

    /// Number of points in `collection`, 0 when absent.
    pub async fn count_points(&self, collection: &str) -> Result<u64, RagError> {
        if !self.index.collection_exists(collection).await? {
            return Ok(0);
        }
        self.index.count(collection).await
    }
}
