//! Embedder: dense + sparse vectors for one text.
//!
//! The model host is injected explicitly via [`Embedder::load`] and released
//! via [`Embedder::release`]; there is no process-wide model state.

pub mod splade;

use std::sync::{Arc, RwLock};

use model_host::{ModelHost, ModelHostError};
use tokio::task::{JoinHandle, spawn_blocking};
use tracing::{debug, info, instrument};

use crate::errors::RagError;
use crate::record::{Embedding, SparseVector};

/// Computes dense and sparse embeddings through a loaded [`ModelHost`].
pub struct Embedder {
    host: RwLock<Option<Arc<dyn ModelHost>>>,
    dense_dim: usize,
}

impl Embedder {
    /// Creates an unloaded embedder expecting `dense_dim`-sized vectors.
    pub fn new(dense_dim: usize) -> Self {
        Self {
            host: RwLock::new(None),
            dense_dim,
        }
    }

    pub fn dense_dim(&self) -> usize {
        self.dense_dim
    }

    /// Installs the model host. Replaces a previously loaded one.
    ///
    /// # Errors
    /// Returns `RagError::VectorSizeMismatch` if the host's dense dimension
    /// differs from the configured one.
    pub fn load(&self, host: Arc<dyn ModelHost>) -> Result<(), RagError> {
        if host.dense_dim() != self.dense_dim {
            return Err(RagError::VectorSizeMismatch {
                got: host.dense_dim(),
                want: self.dense_dim,
            });
        }
        let mut slot = self.host.write().unwrap_or_else(|p| p.into_inner());
        *slot = Some(host);
        info!(target: "rag_memory::embed", dim = self.dense_dim, "embedding models loaded");
        Ok(())
    }

    /// Unloads the model host and hands it back to the caller.
    ///
    /// Blocking hosts should be dropped on a blocking thread.
    pub fn release(&self) -> Option<Arc<dyn ModelHost>> {
        let mut slot = self.host.write().unwrap_or_else(|p| p.into_inner());
        let prev = slot.take();
        if prev.is_some() {
            info!(target: "rag_memory::embed", "embedding models released");
        }
        prev
    }

    pub fn is_loaded(&self) -> bool {
        self.host
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    fn handle(&self) -> Result<Arc<dyn ModelHost>, RagError> {
        self.host
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or(RagError::EmbeddingUnavailable)
    }

    /// Embeds `text` into a dense vector and a sparse lexical vector.
    ///
    /// Both model calls run concurrently on blocking workers and are joined
    /// before returning.
    ///
    /// # Errors
    /// - `EmptyInput` for empty/whitespace text
    /// - `EmbeddingUnavailable` if no host is loaded
    /// - `VectorSizeMismatch` if the dense vector has the wrong length
    #[instrument(skip_all, fields(chars = text.len()))]
    pub async fn embed(&self, text: &str) -> Result<Embedding, RagError> {
        if text.trim().is_empty() {
            return Err(RagError::EmptyInput);
        }
        let host = self.handle()?;

        let dense_task = {
            let host = Arc::clone(&host);
            let text = text.to_string();
            spawn_blocking(move || host.encode(&text))
        };
        let sparse_task = {
            let text = text.to_string();
            spawn_blocking(move || -> Result<SparseVector, ModelHostError> {
                let scores = host.score(&text)?;
                Ok(splade::max_pool(&scores))
            })
        };

        let (dense, sparse) = tokio::try_join!(joined(dense_task), joined(sparse_task))?;

        if dense.len() != self.dense_dim {
            return Err(RagError::VectorSizeMismatch {
                got: dense.len(),
                want: self.dense_dim,
            });
        }

        debug!(target: "rag_memory::embed", sparse_nnz = sparse.len(), "embedded text");
        Ok(Embedding { dense, sparse })
    }
}

async fn joined<T>(task: JoinHandle<Result<T, ModelHostError>>) -> Result<T, RagError> {
    Ok(task.await??)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeModelHost;

    fn loaded() -> Embedder {
        let e = Embedder::new(FakeModelHost::DIM);
        e.load(Arc::new(FakeModelHost::default())).unwrap();
        e
    }

    #[tokio::test]
    async fn unloaded_embedder_is_unavailable() {
        let e = Embedder::new(FakeModelHost::DIM);
        assert!(!e.is_loaded());
        assert!(matches!(
            e.embed("hello").await,
            Err(RagError::EmbeddingUnavailable)
        ));
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_the_model() {
        let e = loaded();
        assert!(matches!(e.embed("   \n").await, Err(RagError::EmptyInput)));
    }

    #[tokio::test]
    async fn embedding_is_deterministic() {
        let e = loaded();
        let a = e.embed("rust memory window").await.unwrap();
        let b = e.embed("rust memory window").await.unwrap();
        assert_eq!(a.dense.len(), FakeModelHost::DIM);
        let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a.dense), bits(&b.dense));
        assert_eq!(a.sparse, b.sparse);
    }

    #[tokio::test]
    async fn sparse_indices_unique_and_values_positive() {
        let e = loaded();
        let emb = e.embed("the quick brown fox jumps over the lazy dog").await.unwrap();
        assert!(!emb.sparse.is_empty());
        let mut idx = emb.sparse.indices.clone();
        idx.sort_unstable();
        idx.dedup();
        assert_eq!(idx.len(), emb.sparse.indices.len());
        assert!(emb.sparse.values.iter().all(|v| *v > 0.0));
    }

    #[tokio::test]
    async fn release_unloads_the_host() {
        let e = loaded();
        assert!(e.release().is_some());
        assert!(!e.is_loaded());
        assert!(e.release().is_none());
        assert!(matches!(e.embed("x").await, Err(RagError::EmbeddingUnavailable)));
    }

    #[test]
    fn load_checks_dimension() {
        let e = Embedder::new(FakeModelHost::DIM + 1);
        assert!(matches!(
            e.load(Arc::new(FakeModelHost::default())),
            Err(RagError::VectorSizeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn model_failure_surfaces_as_model_host_error() {
        let e = Embedder::new(FakeModelHost::DIM);
        e.load(Arc::new(FakeModelHost::failing())).unwrap();
        assert!(matches!(e.embed("hello").await, Err(RagError::ModelHost(_))));
    }
}
