//! Dense + sparse similarity search over one collection.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::embed::Embedder;
use crate::errors::RagError;
use crate::index::{QueryVector, VectorIndex};
use crate::record::{Embedding, HybridResults, ScoredHit};

pub struct HybridSearch {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<Embedder>,
}

impl HybridSearch {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<Embedder>) -> Self {
        Self { index, embedder }
    }

    /// Embeds `text` once and runs both slot queries concurrently.
    ///
    /// Both lists are returned unmerged, best first, each capped at `limit`.
    /// A text whose sparse vector is empty yields an empty sparse list.
    ///
    /// # Errors
    /// - `EmptyQuery` for blank text, before any model or network call
    /// - `QueryFailed` when either index query fails
    /// - embedder errors unchanged
    #[instrument(skip_all, fields(collection = %collection, limit = limit))]
    pub async fn query(
        &self,
        text: &str,
        collection: &str,
        limit: usize,
    ) -> Result<HybridResults, RagError> {
        if text.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }
        if limit == 0 {
            return Ok(HybridResults::default());
        }

        let Embedding { dense, sparse } = self.embedder.embed(text).await?;

        let dense_q = self.run(collection, QueryVector::Dense(dense), limit);
        let sparse_q = async move {
            if sparse.is_empty() {
                return Ok(Vec::new());
            }
            self.run(collection, QueryVector::Sparse(sparse), limit).await
        };

        let (dense, sparse) = tokio::try_join!(dense_q, sparse_q)?;

        debug!(
            target: "rag_memory::search",
            collection,
            dense_hits = dense.len(),
            sparse_hits = sparse.len(),
            "hybrid query complete"
        );
        Ok(HybridResults { dense, sparse })
    }

    async fn run(
        &self,
        collection: &str,
        vector: QueryVector,
        limit: usize,
    ) -> Result<Vec<ScoredHit>, RagError> {
        let kind = vector.kind();
        self.index
            .query(collection, vector, limit)
            .await
            .map_err(|e| RagError::QueryFailed {
                collection: collection.to_string(),
                reason: format!("{kind} query: {e}"),
            })
    }
}
