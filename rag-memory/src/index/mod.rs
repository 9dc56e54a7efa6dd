//! Vector index capability interface.
//!
//! The engine only talks to [`VectorIndex`]; [`QdrantFacade`] is the
//! production adapter and [`InMemoryIndex`] a process-local one.

mod in_memory;
mod qdrant_facade;

pub use in_memory::InMemoryIndex;
pub use qdrant_facade::QdrantFacade;

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::errors::RagError;
use crate::record::{EmbeddingPoint, ScoredHit, SparseVector, StoredPoint};

/// Layout of a collection: one dense (cosine) slot and one sparse slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionSpec {
    pub dense_name: String,
    pub sparse_name: String,
    pub dense_dim: usize,
}

/// Query against one named vector slot.
#[derive(Clone, Debug)]
pub enum QueryVector {
    Dense(Vec<f32>),
    Sparse(SparseVector),
}

impl QueryVector {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryVector::Dense(_) => "dense",
            QueryVector::Sparse(_) => "sparse",
        }
    }
}

/// Remote vector index contract.
///
/// Implementations map transport/server failures to
/// `RagError::IndexUnreachable`.
pub trait VectorIndex: Send + Sync {
    fn collection_exists<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<bool, RagError>>;

    /// Creates the collection with both vector slots. Fails if it exists.
    fn create_collection<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<(), RagError>>;

    /// Deletes the collection; `Ok(false)` if it was absent.
    fn delete_collection<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<bool, RagError>>;

    /// Inserts or replaces points; returns how many were written.
    fn upsert<'a>(
        &'a self,
        collection: &'a str,
        points: Vec<EmbeddingPoint>,
    ) -> BoxFuture<'a, Result<usize, RagError>>;

    /// Lists up to `limit` points with payload. No ordering guarantee.
    fn scroll<'a>(
        &'a self,
        collection: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<StoredPoint>, RagError>>;

    fn delete_points<'a>(
        &'a self,
        collection: &'a str,
        ids: Vec<String>,
    ) -> BoxFuture<'a, Result<(), RagError>>;

    /// Similarity query against one named slot, best first, payload included.
    fn query<'a>(
        &'a self,
        collection: &'a str,
        vector: QueryVector,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<ScoredHit>, RagError>>;

    fn count<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<u64, RagError>>;
}

/// Create-if-absent. Tolerates losing a creation race to another caller.
pub async fn ensure_collection(index: &dyn VectorIndex, collection: &str) -> Result<(), RagError> {
    if index.collection_exists(collection).await? {
        debug!(target: "rag_memory::index", collection, "collection already exists");
        return Ok(());
    }

    match index.create_collection(collection).await {
        Ok(()) => {
            info!(target: "rag_memory::index", collection, "collection created");
            Ok(())
        }
        Err(err) => {
            if index.collection_exists(collection).await? {
                debug!(
                    target: "rag_memory::index",
                    collection,
                    "collection created concurrently by another caller"
                );
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn spec() -> CollectionSpec {
        CollectionSpec {
            dense_name: "text-embedding".into(),
            sparse_name: "sparse-embedding".into(),
            dense_dim: 4,
        }
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let index = InMemoryIndex::new(spec());
        ensure_collection(&index, "u1").await.unwrap();
        ensure_collection(&index, "u1").await.unwrap();
        assert!(index.collection_exists("u1").await.unwrap());
    }

    /// Reports the collection absent until `create_collection` has been
    /// attempted once; creation itself always fails as if another caller
    /// got there first. With `created_elsewhere` unset the collection never
    /// appears.
    struct LostRace {
        created_elsewhere: bool,
        create_calls: AtomicUsize,
    }

    impl LostRace {
        fn new(created_elsewhere: bool) -> Self {
            Self {
                created_elsewhere,
                create_calls: AtomicUsize::new(0),
            }
        }
    }

    impl VectorIndex for LostRace {
        fn collection_exists<'a>(&'a self, _collection: &'a str) -> BoxFuture<'a, Result<bool, RagError>> {
            let tried = self.create_calls.load(Ordering::SeqCst) > 0;
            Box::pin(async move { Ok(self.created_elsewhere && tried) })
        }

        fn create_collection<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<(), RagError>> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                Err(RagError::IndexUnreachable(format!(
                    "Collection `{collection}` already exists!"
                )))
            })
        }

        fn delete_collection<'a>(&'a self, _collection: &'a str) -> BoxFuture<'a, Result<bool, RagError>> {
            Box::pin(async { Ok(false) })
        }

        fn upsert<'a>(
            &'a self,
            _collection: &'a str,
            points: Vec<EmbeddingPoint>,
        ) -> BoxFuture<'a, Result<usize, RagError>> {
            Box::pin(async move { Ok(points.len()) })
        }

        fn scroll<'a>(
            &'a self,
            _collection: &'a str,
            _limit: usize,
        ) -> BoxFuture<'a, Result<Vec<StoredPoint>, RagError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn delete_points<'a>(
            &'a self,
            _collection: &'a str,
            _ids: Vec<String>,
        ) -> BoxFuture<'a, Result<(), RagError>> {
            Box::pin(async { Ok(()) })
        }

        fn query<'a>(
            &'a self,
            _collection: &'a str,
            _vector: QueryVector,
            _limit: usize,
        ) -> BoxFuture<'a, Result<Vec<ScoredHit>, RagError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn count<'a>(&'a self, _collection: &'a str) -> BoxFuture<'a, Result<u64, RagError>> {
            Box::pin(async { Ok(0) })
        }
    }

    #[tokio::test]
    async fn ensure_accepts_collection_created_by_another_caller() {
        let index = LostRace::new(true);
        ensure_collection(&index, "u2").await.unwrap();
        assert_eq!(index.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ensure_propagates_create_error_when_still_absent() {
        let index = LostRace::new(false);
        let res = ensure_collection(&index, "u3").await;
        assert!(matches!(res, Err(RagError::IndexUnreachable(ref msg)) if msg.contains("u3")));
        assert_eq!(index.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_ensure_on_in_memory_index() {
        let index = InMemoryIndex::new(spec());
        let (a, b) = tokio::join!(
            ensure_collection(&index, "u4"),
            ensure_collection(&index, "u4")
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
    }
}
