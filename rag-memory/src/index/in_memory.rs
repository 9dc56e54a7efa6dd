//! Process-local [`VectorIndex`] for offline runs and tests.
//!
//! Mirrors the observable contract of the remote index: exact cosine
//! search on the dense slot, dot product on the sparse slot, scroll in id
//! order (not timestamp order).

use std::collections::{BTreeMap, HashMap};

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::errors::RagError;
use crate::index::{CollectionSpec, QueryVector, VectorIndex};
use crate::record::{EmbeddingPoint, ScoredHit, StoredPoint};

type Points = BTreeMap<String, EmbeddingPoint>;

pub struct InMemoryIndex {
    spec: CollectionSpec,
    collections: RwLock<HashMap<String, Points>>,
}

impl InMemoryIndex {
    pub fn new(spec: CollectionSpec) -> Self {
        Self {
            spec,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn missing(collection: &str) -> RagError {
        RagError::IndexUnreachable(format!("Collection `{collection}` doesn't exist"))
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

impl VectorIndex for InMemoryIndex {
    fn collection_exists<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<bool, RagError>> {
        Box::pin(async move { Ok(self.collections.read().await.contains_key(collection)) })
    }

    fn create_collection<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<(), RagError>> {
        Box::pin(async move {
            let mut all = self.collections.write().await;
            if all.contains_key(collection) {
                return Err(RagError::IndexUnreachable(format!(
                    "Collection `{collection}` already exists"
                )));
            }
            all.insert(collection.to_string(), Points::new());
            Ok(())
        })
    }

    fn delete_collection<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<bool, RagError>> {
        Box::pin(async move { Ok(self.collections.write().await.remove(collection).is_some()) })
    }

    fn upsert<'a>(
        &'a self,
        collection: &'a str,
        points: Vec<EmbeddingPoint>,
    ) -> BoxFuture<'a, Result<usize, RagError>> {
        Box::pin(async move {
            if let Some(bad) = points.iter().find(|p| p.dense.len() != self.spec.dense_dim) {
                return Err(RagError::VectorSizeMismatch {
                    got: bad.dense.len(),
                    want: self.spec.dense_dim,
                });
            }
            let mut all = self.collections.write().await;
            let coll = all
                .get_mut(collection)
                .ok_or_else(|| Self::missing(collection))?;
            let n = points.len();
            for p in points {
                coll.insert(p.id.clone(), p);
            }
            Ok(n)
        })
    }

    fn scroll<'a>(
        &'a self,
        collection: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<StoredPoint>, RagError>> {
        Box::pin(async move {
            let all = self.collections.read().await;
            let coll = all.get(collection).ok_or_else(|| Self::missing(collection))?;
            Ok(coll
                .values()
                .take(limit)
                .map(|p| StoredPoint {
                    id: p.id.clone(),
                    payload: p.payload.clone(),
                })
                .collect())
        })
    }

    fn delete_points<'a>(
        &'a self,
        collection: &'a str,
        ids: Vec<String>,
    ) -> BoxFuture<'a, Result<(), RagError>> {
        Box::pin(async move {
            let mut all = self.collections.write().await;
            let coll = all
                .get_mut(collection)
                .ok_or_else(|| Self::missing(collection))?;
            for id in ids {
                coll.remove(&id);
            }
            Ok(())
        })
    }

    fn query<'a>(
        &'a self,
        collection: &'a str,
        vector: QueryVector,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<ScoredHit>, RagError>> {
        Box::pin(async move {
            let all = self.collections.read().await;
            let coll = all.get(collection).ok_or_else(|| Self::missing(collection))?;

            let mut hits: Vec<ScoredHit> = match &vector {
                QueryVector::Dense(q) => {
                    if q.len() != self.spec.dense_dim {
                        return Err(RagError::VectorSizeMismatch {
                            got: q.len(),
                            want: self.spec.dense_dim,
                        });
                    }
                    coll.values()
                        .map(|p| ScoredHit {
                            id: p.id.clone(),
                            score: cosine(q, &p.dense),
                            payload: p.payload.clone(),
                        })
                        .collect()
                }
                // only points sharing at least one index match
                QueryVector::Sparse(q) => coll
                    .values()
                    .filter(|p| p.sparse.indices.iter().any(|i| q.indices.contains(i)))
                    .map(|p| ScoredHit {
                        id: p.id.clone(),
                        score: q.dot(&p.sparse),
                        payload: p.payload.clone(),
                    })
                    .collect(),
            };

            hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
            hits.truncate(limit);
            Ok(hits)
        })
    }

    fn count<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<u64, RagError>> {
        Box::pin(async move {
            let all = self.collections.read().await;
            let coll = all.get(collection).ok_or_else(|| Self::missing(collection))?;
            Ok(coll.len() as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Payload, SparseVector};

    fn spec() -> CollectionSpec {
        CollectionSpec {
            dense_name: "text-embedding".into(),
            sparse_name: "sparse-embedding".into(),
            dense_dim: 2,
        }
    }

    fn point(id: &str, dense: [f32; 2], idx: Vec<u32>) -> EmbeddingPoint {
        let values = vec![1.0; idx.len()];
        EmbeddingPoint {
            id: id.into(),
            dense: dense.to_vec(),
            sparse: SparseVector::new(idx, values).unwrap(),
            payload: Payload::new(),
        }
    }

    #[tokio::test]
    async fn operations_on_missing_collection_fail() {
        let index = InMemoryIndex::new(spec());
        assert!(matches!(
            index.scroll("nope", 10).await,
            Err(RagError::IndexUnreachable(_))
        ));
        assert!(!index.delete_collection("nope").await.unwrap());
    }

    #[tokio::test]
    async fn dense_query_ranks_by_cosine() {
        let index = InMemoryIndex::new(spec());
        index.create_collection("c").await.unwrap();
        index
            .upsert(
                "c",
                vec![
                    point("a", [1.0, 0.0], vec![1]),
                    point("b", [0.7, 0.7], vec![2]),
                    point("c", [0.0, 1.0], vec![3]),
                ],
            )
            .await
            .unwrap();

        let hits = index
            .query("c", QueryVector::Dense(vec![1.0, 0.1]), 2)
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn sparse_query_skips_disjoint_points() {
        let index = InMemoryIndex::new(spec());
        index.create_collection("c").await.unwrap();
        index
            .upsert(
                "c",
                vec![point("a", [1.0, 0.0], vec![1, 5]), point("b", [0.0, 1.0], vec![2])],
            )
            .await
            .unwrap();

        let q = SparseVector::new(vec![5], vec![2.0]).unwrap();
        let hits = index.query("c", QueryVector::Sparse(q), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert!((hits[0].score - 2.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let index = InMemoryIndex::new(spec());
        index.create_collection("c").await.unwrap();
        let mut p = point("a", [1.0, 0.0], vec![1]);
        p.dense.push(0.5);
        assert!(matches!(
            index.upsert("c", vec![p]).await,
            Err(RagError::VectorSizeMismatch { got: 3, want: 2 })
        ));
    }
}
