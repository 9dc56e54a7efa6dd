//! Thin adapter around `qdrant-client` to isolate API usage.
//!
//! All Qdrant builders live here; the rest of the crate only sees
//! [`VectorIndex`] and the crate's own record types.

use std::collections::HashMap;

use futures::future::BoxFuture;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, NamedVectors,
    PointId, PointStruct, PointsIdsList, Query, QueryPointsBuilder, ScrollPointsBuilder,
    SparseVectorParamsBuilder, SparseVectorsConfigBuilder, UpsertPointsBuilder, Value as QValue,
    Vector, VectorInput, VectorParamsBuilder, VectorsConfigBuilder,
};
use qdrant_client::{Payload as QPayload, Qdrant};
use tracing::{debug, info, warn};

use crate::config::RagMemoryConfig;
use crate::errors::RagError;
use crate::index::{CollectionSpec, QueryVector, VectorIndex};
use crate::record::{EmbeddingPoint, Payload, PayloadValue, ScoredHit, StoredPoint};

/// Qdrant-backed [`VectorIndex`].
pub struct QdrantFacade {
    client: Qdrant,
    spec: CollectionSpec,
}

impl QdrantFacade {
    /// Builds the gRPC client. No network traffic happens until the first call.
    pub fn new(cfg: &RagMemoryConfig) -> Result<Self, RagError> {
        cfg.validate()?;

        let mut builder = Qdrant::from_url(&cfg.qdrant_url).timeout(cfg.index_timeout);
        if let Some(key) = &cfg.qdrant_api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder.build()?;

        info!(
            target: "rag_memory::index",
            url = %cfg.qdrant_url,
            dense = %cfg.dense_vector_name,
            sparse = %cfg.sparse_vector_name,
            dim = cfg.embedding_dim,
            "qdrant client ready"
        );

        Ok(Self {
            client,
            spec: cfg.collection_spec(),
        })
    }
}

impl VectorIndex for QdrantFacade {
    fn collection_exists<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<bool, RagError>> {
        Box::pin(async move { Ok(self.client.collection_exists(collection).await?) })
    }

    fn create_collection<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<(), RagError>> {
        Box::pin(async move {
            let mut dense = VectorsConfigBuilder::default();
            dense.add_named_vector_params(
                &self.spec.dense_name,
                VectorParamsBuilder::new(self.spec.dense_dim as u64, Distance::Cosine),
            );
            let mut sparse = SparseVectorsConfigBuilder::default();
            sparse.add_named_vector_params(&self.spec.sparse_name, SparseVectorParamsBuilder::default());

            self.client
                .create_collection(
                    CreateCollectionBuilder::new(collection)
                        .vectors_config(dense)
                        .sparse_vectors_config(sparse),
                )
                .await?;
            Ok(())
        })
    }

    fn delete_collection<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<bool, RagError>> {
        Box::pin(async move {
            if !self.client.collection_exists(collection).await? {
                return Ok(false);
            }
            let res = self.client.delete_collection(collection).await?;
            Ok(res.result)
        })
    }

    fn upsert<'a>(
        &'a self,
        collection: &'a str,
        points: Vec<EmbeddingPoint>,
    ) -> BoxFuture<'a, Result<usize, RagError>> {
        Box::pin(async move {
            if points.is_empty() {
                return Ok(0);
            }
            let n = points.len();
            let mut structs = Vec::with_capacity(n);
            for p in points {
                if p.dense.len() != self.spec.dense_dim {
                    return Err(RagError::VectorSizeMismatch {
                        got: p.dense.len(),
                        want: self.spec.dense_dim,
                    });
                }
                let vectors = NamedVectors::default()
                    .add_vector(&self.spec.dense_name, Vector::new_dense(p.dense))
                    .add_vector(
                        &self.spec.sparse_name,
                        Vector::new_sparse(p.sparse.indices, p.sparse.values),
                    );
                structs.push(PointStruct::new(p.id, vectors, to_qpayload(&p.payload)));
            }

            self.client
                .upsert_points(UpsertPointsBuilder::new(collection, structs).wait(true))
                .await?;
            debug!(target: "rag_memory::index", collection, points = n, "upsert acknowledged");
            Ok(n)
        })
    }

    fn scroll<'a>(
        &'a self,
        collection: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<StoredPoint>, RagError>> {
        Box::pin(async move {
            let limit = u32::try_from(limit).unwrap_or(u32::MAX);
            let res = self
                .client
                .scroll(
                    ScrollPointsBuilder::new(collection)
                        .limit(limit)
                        .with_payload(true)
                        .with_vectors(false),
                )
                .await?;

            Ok(res
                .result
                .into_iter()
                .filter_map(|p| {
                    let id = point_id_string(p.id)?;
                    Some(StoredPoint {
                        id,
                        payload: from_qpayload(p.payload),
                    })
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
            if ids.is_empty() {
                return Ok(());
            }
            let ids: Vec<PointId> = ids.into_iter().map(PointId::from).collect();
            self.client
                .delete_points(
                    DeletePointsBuilder::new(collection)
                        .points(PointsIdsList { ids })
                        .wait(true),
                )
                .await?;
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
            let (input, using) = match vector {
                QueryVector::Dense(v) => {
                    if v.len() != self.spec.dense_dim {
                        return Err(RagError::VectorSizeMismatch {
                            got: v.len(),
                            want: self.spec.dense_dim,
                        });
                    }
                    (VectorInput::from(v), &self.spec.dense_name)
                }
                QueryVector::Sparse(s) => (
                    VectorInput::new_sparse(s.indices, s.values),
                    &self.spec.sparse_name,
                ),
            };

            let res = self
                .client
                .query(
                    QueryPointsBuilder::new(collection)
                        .query(Query::new_nearest(input))
                        .using(using)
                        .limit(limit as u64)
                        .with_payload(true),
                )
                .await?;

            let mut out = Vec::with_capacity(res.result.len());
            for p in res.result {
                match point_id_string(p.id) {
                    Some(id) => out.push(ScoredHit {
                        id,
                        score: p.score,
                        payload: from_qpayload(p.payload),
                    }),
                    None => warn!(target: "rag_memory::index", collection, "hit without id skipped"),
                }
            }
            Ok(out)
        })
    }

    fn count<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<u64, RagError>> {
        Box::pin(async move {
            let res = self
                .client
                .count(CountPointsBuilder::new(collection).exact(true))
                .await?;
            Ok(res.result.map(|r| r.count).unwrap_or(0))
        })
    }
}

fn point_id_string(id: Option<PointId>) -> Option<String> {
    match id?.point_id_options? {
        PointIdOptions::Uuid(s) => Some(s),
        PointIdOptions::Num(n) => Some(n.to_string()),
    }
}

fn to_qpayload(payload: &Payload) -> QPayload {
    let mut out = QPayload::new();
    for (k, v) in payload {
        match v {
            PayloadValue::Text(s) => out.insert(k.as_str(), s.clone()),
            PayloadValue::List(items) => out.insert(k.as_str(), items.clone()),
        }
    }
    out
}

/// Maps a Qdrant payload back to string/list values.
///
/// Scalars are stringified; nested structs and nulls are dropped.
fn from_qpayload(p: HashMap<String, QValue>) -> Payload {
    let mut out = Payload::new();
    for (k, v) in p {
        if let Some(value) = scalar_or_list(v) {
            out.insert(k, value);
        }
    }
    out
}

fn scalar_or_list(v: QValue) -> Option<PayloadValue> {
    match v.kind? {
        Kind::ListValue(list) => Some(PayloadValue::List(
            list.values.into_iter().filter_map(scalar_string).collect(),
        )),
        other => scalar_string(QValue { kind: Some(other) }).map(PayloadValue::Text),
    }
}

fn scalar_string(v: QValue) -> Option<String> {
    match v.kind? {
        Kind::StringValue(s) => Some(s),
        Kind::IntegerValue(i) => Some(i.to_string()),
        Kind::DoubleValue(f) => Some(f.to_string()),
        Kind::BoolValue(b) => Some(b.to_string()),
        _ => None,
    }
}
