//! Reciprocal Rank Fusion of dense and sparse result lists.
//!
//! `score(id) = 1/(k + rank_dense) + 1/(k + rank_sparse)`, with 1-based
//! ranks taken after sorting each list by score descending. An id missing
//! from a list is ranked `len + 1` in that list. Raw scores never mix, so
//! cosine and sparse dot products may live on different scales.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::errors::RagError;
use crate::memory::BLOCK_SEPARATOR;
use crate::record::{Payload, ScoredHit};

/// TREC-conventional damping constant.
pub const DEFAULT_RRF_K: u32 = 60;

/// One selected point with its fused score and rendered block.
#[derive(Clone, Debug, PartialEq)]
pub struct FusedEntry {
    pub id: String,
    pub score: f64,
    pub block: String,
}

/// Fused context, best first, capped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FusedContext {
    pub entries: Vec<FusedEntry>,
}

impl FusedContext {
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn blocks(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.block.as_str()).collect()
    }

    pub fn render(&self) -> String {
        self.blocks().join(BLOCK_SEPARATOR)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate(list: &[ScoredHit], name: &str) -> Result<(), RagError> {
    let mut seen = HashSet::with_capacity(list.len());
    for hit in list {
        if !hit.score.is_finite() {
            return Err(RagError::FusionInputMismatch(format!(
                "{name} list: non-finite score for id {}",
                hit.id
            )));
        }
        if !seen.insert(hit.id.as_str()) {
            return Err(RagError::FusionInputMismatch(format!(
                "{name} list: duplicate id {}",
                hit.id
            )));
        }
    }
    Ok(())
}

/// 1-based rank per id after a stable sort by score descending.
fn rank_map(list: &[ScoredHit]) -> HashMap<&str, usize> {
    let mut order: Vec<&ScoredHit> = list.iter().collect();
    order.sort_by(|a, b| b.score.total_cmp(&a.score));
    order
        .into_iter()
        .enumerate()
        .map(|(i, hit)| (hit.id.as_str(), i + 1))
        .collect()
}

/// Fused score for every id of either list, in first-encounter order
/// (dense list as given, then sparse).
pub fn rrf_scores(
    dense: &[ScoredHit],
    sparse: &[ScoredHit],
    k: u32,
) -> Result<Vec<(String, f64)>, RagError> {
    validate(dense, "dense")?;
    validate(sparse, "sparse")?;

    let dense_ranks = rank_map(dense);
    let sparse_ranks = rank_map(sparse);
    let dense_missing = dense.len() + 1;
    let sparse_missing = sparse.len() + 1;
    let k = f64::from(k);

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for hit in dense.iter().chain(sparse) {
        if !seen.insert(hit.id.as_str()) {
            continue;
        }
        let rd = dense_ranks.get(hit.id.as_str()).copied().unwrap_or(dense_missing);
        let rs = sparse_ranks.get(hit.id.as_str()).copied().unwrap_or(sparse_missing);
        let score = 1.0 / (k + rd as f64) + 1.0 / (k + rs as f64);
        out.push((hit.id.clone(), score));
    }
    Ok(out)
}

/// Merges both lists and renders the top `result_cap` points.
///
/// Each block is `Context {i}:` followed by one `key: value` line per
/// payload key, in the order given. Equal fused scores keep
/// first-encounter order.
///
/// # Errors
/// `FusionInputMismatch` if a list repeats an id or carries a non-finite score.
pub fn fuse(
    dense: &[ScoredHit],
    sparse: &[ScoredHit],
    result_cap: usize,
    payload_keys: &[String],
    k: u32,
) -> Result<FusedContext, RagError> {
    let mut scored = rrf_scores(dense, sparse, k)?;
    let candidates = scored.len();

    // stable: ties stay in first-encounter order
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(result_cap);

    let mut payloads: HashMap<&str, &Payload> = HashMap::new();
    for hit in dense.iter().chain(sparse) {
        payloads.entry(hit.id.as_str()).or_insert(&hit.payload);
    }

    let entries = scored
        .into_iter()
        .enumerate()
        .map(|(i, (id, score))| {
            let payload = payloads.get(id.as_str()).copied();
            let block = render_block(i + 1, payload, payload_keys);
            FusedEntry { id, score, block }
        })
        .collect::<Vec<_>>();

    debug!(
        target: "rag_memory::fusion",
        candidates,
        selected = entries.len(),
        k,
        "rank fusion complete"
    );
    Ok(FusedContext { entries })
}

fn render_block(position: usize, payload: Option<&Payload>, keys: &[String]) -> String {
    let lines: Vec<String> = keys
        .iter()
        .map(|key| {
            let value = payload
                .and_then(|p| p.get(key))
                .map(|v| v.render())
                .unwrap_or_default();
            format!("{key}: {value}")
        })
        .collect();
    format!("Context {position}:\n{}", lines.join("\n"))
}
