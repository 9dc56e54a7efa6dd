//! Knowledge-base ingestion: chunk documents, embed chunks, upsert in batches.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RagMemoryConfig;
use crate::embed::Embedder;
use crate::errors::RagError;
use crate::index::{VectorIndex, ensure_collection};
use crate::record::{
    EmbeddingPoint, IngestStats, KnowledgeDocument, Payload, format_timestamp, keys,
};

/// Chunking and batching knobs for [`ingest_documents`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IngestOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    pub concurrency: usize,
}

impl From<&RagMemoryConfig> for IngestOptions {
    fn from(cfg: &RagMemoryConfig) -> Self {
        Self {
            chunk_size: cfg.chunk_size,
            chunk_overlap: cfg.chunk_overlap,
            batch_size: cfg.ingest_batch_size,
            concurrency: cfg.ingest_concurrency,
        }
    }
}

/// Splits `text` into chunks of at most `chunk_size` characters.
///
/// Cuts prefer a paragraph break, then a line break, then whitespace,
/// searched in the second half of the window; otherwise the cut is hard.
/// Consecutive chunks share up to `overlap` characters. Chunks are trimmed
/// and empty ones dropped.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    if chunk_size == 0 || n == 0 {
        return Vec::new();
    }
    let overlap = overlap.min(chunk_size - 1);

    let mut out = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(n);
        let cut = if end == n {
            n
        } else {
            best_cut(&chars, start + chunk_size / 2, end).unwrap_or(end)
        };

        let chunk: String = chars[start..cut].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            out.push(chunk.to_string());
        }
        if cut >= n {
            break;
        }

        let next = cut.saturating_sub(overlap);
        start = if next > start { next } else { cut };
    }
    out
}

/// Position just after the last preferred separator inside `(lo, hi]`.
fn best_cut(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    let window = lo..hi;

    let paragraph = (lo..hi.saturating_sub(1))
        .rev()
        .find(|&i| chars[i] == '\n' && chars[i + 1] == '\n')
        .map(|i| i + 2);
    if paragraph.is_some() {
        return paragraph;
    }
    let line = window.clone().rev().find(|&i| chars[i] == '\n').map(|i| i + 1);
    if line.is_some() {
        return line;
    }
    window.rev().find(|&i| chars[i].is_whitespace()).map(|i| i + 1)
}

/// Embeds and upserts every chunk of `documents` into `collection`.
///
/// A chunk that fails to embed is logged and counted in `failed`; a
/// failed batch upsert aborts the run.
pub async fn ingest_documents(
    index: &dyn VectorIndex,
    embedder: &Embedder,
    collection: &str,
    documents: &[KnowledgeDocument],
    opts: IngestOptions,
) -> Result<IngestStats, RagError> {
    let chunks: Vec<(usize, String, &str)> = documents
        .iter()
        .flat_map(|doc| {
            split_text(&doc.text, opts.chunk_size, opts.chunk_overlap)
                .into_iter()
                .map(move |c| (c, doc.source.as_str()))
        })
        .enumerate()
        .map(|(i, (c, s))| (i, c, s))
        .collect();

    let mut stats = IngestStats {
        chunks: chunks.len(),
        ..IngestStats::default()
    };
    info!(
        target: "rag_memory::index",
        collection,
        documents = documents.len(),
        chunks = stats.chunks,
        concurrency = opts.concurrency,
        "ingesting knowledge"
    );
    if chunks.is_empty() {
        return Ok(stats);
    }

    let timestamp = format_timestamp(Utc::now());
    let mut embedded: Vec<(usize, EmbeddingPoint)> = Vec::with_capacity(chunks.len());

    let results = stream::iter(chunks)
        .map(|(i, text, source)| async move {
            let res = embedder.embed(&text).await;
            (i, text, source, res)
        })
        .buffer_unordered(opts.concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    for (i, text, source, res) in results {
        match res {
            Ok(e) => {
                let mut payload = Payload::new();
                payload.insert(keys::TEXT.into(), text.into());
                payload.insert(keys::SOURCE.into(), source.into());
                payload.insert(keys::TIMESTAMP.into(), timestamp.clone().into());
                embedded.push((
                    i,
                    EmbeddingPoint {
                        id: Uuid::new_v4().to_string(),
                        dense: e.dense,
                        sparse: e.sparse,
                        payload,
                    },
                ));
            }
            Err(err) => {
                warn!(target: "rag_memory::index", chunk = i, source, error = %err, "chunk embedding failed");
                stats.failed += 1;
            }
        }
    }
    embedded.sort_by_key(|(i, _)| *i);

    if embedded.is_empty() {
        return Ok(stats);
    }

    ensure_collection(index, collection).await?;

    let mut points: Vec<EmbeddingPoint> = embedded.into_iter().map(|(_, p)| p).collect();
    let batch_size = opts.batch_size.max(1);
    let total_batches = points.len().div_ceil(batch_size);
    let mut batch_no = 0;
    while !points.is_empty() {
        let rest = points.split_off(batch_size.min(points.len()));
        let batch = std::mem::replace(&mut points, rest);
        batch_no += 1;
        stats.upserted += index.upsert(collection, batch).await?;
        debug!(target: "rag_memory::index", collection, batch = batch_no, total_batches, "batch upserted");
    }

    info!(
        target: "rag_memory::index",
        collection,
        upserted = stats.upserted,
        failed = stats.failed,
        "knowledge ingestion complete"
    );
    Ok(stats)
}
