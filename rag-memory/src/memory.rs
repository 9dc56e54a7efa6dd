//! Rolling per-user conversation memory.
//!
//! A memory collection holds at most `window` points. `record` evicts the
//! single oldest point (timestamp ascending, then id ascending) before
//! inserting when the window is full. The check-then-evict-then-write
//! sequence is not atomic; concurrent writers to the same collection may
//! overflow the window until [`MemoryWindow::reconcile_window`] runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::embed::Embedder;
use crate::errors::RagError;
use crate::index::{VectorIndex, ensure_collection};
use crate::record::{EmbeddingPoint, Payload, StoredPoint, format_timestamp, keys, payload_str};

/// Returned by `recent` when a collection has no history.
pub const FIRST_MESSAGE_SENTINEL: &str = "This is user's first ever message";

/// Stored instead of an empty user message (image-only turns).
pub const IMAGE_PLACEHOLDER: &str = "*User sent an image";

/// Visible separator between rendered context blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Upper bound of points listed by full-collection sweeps.
pub const SWEEP_SCAN_LIMIT: usize = 10_000;

/// Result of `recent`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryHistory {
    /// No history: empty, absent or unreachable collection.
    FirstMessage,
    /// Rendered `Conversation {i}` blocks, oldest of the page first.
    Conversations(Vec<String>),
}

impl MemoryHistory {
    pub fn is_first_message(&self) -> bool {
        matches!(self, MemoryHistory::FirstMessage)
    }

    pub fn blocks(&self) -> &[String] {
        match self {
            MemoryHistory::FirstMessage => &[],
            MemoryHistory::Conversations(blocks) => blocks,
        }
    }

    /// Single string for prompt assembly.
    pub fn render(&self) -> String {
        match self {
            MemoryHistory::FirstMessage => FIRST_MESSAGE_SENTINEL.to_string(),
            MemoryHistory::Conversations(blocks) => blocks.join(BLOCK_SEPARATOR),
        }
    }
}

pub struct MemoryWindow {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<Embedder>,
    window: usize,
    scroll_limit: usize,
}

impl MemoryWindow {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<Embedder>,
        window: usize,
        scroll_limit: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            window,
            scroll_limit,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Stores one exchange, evicting the oldest point when the window is full.
    ///
    /// Returns the id of the new point.
    #[instrument(skip_all, fields(collection = %collection, conversation_id = %conversation_id))]
    pub async fn record(
        &self,
        collection: &str,
        conversation_id: &str,
        user_text: &str,
        assistant_text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<String, RagError> {
        let message = if user_text.trim().is_empty() {
            IMAGE_PLACEHOLDER
        } else {
            user_text
        };

        // embed before touching the index so a model failure evicts nothing
        let embedding = self.embedder.embed(message).await?;

        ensure_collection(self.index.as_ref(), collection).await?;

        let existing = self.index.scroll(collection, self.scroll_limit).await?;
        if existing.len() >= self.window {
            if let Some(oldest) = oldest_first(existing).into_iter().next() {
                debug!(
                    target: "rag_memory::memory",
                    collection,
                    id = %oldest.id,
                    timestamp = oldest.timestamp(),
                    "evicting oldest memory point"
                );
                self.index.delete_points(collection, vec![oldest.id]).await?;
            }
        }

        let mut payload = Payload::new();
        payload.insert(keys::CONVERSATION_ID.into(), conversation_id.into());
        payload.insert(keys::TIMESTAMP.into(), format_timestamp(timestamp).into());
        payload.insert(keys::USER_MESSAGE.into(), message.into());
        payload.insert(keys::BOT_RESPONSE.into(), assistant_text.into());

        let id = Uuid::new_v4().to_string();
        self.index
            .upsert(
                collection,
                vec![EmbeddingPoint {
                    id: id.clone(),
                    dense: embedding.dense,
                    sparse: embedding.sparse,
                    payload,
                }],
            )
            .await?;

        debug!(target: "rag_memory::memory", collection, %id, "memory point stored");
        Ok(id)
    }

    /// Lists up to `limit` points and renders them oldest first.
    ///
    /// Only the listed page is sorted, so with more than `limit` points
    /// this is not guaranteed to be the most recent `limit`. Never fails:
    /// index errors are logged and reported as [`MemoryHistory::FirstMessage`].
    #[instrument(skip_all, fields(collection = %collection, limit = limit))]
    pub async fn recent(&self, collection: &str, limit: usize) -> MemoryHistory {
        match self.try_recent(collection, limit).await {
            Ok(history) => history,
            Err(err) => {
                warn!(target: "rag_memory::memory", collection, error = %err, "recent history unavailable");
                MemoryHistory::FirstMessage
            }
        }
    }

    async fn try_recent(&self, collection: &str, limit: usize) -> Result<MemoryHistory, RagError> {
        if limit == 0 || !self.index.collection_exists(collection).await? {
            return Ok(MemoryHistory::FirstMessage);
        }
        let points = self.index.scroll(collection, limit).await?;
        if points.is_empty() {
            return Ok(MemoryHistory::FirstMessage);
        }

        let blocks = oldest_first(points)
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, p)| {
                format!(
                    "Conversation {}:\n{}: {}\n{}: {}",
                    i + 1,
                    keys::USER_MESSAGE,
                    payload_str(&p.payload, keys::USER_MESSAGE),
                    keys::BOT_RESPONSE,
                    payload_str(&p.payload, keys::BOT_RESPONSE),
                )
            })
            .collect();
        Ok(MemoryHistory::Conversations(blocks))
    }

    /// Deletes the oldest points beyond the window. Returns how many went.
    pub async fn reconcile_window(&self, collection: &str) -> Result<usize, RagError> {
        if !self.index.collection_exists(collection).await? {
            return Ok(0);
        }
        let points = self.index.scroll(collection, SWEEP_SCAN_LIMIT).await?;
        if points.len() <= self.window {
            return Ok(0);
        }

        let excess = points.len() - self.window;
        let ids: Vec<String> = oldest_first(points)
            .into_iter()
            .take(excess)
            .map(|p| p.id)
            .collect();
        self.index.delete_points(collection, ids).await?;

        info!(target: "rag_memory::memory", collection, deleted = excess, "memory window reconciled");
        Ok(excess)
    }

    /// Deletes every point of one conversation. Returns how many matched.
    pub async fn forget_conversation(
        &self,
        collection: &str,
        conversation_id: &str,
    ) -> Result<usize, RagError> {
        let points = self.index.scroll(collection, SWEEP_SCAN_LIMIT).await?;
        let ids: Vec<String> = points
            .into_iter()
            .filter(|p| payload_str(&p.payload, keys::CONVERSATION_ID) == conversation_id)
            .map(|p| p.id)
            .collect();

        let n = ids.len();
        if n > 0 {
            self.index.delete_points(collection, ids).await?;
        }
        info!(target: "rag_memory::memory", collection, conversation_id, deleted = n, "conversation forgotten");
        Ok(n)
    }
}

/// Timestamp ascending; equal timestamps fall back to id ascending.
fn oldest_first(mut points: Vec<StoredPoint>) -> Vec<StoredPoint> {
    points.sort_by(|a, b| {
        a.timestamp()
            .cmp(b.timestamp())
            .then_with(|| a.id.cmp(&b.id))
    });
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{CollectionSpec, InMemoryIndex};
    use crate::testing::FakeModelHost;
    use chrono::{Duration, TimeZone};

    fn window(k: usize) -> (MemoryWindow, Arc<InMemoryIndex>) {
        let index = Arc::new(InMemoryIndex::new(CollectionSpec {
            dense_name: "text-embedding".into(),
            sparse_name: "sparse-embedding".into(),
            dense_dim: FakeModelHost::DIM,
        }));
        let embedder = Arc::new(Embedder::new(FakeModelHost::DIM));
        embedder.load(Arc::new(FakeModelHost::default())).unwrap();
        let dyn_index: Arc<dyn VectorIndex> = index.clone();
        (MemoryWindow::new(dyn_index, embedder, k, k * 2 + 1), index)
    }

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
    }

    #[tokio::test]
    async fn recent_on_absent_collection_is_sentinel() {
        let (mem, _) = window(3);
        let h = mem.recent("nobody", 10).await;
        assert!(h.is_first_message());
        assert_eq!(h.render(), FIRST_MESSAGE_SENTINEL);
    }

    #[tokio::test]
    async fn record_evicts_oldest_when_full() {
        let (mem, index) = window(3);
        for i in 0..5 {
            mem.record("u", "c1", &format!("question {i}"), &format!("answer {i}"), at(i))
                .await
                .unwrap();
        }
        assert_eq!(index.count("u").await.unwrap(), 3);

        let h = mem.recent("u", 10).await;
        let blocks = h.blocks();
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            blocks[0],
            "Conversation 1:\nuser_message: question 2\nbot_response: answer 2"
        );
        assert!(blocks[2].contains("question 4"));
    }

    #[tokio::test]
    async fn empty_user_text_is_stored_as_placeholder() {
        let (mem, _) = window(3);
        mem.record("u", "c1", "  ", "nice picture", at(0)).await.unwrap();
        let rendered = mem.recent("u", 5).await.render();
        assert!(rendered.contains(IMAGE_PLACEHOLDER));
    }

    #[tokio::test]
    async fn record_fails_without_models() {
        let (mem, _) = window(3);
        mem.embedder.release();
        assert!(matches!(
            mem.record("u", "c", "hi", "hello", at(0)).await,
            Err(RagError::EmbeddingUnavailable)
        ));
    }

    #[tokio::test]
    async fn failed_record_on_full_window_keeps_every_point() {
        let (mem, index) = window(3);
        for i in 0..3 {
            mem.record("u", "c", &format!("kept {i}"), "ok", at(i)).await.unwrap();
        }
        mem.embedder.release();

        for i in 3..6 {
            assert!(mem.record("u", "c", "lost", "ok", at(i)).await.is_err());
            assert_eq!(index.count("u").await.unwrap(), 3);
        }
        let h = mem.recent("u", 10).await;
        assert!(h.blocks()[0].contains("kept 0"));
    }

    #[tokio::test]
    async fn reconcile_trims_overflow() {
        let (mem, index) = window(2);
        let wide = MemoryWindow::new(index.clone(), Arc::clone(&mem.embedder), 10, 21);
        for i in 0..5 {
            wide.record("u", "c", &format!("m{i}"), "ok", at(i)).await.unwrap();
        }
        assert_eq!(mem.reconcile_window("u").await.unwrap(), 3);
        assert_eq!(index.count("u").await.unwrap(), 2);
        let rendered = mem.recent("u", 10).await.render();
        assert!(rendered.contains("m3") && rendered.contains("m4"));
        assert_eq!(mem.reconcile_window("u").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn forget_conversation_only_touches_matching_points() {
        let (mem, index) = window(10);
        mem.record("u", "keep", "a", "b", at(0)).await.unwrap();
        mem.record("u", "drop", "c", "d", at(1)).await.unwrap();
        mem.record("u", "drop", "e", "f", at(2)).await.unwrap();

        assert_eq!(mem.forget_conversation("u", "drop").await.unwrap(), 2);
        assert_eq!(index.count("u").await.unwrap(), 1);
        assert_eq!(mem.forget_conversation("u", "drop").await.unwrap(), 0);
    }

    #[test]
    fn eviction_order_breaks_ties_by_id() {
        let point = |id: &str, ts: &str| {
            let mut payload = Payload::new();
            payload.insert(keys::TIMESTAMP.into(), ts.into());
            StoredPoint {
                id: id.into(),
                payload,
            }
        };
        let sorted = oldest_first(vec![
            point("b", "2024-01-01T00:00:00.000000Z"),
            point("c", "2023-12-31T00:00:00.000000Z"),
            point("a", "2024-01-01T00:00:00.000000Z"),
        ]);
        let ids: Vec<_> = sorted.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
