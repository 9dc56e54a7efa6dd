//! Embedding model host: the dense sentence encoder and the masked-LM scorer
//! behind one blocking trait.
//!
//! Callers are expected to run [`ModelHost`] methods on worker threads
//! (`tokio::task::spawn_blocking`), never directly on an async executor.

pub mod config;
pub mod error_handler;
pub mod http_host;

pub use config::ModelHostConfig;
pub use error_handler::{ConfigError, ModelHostError, Result};
pub use http_host::HttpModelHost;

/// A loaded pair of embedding models.
///
/// Implement this trait to plug in another backend (local runtime, remote
/// inference server, test double).
pub trait ModelHost: Send + Sync {
    /// Length of vectors returned by [`ModelHost::encode`].
    fn dense_dim(&self) -> usize;

    /// Encodes `text` into a dense float vector.
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Tokenizes `text` and runs the masked-LM head, returning raw logits
    /// for every token position and the attention mask.
    fn score(&self, text: &str) -> Result<MlmScores>;
}

/// Masked-LM output for a single sequence.
///
/// Logits are stored row-major: `seq_len` rows of `vocab_size` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct MlmScores {
    seq_len: usize,
    vocab_size: usize,
    logits: Vec<f32>,
    attention_mask: Vec<u32>,
}

impl MlmScores {
    /// Builds scores from a flat row-major logits buffer.
    ///
    /// # Errors
    /// Returns [`ModelHostError::ShapeMismatch`] if buffer sizes disagree.
    pub fn new(
        seq_len: usize,
        vocab_size: usize,
        logits: Vec<f32>,
        attention_mask: Vec<u32>,
    ) -> Result<Self> {
        if attention_mask.len() != seq_len {
            return Err(ModelHostError::ShapeMismatch(format!(
                "attention mask has {} entries for {seq_len} positions",
                attention_mask.len()
            )));
        }
        if logits.len() != seq_len * vocab_size {
            return Err(ModelHostError::ShapeMismatch(format!(
                "logits has {} cells, expected {seq_len}x{vocab_size}",
                logits.len()
            )));
        }
        Ok(Self {
            seq_len,
            vocab_size,
            logits,
            attention_mask,
        })
    }

    /// Builds scores from per-position logit rows (the wire shape).
    pub fn from_rows(rows: Vec<Vec<f32>>, attention_mask: Vec<u32>) -> Result<Self> {
        let seq_len = rows.len();
        let vocab_size = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().position(|r| r.len() != vocab_size) {
            return Err(ModelHostError::ShapeMismatch(format!(
                "row {bad} has {} logits, expected {vocab_size}",
                rows[bad].len()
            )));
        }
        let logits = rows.into_iter().flatten().collect();
        Self::new(seq_len, vocab_size, logits, attention_mask)
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn attention_mask(&self) -> &[u32] {
        &self.attention_mask
    }

    /// Logits of token position `pos`.
    pub fn row(&self, pos: usize) -> &[f32] {
        let start = pos * self.vocab_size;
        &self.logits[start..start + self.vocab_size]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_flattens_row_major() {
        let s = MlmScores::from_rows(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]], vec![1, 0])
            .unwrap();
        assert_eq!(s.seq_len(), 2);
        assert_eq!(s.vocab_size(), 3);
        assert_eq!(s.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(s.attention_mask(), &[1, 0]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = MlmScores::from_rows(vec![vec![1.0, 2.0], vec![3.0]], vec![1, 1]).unwrap_err();
        assert!(matches!(err, ModelHostError::ShapeMismatch(_)));
    }

    #[test]
    fn mask_length_must_match_positions() {
        let err = MlmScores::new(2, 2, vec![0.0; 4], vec![1]).unwrap_err();
        assert!(matches!(err, ModelHostError::ShapeMismatch(_)));
    }
}
