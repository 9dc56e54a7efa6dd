//! Core data models used by the library.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::RagError;

/// Well-known payload keys.
pub mod keys {
    pub const CONVERSATION_ID: &str = "conversation_id";
    pub const TIMESTAMP: &str = "timestamp";
    pub const USER_MESSAGE: &str = "user_message";
    pub const BOT_RESPONSE: &str = "bot_response";
    pub const TEXT: &str = "text";
    pub const SOURCE: &str = "source";
}

/// A single payload value: a string or a list of strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Text(String),
    List(Vec<String>),
}

impl PayloadValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadValue::Text(s) => Some(s),
            PayloadValue::List(_) => None,
        }
    }

    /// Renders the value for a context line; lists are comma-joined.
    pub fn render(&self) -> String {
        match self {
            PayloadValue::Text(s) => s.clone(),
            PayloadValue::List(items) => items.join(", "),
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(s: &str) -> Self {
        PayloadValue::Text(s.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(s: String) -> Self {
        PayloadValue::Text(s)
    }
}

impl From<Vec<String>> for PayloadValue {
    fn from(v: Vec<String>) -> Self {
        PayloadValue::List(v)
    }
}

/// Free-form point metadata, ordered by key.
pub type Payload = BTreeMap<String, PayloadValue>;

/// Reads a string field from a payload, `""` when absent or list-valued.
pub fn payload_str<'a>(payload: &'a Payload, key: &str) -> &'a str {
    payload.get(key).and_then(PayloadValue::as_str).unwrap_or("")
}

/// Formats a timestamp so lexicographic order equals chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Vocabulary-sized vector stored as parallel `(index, value)` lists.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Builds a sparse vector, checking lengths and index uniqueness.
    pub fn new(indices: Vec<u32>, values: Vec<f32>) -> Result<Self, RagError> {
        if indices.len() != values.len() {
            return Err(RagError::VectorSizeMismatch {
                got: values.len(),
                want: indices.len(),
            });
        }
        let mut seen = HashSet::with_capacity(indices.len());
        if let Some(dup) = indices.iter().find(|i| !seen.insert(**i)) {
            return Err(RagError::DuplicateSparseIndex(*dup));
        }
        Ok(Self { indices, values })
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dot product over shared indices.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let lookup: BTreeMap<u32, f32> = other
            .indices
            .iter()
            .copied()
            .zip(other.values.iter().copied())
            .collect();
        self.indices
            .iter()
            .zip(&self.values)
            .filter_map(|(i, v)| lookup.get(i).map(|o| v * o))
            .sum()
    }
}

/// Dense + sparse representation of one text.
#[derive(Clone, Debug, PartialEq)]
pub struct Embedding {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
}

/// One indexed record: id, both vectors and payload. Immutable once written.
#[derive(Clone, Debug)]
pub struct EmbeddingPoint {
    pub id: String,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub payload: Payload,
}

/// A listed point (no vectors).
#[derive(Clone, Debug, PartialEq)]
pub struct StoredPoint {
    pub id: String,
    pub payload: Payload,
}

impl StoredPoint {
    pub fn timestamp(&self) -> &str {
        payload_str(&self.payload, keys::TIMESTAMP)
    }
}

/// A single similarity hit with its payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredHit {
    pub id: String,
    pub score: f32,
    pub payload: Payload,
}

/// Both ranked lists of a hybrid query, unmerged.
#[derive(Clone, Debug, Default)]
pub struct HybridResults {
    pub dense: Vec<ScoredHit>,
    pub sparse: Vec<ScoredHit>,
}

/// Source text for knowledge ingestion.
#[derive(Clone, Debug)]
pub struct KnowledgeDocument {
    pub text: String,
    pub source: String,
}

/// Outcome of a knowledge ingestion run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub chunks: usize,
    pub upserted: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sparse_rejects_duplicates_and_ragged() {
        assert!(matches!(
            SparseVector::new(vec![1, 2], vec![0.5]),
            Err(RagError::VectorSizeMismatch { got: 1, want: 2 })
        ));
        assert!(matches!(
            SparseVector::new(vec![3, 3], vec![0.5, 0.1]),
            Err(RagError::DuplicateSparseIndex(3))
        ));
        assert_eq!(SparseVector::new(vec![3, 7], vec![0.5, 0.1]).unwrap().len(), 2);
    }

    #[test]
    fn sparse_dot_uses_shared_indices() {
        let a = SparseVector::new(vec![1, 4, 9], vec![1.0, 2.0, 3.0]).unwrap();
        let b = SparseVector::new(vec![9, 4, 2], vec![0.5, 0.25, 8.0]).unwrap();
        assert!((a.dot(&b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn timestamps_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert!(format_timestamp(early) < format_timestamp(late));
        assert_eq!(format_timestamp(early), "2024-05-01T09:00:00.000000Z");
    }

    #[test]
    fn payload_values_render() {
        let mut p = Payload::new();
        p.insert("tags".into(), vec!["a".to_string(), "b".to_string()].into());
        p.insert("text".into(), "hello".into());
        assert_eq!(p["tags"].render(), "a, b");
        assert_eq!(payload_str(&p, "text"), "hello");
        assert_eq!(payload_str(&p, "tags"), "");
        assert_eq!(payload_str(&p, "missing"), "");
    }

    #[test]
    fn payload_deserializes_strings_and_lists() {
        let p: Payload =
            serde_json::from_str(r#"{"text":"hi","tags":["a","b"]}"#).unwrap();
        assert_eq!(p["text"], PayloadValue::Text("hi".into()));
        assert_eq!(p["tags"], PayloadValue::List(vec!["a".into(), "b".into()]));
    }
}
