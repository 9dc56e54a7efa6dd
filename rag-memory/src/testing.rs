//! Deterministic model host for unit tests.

use model_host::{MlmScores, ModelHost, ModelHostError};

/// Hashes whitespace tokens into a small dense space and a small vocabulary.
#[derive(Default)]
pub(crate) struct FakeModelHost {
    fail: bool,
}

impl FakeModelHost {
    pub(crate) const DIM: usize = 16;
    pub(crate) const VOCAB: usize = 97;

    pub(crate) fn failing() -> Self {
        Self { fail: true }
    }

    fn tokens(text: &str) -> Vec<u64> {
        text.split_whitespace()
            .map(|t| fnv1a(&t.to_lowercase()))
            .collect()
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

impl ModelHost for FakeModelHost {
    fn dense_dim(&self) -> usize {
        Self::DIM
    }

    fn encode(&self, text: &str) -> model_host::Result<Vec<f32>> {
        if self.fail {
            return Err(ModelHostError::Decode("fake host offline".into()));
        }
        let mut v = vec![0.01f32; Self::DIM];
        for h in Self::tokens(text) {
            v[(h % Self::DIM as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        Ok(v.into_iter().map(|x| x / norm).collect())
    }

    fn score(&self, text: &str) -> model_host::Result<MlmScores> {
        if self.fail {
            return Err(ModelHostError::Decode("fake host offline".into()));
        }
        let mut rows = Vec::new();
        let mut mask = Vec::new();
        for h in Self::tokens(text) {
            let mut row = vec![-1.0f32; Self::VOCAB];
            row[(h % Self::VOCAB as u64) as usize] = 2.0 + (h % 7) as f32 * 0.1;
            rows.push(row);
            mask.push(1);
        }
        // padding position that must be ignored
        rows.push(vec![5.0f32; Self::VOCAB]);
        mask.push(0);
        MlmScores::from_rows(rows, mask)
    }
}
