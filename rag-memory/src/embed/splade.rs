//! Sparse lexical vectors from masked-LM logits.
//!
//! Each vocabulary cell gets `log(1 + relu(logit))`, weighted by the
//! attention mask and max-pooled across token positions. Only strictly
//! positive cells are kept.

use model_host::MlmScores;

use crate::record::SparseVector;

/// Max-pools `log1p(relu(logits)) * mask` over positions.
///
/// Indices are returned in ascending order and are unique by construction.
pub fn max_pool(scores: &MlmScores) -> SparseVector {
    let mut pooled = vec![0.0f32; scores.vocab_size()];

    for (pos, &mask) in scores.attention_mask().iter().enumerate() {
        if mask == 0 {
            continue;
        }
        let weight = mask as f32;
        for (cell, &logit) in pooled.iter_mut().zip(scores.row(pos)) {
            // f32::max drops NaN in favour of 0.0
            let w = logit.max(0.0).ln_1p() * weight;
            if w > *cell {
                *cell = w;
            }
        }
    }

    let mut indices = Vec::new();
    let mut values = Vec::new();
    for (i, v) in pooled.into_iter().enumerate() {
        if v > 0.0 {
            indices.push(i as u32);
            values.push(v);
        }
    }
    SparseVector { indices, values }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(rows: Vec<Vec<f32>>, mask: Vec<u32>) -> MlmScores {
        MlmScores::from_rows(rows, mask).unwrap()
    }

    #[test]
    fn keeps_only_positive_cells() {
        let s = scores(vec![vec![-2.0, 0.0, 1.0, 3.0]], vec![1]);
        let v = max_pool(&s);
        assert_eq!(v.indices, vec![2, 3]);
        assert!((v.values[0] - 2.0f32.ln()).abs() < 1e-6);
        assert!((v.values[1] - 4.0f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn max_pools_across_positions() {
        let s = scores(vec![vec![1.0, 0.0], vec![0.5, 2.0]], vec![1, 1]);
        let v = max_pool(&s);
        assert_eq!(v.indices, vec![0, 1]);
        assert!((v.values[0] - 2.0f32.ln()).abs() < 1e-6);
        assert!((v.values[1] - 3.0f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn masked_positions_do_not_contribute() {
        let s = scores(vec![vec![0.0, 1.0], vec![9.0, 9.0]], vec![1, 0]);
        let v = max_pool(&s);
        assert_eq!(v.indices, vec![1]);
        assert!((v.values[0] - 2.0f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn nan_and_negative_logits_vanish() {
        let s = scores(vec![vec![f32::NAN, -0.1, 0.2]], vec![1]);
        let v = max_pool(&s);
        assert_eq!(v.indices, vec![2]);
        assert!(v.values.iter().all(|x| *x > 0.0));
    }

    #[test]
    fn all_masked_yields_empty_vector() {
        let s = scores(vec![vec![5.0, 5.0]], vec![0]);
        assert!(max_pool(&s).is_empty());
    }
}
