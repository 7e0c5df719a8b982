//! Maximal marginal relevance (MMR) selection.
//!
//! Given a query vector and a pool of candidate vectors, greedily picks `k`
//! candidates that are relevant to the query but not redundant with each
//! other:
//!
//! ```text
//! score(d) = λ × sim(query, d) − (1 − λ) × max sim(d, s) for s in selected
//! ```
//!
//! `λ = 1.0` degenerates to plain similarity ranking; `λ = 0.0` maximizes
//! diversity. The first pick is always the candidate most similar to the
//! query.

use crate::embedding::cosine_similarity;

/// Select up to `k` candidate indices in MMR order.
pub fn select(query: &[f32], candidates: &[Vec<f32>], k: usize, lambda: f32) -> Vec<usize> {
    let limit = k.min(candidates.len());
    if limit == 0 {
        return Vec::new();
    }

    let to_query: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    let first = argmax(&to_query);
    let mut selected = vec![first];

    while selected.len() < limit {
        let mut best: Option<(usize, f32)> = None;
        for (i, relevance) in to_query.iter().enumerate() {
            if selected.contains(&i) {
                continue;
            }
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(&candidates[i], &candidates[s]))
                .fold(f32::MIN, f32::max);
            let score = lambda * relevance - (1.0 - lambda) * redundancy;
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((i, score));
            }
        }
        match best {
            Some((i, _)) => selected.push(i),
            None => break,
        }
    }

    selected
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pool() {
        assert!(select(&[1.0, 0.0], &[], 3, 0.5).is_empty());
        assert!(select(&[1.0, 0.0], &[vec![1.0, 0.0]], 0, 0.5).is_empty());
    }

    #[test]
    fn test_first_pick_is_most_similar() {
        let pool = vec![vec![0.0, 1.0], vec![1.0, 0.1], vec![0.5, 0.5]];
        let picked = select(&[1.0, 0.0], &pool, 1, 0.5);
        assert_eq!(picked, vec![1]);
    }

    #[test]
    fn test_lambda_one_is_similarity_order() {
        let pool = vec![vec![0.2, 1.0], vec![1.0, 0.0], vec![1.0, 0.3]];
        let picked = select(&[1.0, 0.0], &pool, 3, 1.0);
        assert_eq!(picked, vec![1, 2, 0]);
    }

    #[test]
    fn test_near_duplicate_is_demoted() {
        // Two near-identical relevant docs and one different but still relevant doc.
        let pool = vec![vec![1.0, 0.0], vec![0.99, 0.01], vec![0.7, 0.7]];
        let picked = select(&[1.0, 0.0], &pool, 2, 0.3);
        assert_eq!(picked, vec![0, 2]);
    }

    #[test]
    fn test_never_repeats_and_respects_k() {
        let pool: Vec<Vec<f32>> = (0..10).map(|i| vec![1.0, i as f32 * 0.1]).collect();
        let picked = select(&[1.0, 0.0], &pool, 4, 0.7);
        assert_eq!(picked.len(), 4);
        let mut dedup = picked.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), 4);
    }
}
