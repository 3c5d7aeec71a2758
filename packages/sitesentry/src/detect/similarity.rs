//! Similarity math for the change detector.

use std::collections::HashSet;

use crate::types::OutlineNode;

/// Weighted keyword-set similarity.
///
/// `0.2·Jaccard + 0.6·Overlap + 0.2·Dice`, plus a bonus of
/// `min(0.15, 0.2·ratio)` when the overlap ratio reaches 0.5. Clipped to
/// `[0, 1]`. Empty sets never divide by zero: an empty union scores 0.
pub fn keyword_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    let min_len = a.len().min(b.len()) as f64;
    let total_len = (a.len() + b.len()) as f64;

    let jaccard = if union > 0.0 { intersection / union } else { 0.0 };
    let overlap = if min_len > 0.0 { intersection / min_len } else { 0.0 };
    let dice = if total_len > 0.0 { 2.0 * intersection / total_len } else { 0.0 };

    let mut score = 0.2 * jaccard + 0.6 * overlap + 0.2 * dice;
    if min_len > 0.0 {
        let ratio = intersection / min_len;
        if ratio >= 0.5 {
            score += (0.2 * ratio).min(0.15);
        }
    }

    score.clamp(0.0, 1.0)
}

/// Structural similarity: `1 − normalized edit distance` over the outline
/// signature sequences.
pub fn structural_similarity(a: &[OutlineNode], b: &[OutlineNode]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }

    let a_sigs: Vec<String> = a.iter().map(|n| n.signature()).collect();
    let b_sigs: Vec<String> = b.iter().map(|n| n.signature()).collect();

    let distance = edit_distance(&a_sigs, &b_sigs) as f64;
    let max_len = a_sigs.len().max(b_sigs.len()) as f64;

    1.0 - (distance / max_len)
}

/// Levenshtein distance over arbitrary comparable sequences, two-row DP.
fn edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, item_a) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, item_b) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(item_a != item_b);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn node(tag: &str, depth: usize) -> OutlineNode {
        OutlineNode { tag: tag.into(), depth, classes: vec![], id: None }
    }

    #[test]
    fn identical_sets_score_one() {
        let a = set(&["alpha", "beta", "gamma"]);
        assert!((keyword_similarity(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_sets_score_zero() {
        assert_eq!(keyword_similarity(&set(&[]), &set(&[])), 0.0);
        assert_eq!(keyword_similarity(&set(&["a1a"]), &set(&[])), 0.0);
    }

    #[test]
    fn disjoint_sets_score_zero() {
        assert_eq!(keyword_similarity(&set(&["alpha"]), &set(&["beta"])), 0.0);
    }

    #[test]
    fn ten_percent_churn_scores_high() {
        // 9 of 10 keywords shared, one replaced
        let a = set(&["k0", "k1", "k2", "k3", "k4", "k5", "k6", "k7", "k8", "k9"]);
        let b = set(&["k0", "k1", "k2", "k3", "k4", "k5", "k6", "k7", "k8", "new"]);
        let score = keyword_similarity(&a, &b);
        assert!(score > 0.85, "expected minor-change territory, got {score}");
    }

    #[test]
    fn half_churn_scores_below_critical_band() {
        let a = set(&["k0", "k1", "k2", "k3", "k4", "k5", "k6", "k7"]);
        let b = set(&["k0", "k1", "x2", "x3", "x4", "x5", "x6", "x7"]);
        let score = keyword_similarity(&a, &b);
        assert!(score < 0.5, "expected significant-change territory, got {score}");
    }

    #[test]
    fn identical_outlines_score_one() {
        let outline = vec![node("html", 0), node("body", 1), node("p", 2)];
        assert_eq!(structural_similarity(&outline, &outline), 1.0);
    }

    #[test]
    fn empty_outlines_score_one() {
        assert_eq!(structural_similarity(&[], &[]), 1.0);
    }

    #[test]
    fn completely_different_outlines_score_zero() {
        let a = vec![node("p", 1), node("p", 2)];
        let b = vec![node("table", 1), node("tr", 2)];
        assert_eq!(structural_similarity(&a, &b), 0.0);
    }

    #[test]
    fn single_insertion_is_proportional() {
        let a = vec![node("body", 1), node("p", 2), node("p", 2)];
        let b = vec![node("body", 1), node("p", 2), node("p", 2), node("div", 2)];
        let score = structural_similarity(&a, &b);
        assert!((score - 0.75).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn keyword_similarity_is_bounded(
            a in proptest::collection::hash_set("[a-z]{3,8}", 0..30),
            b in proptest::collection::hash_set("[a-z]{3,8}", 0..30),
        ) {
            let a: HashSet<String> = a.into_iter().collect();
            let b: HashSet<String> = b.into_iter().collect();
            let score = keyword_similarity(&a, &b);
            prop_assert!((0.0..=1.0).contains(&score));
            // symmetry
            prop_assert!((score - keyword_similarity(&b, &a)).abs() < 1e-12);
        }

        #[test]
        fn self_similarity_is_one_for_nonempty(
            a in proptest::collection::hash_set("[a-z]{3,8}", 1..30),
        ) {
            let a: HashSet<String> = a.into_iter().collect();
            prop_assert!((keyword_similarity(&a, &a) - 1.0).abs() < 1e-9);
        }
    }
}
