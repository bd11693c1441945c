//! Pure similarity functions used by aggregation, memory retrieval, and
//! diverse decoding.

use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

fn tokenize(s: &str) -> Vec<String> {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity over whitespace tokens, lowercased with punctuation
/// stripped. Both empty → 1.0; exactly one empty → 0.0.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let ta: HashSet<String> = tokenize(a).into_iter().collect();
    let tb: HashSet<String> = tokenize(b).into_iter().collect();

    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f64 / union as f64
}

fn graphemes(s: &str) -> Vec<&str> {
    s.graphemes(true).collect()
}

/// Levenshtein distance over Unicode grapheme clusters.
fn edit_distance(a: &[&str], b: &[&str]) -> usize {
    let (n, m) = (a.len(), b.len());
    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }
    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];
    for i in 1..=n {
        curr[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[m]
}

/// `1 − d(a,b)/max(|a|,|b|)` over grapheme clusters. Both empty → 1.0; one
/// empty → 0.0.
pub fn edit_distance_similarity(a: &str, b: &str) -> f64 {
    let ga = graphemes(a);
    let gb = graphemes(b);

    if ga.is_empty() && gb.is_empty() {
        return 1.0;
    }
    if ga.is_empty() || gb.is_empty() {
        return 0.0;
    }

    let dist = edit_distance(&ga, &gb);
    let max_len = ga.len().max(gb.len());
    1.0 - (dist as f64 / max_len as f64)
}

/// Weighted mean of Jaccard and edit-distance similarity. `(0,0)` weights →
/// 0.0; otherwise the weights are normalised.
pub fn combined_similarity(a: &str, b: &str, w_jaccard: f64, w_edit: f64) -> f64 {
    let total = w_jaccard + w_edit;
    if total <= 0.0 {
        return 0.0;
    }
    let jac = jaccard_similarity(a, b);
    let edit = edit_distance_similarity(a, b);
    (w_jaccard * jac + w_edit * edit) / total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaccard_both_empty_is_one() {
        assert_eq!(jaccard_similarity("", ""), 1.0);
    }

    #[test]
    fn jaccard_one_empty_is_zero() {
        assert_eq!(jaccard_similarity("hello", ""), 0.0);
    }

    #[test]
    fn jaccard_identical_is_one() {
        assert_eq!(jaccard_similarity("the cat sat", "The Cat Sat!"), 1.0);
    }

    #[test]
    fn jaccard_partial_overlap() {
        let sim = jaccard_similarity("the cat sat on the mat", "the dog sat on the mat");
        assert!(sim > 0.5 && sim < 1.0);
    }

    #[test]
    fn edit_distance_both_empty_is_one() {
        assert_eq!(edit_distance_similarity("", ""), 1.0);
    }

    #[test]
    fn edit_distance_one_empty_is_zero() {
        assert_eq!(edit_distance_similarity("abc", ""), 0.0);
    }

    #[test]
    fn edit_distance_identical_is_one() {
        assert_eq!(edit_distance_similarity("hello", "hello"), 1.0);
    }

    #[test]
    fn edit_distance_handles_unicode_graphemes() {
        // "café" vs "cafe" differ by a single grapheme cluster substitution.
        let sim = edit_distance_similarity("café", "cafe");
        assert!(sim > 0.5 && sim < 1.0);
    }

    #[test]
    fn combined_similarity_zero_weights_is_zero() {
        assert_eq!(combined_similarity("a", "b", 0.0, 0.0), 0.0);
    }

    #[test]
    fn combined_similarity_normalises_weights() {
        let a = combined_similarity("the cat", "the cat", 1.0, 1.0);
        let b = combined_similarity("the cat", "the cat", 5.0, 5.0);
        assert!((a - b).abs() < 1e-9);
        assert_eq!(a, 1.0);
    }
}
