//! Title similarity between two features.

use super::Feature;
use std::collections::HashSet;

const JACCARD_WEIGHT: f64 = 0.6;
const EDIT_WEIGHT: f64 = 0.4;
const MIN_TOKEN_LEN: usize = 3;

/// Score in `[0, 1]`. Features from different projects or of different types
/// never match.
pub fn similarity(a: &Feature, b: &Feature) -> f64 {
    if a.project != b.project || a.kind != b.kind {
        return 0.0;
    }
    title_similarity(&a.title, &b.title)
}

/// `0.6 * token_jaccard + 0.4 * edit_similarity`
pub fn title_similarity(a: &str, b: &str) -> f64 {
    JACCARD_WEIGHT * token_jaccard(a, b) + EDIT_WEIGHT * edit_similarity(a, b)
}

/// Lowercased words longer than two characters, punctuation removed.
fn tokens(text: &str) -> HashSet<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned
        .split_whitespace()
        .filter(|word| word.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

/// `|A ∩ B| / |A ∪ B|`, or 0 when either side has no tokens.
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let a = tokens(a);
    let b = tokens(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    let total = a.union(&b).count();
    shared as f64 / total as f64
}

/// `1 - levenshtein / max_len` over lowercased text.
pub fn edit_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - strsim::levenshtein(&a, &b) as f64 / max_len as f64
}
