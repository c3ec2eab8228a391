//! Fuzzy title comparison and lookup-key normalization.
//!
//! [`similarity`] gates every candidate match in the pipeline: registry search
//! results, preprint search results, and anything else that claims to be "the
//! same paper" as a record. [`normalize_title`] produces the cache lookup key.

/// Acceptance threshold for registry and preprint matches (strictly greater).
pub const REGISTRY_MATCH_THRESHOLD: f64 = 0.8;

/// Lower threshold reserved for low-confidence collaborators.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.75;

/// Returns a similarity score in `[0, 1]` between two strings.
///
/// Comparison is case-insensitive and collapses runs of whitespace, so
/// `"Deep  Learning"` and `"deep learning"` score `1.0`. The score is symmetric.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = collapse_for_comparison(a);
    let right = collapse_for_comparison(b);
    if left == right {
        return 1.0;
    }
    strsim::normalized_levenshtein(&left, &right).clamp(0.0, 1.0)
}

/// Returns true when `score` clears `threshold` (strictly greater).
#[must_use]
pub fn is_accepted(score: f64, threshold: f64) -> bool {
    score > threshold
}

/// Normalizes a title into a cache lookup key.
///
/// Lowercases and drops every character that is not alphanumeric, including
/// whitespace and underscores. Idempotent.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn collapse_for_comparison(value: &str) -> String {
    value
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
