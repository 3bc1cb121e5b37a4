//! Token-overlap name similarity scoring.
//!
//! The scorer is the sole basis for match decisions in the upsert engine.
//! It is a pure function: deterministic, symmetric, and free of side effects,
//! which keeps retries of the same batch idempotent.
//!
//! Scores are in `[0, 1]`: `1.0` for names identical after normalization,
//! `0.0` for disjoint token sets. The formula is the ratio of shared tokens
//! to the size of the larger token set, so adding a shared token to both
//! names never decreases the score and adding an unrelated token to one name
//! never increases it.

use std::collections::BTreeSet;

/// Normalize a name for comparison: lowercase, replace every
/// non-alphanumeric run with a single space, and trim.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = true;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

fn token_set(normalized: &str) -> BTreeSet<&str> {
    normalized.split_whitespace().collect()
}

/// Score the similarity of two item names.
///
/// Both names are normalized before comparison. Names that normalize to an
/// empty token set (e.g. pure punctuation) score `0.0` against everything,
/// including each other.
pub fn score(a: &str, b: &str) -> f64 {
    let a_norm = normalize_name(a);
    let b_norm = normalize_name(b);

    let a_tokens = token_set(&a_norm);
    let b_tokens = token_set(&b_norm);

    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0.0;
    }
    if a_norm == b_norm {
        return 1.0;
    }

    let shared = a_tokens.intersection(&b_tokens).count();
    let larger = a_tokens.len().max(b_tokens.len());

    shared as f64 / larger as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_names() {
        assert_eq!(score("Bananas", "Bananas"), 1.0);
        assert_eq!(score("Whole Milk", "Whole Milk"), 1.0);
    }

    #[test]
    fn test_identical_after_normalization() {
        assert_eq!(score("  WHOLE milk ", "whole-milk"), 1.0);
        assert_eq!(score("Half & Half", "half half"), 1.0);
    }

    #[test]
    fn test_disjoint_names() {
        assert_eq!(score("Bananas", "Oat Milk"), 0.0);
    }

    #[test]
    fn test_partial_overlap() {
        // Shared {bananas}, larger set has 2 tokens.
        assert_eq!(score("Organic Bananas", "Bananas"), 0.5);
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            ("Organic Bananas", "Bananas"),
            ("Whole Milk 2%", "Milk"),
            ("", "Bananas"),
            ("Greek Yogurt", "greek yogurt plain"),
        ];
        for (a, b) in pairs {
            assert_eq!(score(a, b), score(b, a), "asymmetric for {:?}/{:?}", a, b);
        }
    }

    #[test]
    fn test_shared_token_never_decreases() {
        let base = score("organic bananas", "ripe bananas");
        let extended = score("organic bananas fresh", "ripe bananas fresh");
        assert!(extended >= base);
    }

    #[test]
    fn test_unrelated_token_never_increases() {
        let base = score("bananas", "bananas");
        let padded = score("bananas imported", "bananas");
        assert!(padded <= base);
    }

    #[test]
    fn test_empty_and_punctuation_names() {
        assert_eq!(score("", ""), 0.0);
        assert_eq!(score("$$$", "$$$"), 0.0);
        assert_eq!(score("$$$", "Bananas"), 0.0);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Trader Joe's Salsa!"), "trader joe s salsa");
        assert_eq!(normalize_name("  MILK  "), "milk");
        assert_eq!(normalize_name("---"), "");
    }
}
