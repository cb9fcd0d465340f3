//! Trigram similarity
//!
//! In-process replacement for a store-side trigram function: pg_trgm-style
//! padded trigrams with Jaccard overlap, computed over already-normalized
//! titles fetched in a bounded candidate window.

use std::collections::HashSet;

/// Extract the padded trigram set of a string. Two leading pad spaces and
/// one trailing, matching pg_trgm so thresholds carry over.
fn trigrams(text: &str) -> HashSet<[char; 3]> {
    let chars: Vec<char> = std::iter::repeat(' ')
        .take(2)
        .chain(text.chars())
        .chain(std::iter::once(' '))
        .collect();

    chars.windows(3).map(|w| [w[0], w[1], w[2]]).collect()
}

/// Jaccard similarity over padded trigram sets, in [0.0, 1.0].
///
/// Inputs are expected to be normalized already; this function does no
/// case folding of its own. Empty inputs score 0 against everything,
/// identical non-empty inputs score 1.
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let set_a = trigrams(a);
    let set_b = trigrams(b);

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.len() + set_b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(trigram_similarity("abcdef", "abcdef"), 1.0);
    }

    #[test]
    fn empty_strings_score_zero() {
        assert_eq!(trigram_similarity("", "abc"), 0.0);
        assert_eq!(trigram_similarity("abc", ""), 0.0);
    }

    #[test]
    fn disjoint_strings_score_zero() {
        assert_eq!(trigram_similarity("abcdef", "uvwxyz"), 0.0);
    }

    #[test]
    fn near_identical_titles_score_high() {
        let a = "とても素敵なタイトル第1巻";
        let b = "とても素敵なタイトル第2巻";
        let sim = trigram_similarity(a, b);
        assert!(sim >= 0.6, "expected high similarity, got {sim}");
        assert!(sim < 1.0);
    }

    // One substituted char in an n-char string yields (n-2)/(n+4) with
    // padded trigrams, so short titles land below the fuzzy floor.
    #[test]
    fn short_titles_with_one_substitution_stay_below_threshold() {
        let sim = trigram_similarity("素敵なタイトル第1巻", "素敵なタイトル第2巻");
        assert!(sim < 0.6, "expected sub-threshold similarity, got {sim}");
        assert!(sim > 0.5);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = "thequickbrownfox";
        let b = "thequickbrownfoxes";
        assert_eq!(trigram_similarity(a, b), trigram_similarity(b, a));
    }

    #[test]
    fn unrelated_titles_score_low() {
        let sim = trigram_similarity("completelydifferent", "somethingelseentirely");
        assert!(sim < 0.3, "expected low similarity, got {sim}");
    }
}
