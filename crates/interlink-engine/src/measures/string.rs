//! String similarity measures.

use std::collections::BTreeSet;

use super::Measure;

/// `1` for identical strings, else `0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl Measure for ExactMatch {
    fn name(&self) -> &str {
        "exactmatch"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b {
            1.0
        } else {
            0.0
        }
    }
}

/// Jaccard coefficient of lower-cased whitespace tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct Jaccard;

impl Measure for Jaccard {
    fn name(&self) -> &str {
        "jaccard"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        let ta = tokens(a);
        let tb = tokens(b);
        let union = ta.union(&tb).count();
        if union == 0 {
            return 0.0;
        }
        ta.intersection(&tb).count() as f64 / union as f64
    }
}

fn tokens(s: &str) -> BTreeSet<String> {
    s.split_whitespace().map(str::to_lowercase).collect()
}

/// Dice coefficient of padded, lower-cased character trigrams.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trigrams;

impl Measure for Trigrams {
    fn name(&self) -> &str {
        "trigrams"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        let ga = trigrams(a);
        let gb = trigrams(b);
        let total = ga.len() + gb.len();
        if total == 0 {
            return 0.0;
        }
        2.0 * ga.intersection(&gb).count() as f64 / total as f64
    }
}

fn trigrams(s: &str) -> BTreeSet<[char; 3]> {
    let lowered = s.trim().to_lowercase();
    if lowered.is_empty() {
        return BTreeSet::new();
    }
    let padded: Vec<char> = "  ".chars().chain(lowered.chars()).chain("  ".chars()).collect();
    padded.windows(3).map(|w| [w[0], w[1], w[2]]).collect()
}

/// `1 - distance / max_len` over characters; two empty strings are identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct Levenshtein;

impl Measure for Levenshtein {
    fn name(&self) -> &str {
        "levenshtein"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let max_len = a.len().max(b.len());
        if max_len == 0 {
            return 1.0;
        }
        1.0 - edit_distance(&a, &b) as f64 / max_len as f64
    }
}

fn edit_distance(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn exact_match_is_case_sensitive() {
        assert_eq!(ExactMatch.similarity("Berlin", "Berlin"), 1.0);
        assert_eq!(ExactMatch.similarity("Berlin", "berlin"), 0.0);
    }

    #[test]
    fn jaccard_over_tokens() {
        assert_relative_eq!(Jaccard.similarity("New York City", "new york"), 2.0 / 3.0);
        assert_eq!(Jaccard.similarity("", ""), 0.0);
    }

    #[test]
    fn trigrams_identical_and_disjoint() {
        assert_relative_eq!(Trigrams.similarity("Berlin", "berlin"), 1.0);
        assert_eq!(Trigrams.similarity("abc", "xyz"), 0.0);
        let partial = Trigrams.similarity("Berlin", "Berlino");
        assert!(partial > 0.5 && partial < 1.0);
    }

    #[test]
    fn levenshtein_normalizes_by_longer_string() {
        assert_relative_eq!(Levenshtein.similarity("kitten", "sitting"), 1.0 - 3.0 / 7.0);
        assert_eq!(Levenshtein.similarity("", ""), 1.0);
        assert_eq!(Levenshtein.similarity("abc", ""), 0.0);
    }

    #[test]
    fn set_similarity_takes_best_pair() {
        let a: BTreeSet<String> = ["Paris".to_string(), "Berlin".to_string()].into();
        let b: BTreeSet<String> = ["Berlin".to_string()].into();
        assert_eq!(ExactMatch.set_similarity(&a, &b), 1.0);
        assert_eq!(ExactMatch.set_similarity(&a, &BTreeSet::new()), 0.0);
    }
}
