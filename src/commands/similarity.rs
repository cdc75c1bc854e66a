//! Token-order-invariant fuzzy string similarity on a 0-100 scale.
//!
//! Scores are based on the indel distance (insertions and deletions only),
//! normalized by the combined length: `100 * 2 * LCS / (len_a + len_b)`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which token-order-invariant metric the resolver uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    /// Compare sorted token strings.
    TokenSort,
    /// Compare shared and distinct token sets; a phrase fully contained in
    /// the utterance scores 100.
    #[default]
    TokenSet,
}

impl Scorer {
    pub fn score(self, a: &str, b: &str) -> f64 {
        match self {
            Scorer::TokenSort => token_sort_ratio(a, b),
            Scorer::TokenSet => token_set_ratio(a, b),
        }
    }
}

/// Lowercase and replace anything that is not alphanumeric with a space.
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(text: &str) -> Vec<String> {
    normalize(text).split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect()
}

/// Length of the longest common subsequence of two char slices.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                current[j].max(previous[j + 1])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Normalized indel similarity of two strings as given.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(&a, &b) as f64 / total as f64
}

/// Similarity of the two strings after sorting their tokens.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let mut ta = tokens(a);
    let mut tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    ta.sort();
    tb.sort();
    ratio(&ta.join(" "), &tb.join(" "))
}

/// Token-set similarity: 100 when one token set contains the other,
/// otherwise the best ratio between the shared tokens and each side.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let set_a: BTreeSet<String> = tokens(a).into_iter().collect();
    let set_b: BTreeSet<String> = tokens(b).into_iter().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let shared: Vec<&str> = set_a.intersection(&set_b).map(String::as_str).collect();
    let only_a: Vec<&str> = set_a.difference(&set_b).map(String::as_str).collect();
    let only_b: Vec<&str> = set_b.difference(&set_a).map(String::as_str).collect();

    if !shared.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let shared = shared.join(" ");
    let join = |rest: &[&str]| {
        let rest = rest.join(" ");
        if shared.is_empty() {
            rest
        } else {
            format!("{} {}", shared, rest)
        }
    };
    let with_a = join(&only_a);
    let with_b = join(&only_b);

    let mut best = ratio(&with_a, &with_b);
    if !shared.is_empty() {
        best = best.max(ratio(&shared, &with_a)).max(ratio(&shared, &with_b));
    }
    best
}
