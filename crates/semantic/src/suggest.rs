// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details
//
//! # Name suggestions
//!
//! "Did you mean" hints for unresolved references, ranked by edit distance.
//! Case differences count as near misses since identifiers are
//! case-sensitive.

use std::cmp::{max, min};

/// Minimum similarity for a candidate to be suggested
const MIN_SIMILARITY: f64 = 0.5;

/// Levenshtein distance between two strings
/// Uses Wagner-Fischer algorithm with O(min(m,n)) space optimization
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m < n {
        return levenshtein_distance(b, a);
    }

    let mut previous: Vec<usize> = (0..=n).collect();

    for (i, &ca) in a_chars.iter().enumerate() {
        let mut current = vec![i + 1];

        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            current.push(min(
                min(previous[j + 1] + 1, current[j] + 1),
                previous[j] + cost,
            ));
        }

        previous = current;
    }

    previous[n]
}

/// Similarity score (0.0 to 1.0) based on edit distance
fn similarity_score(a: &str, b: &str) -> f64 {
    let max_len = max(a.chars().count(), b.chars().count());
    if max_len == 0 {
        return 1.0;
    }

    let distance = levenshtein_distance(a, b);
    1.0 - (distance as f64 / max_len as f64)
}

/// Best candidate for a misspelled `name`, if any is close enough
pub fn closest_match<'a, I>(name: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, f64)> = None;

    for candidate in candidates {
        if candidate == name {
            continue;
        }
        let score = if candidate.eq_ignore_ascii_case(name) {
            1.0
        } else {
            similarity_score(name, candidate)
        };
        if score < MIN_SIMILARITY {
            continue;
        }
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((candidate, score));
        }
    }

    best.map(|(candidate, _)| candidate)
}
