// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! SQL-specific test helpers and custom assertions

use flink_sql_grammar::{LineIndex, Range};

/// Custom assertion helpers for range-based results
pub struct SqlAssertions;

impl SqlAssertions {
    /// Assert that `range` covers exactly `expected` in `source`
    pub fn assert_range_text(source: &str, range: Range, expected: &str) {
        let index = LineIndex::new(source);
        match index.slice(range) {
            Some(text) => assert_eq!(
                text, expected,
                "Range {} covers '{}', expected '{}'",
                range, text, expected
            ),
            None => panic!("Range {} is outside the document", range),
        }
    }

    /// Assert that every range covers the same text
    pub fn assert_all_cover(source: &str, ranges: &[Range], expected: &str) {
        assert!(!ranges.is_empty(), "Expected at least one range");
        for range in ranges {
            Self::assert_range_text(source, *range, expected);
        }
    }

    /// Assert that ranges are strictly ascending by start, then end
    pub fn assert_sorted_unique(ranges: &[Range]) {
        for pair in ranges.windows(2) {
            assert!(
                (pair[0].start, pair[0].end) < (pair[1].start, pair[1].end),
                "Ranges out of order or duplicated: {} then {}",
                pair[0],
                pair[1]
            );
        }
    }

    /// Assert that no two ranges overlap
    pub fn assert_disjoint(ranges: &[Range]) {
        for (i, a) in ranges.iter().enumerate() {
            for b in &ranges[i + 1..] {
                assert!(!a.overlaps(b), "Ranges {} and {} overlap", a, b);
            }
        }
    }
}
