// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Test case validation logic
//!
//! Checks reference and rename results against a [`TestCase`]. Results are
//! passed in plain form (ranges, edits as `(Range, String)` pairs, a failure
//! reason) so this crate stays independent of the crates under test.

use crate::test_case_parser::{Expected, TestCase};
use flink_sql_grammar::{LineIndex, Position, Range};
use thiserror::Error;

/// Cursor marker used in test inputs
pub const CURSOR_MARKER: char = '|';

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Expected ranges {expected:?}, got {actual:?}")]
    RangeMismatch {
        expected: Vec<Range>,
        actual: Vec<Range>,
    },

    #[error("Expected output:\n{expected}\ngot:\n{actual}")]
    OutputMismatch { expected: String, actual: String },

    #[error("Expected failure '{expected}', got {actual}")]
    OutcomeMismatch { expected: String, actual: String },

    #[error("Edit range {0} is outside the document")]
    EditOutOfBounds(Range),
}

/// Outcome of the query a test case exercises
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ranges(Vec<Range>),
    Edits(Vec<(Range, String)>),
    /// Failure with its reason string
    Failed(String),
}

/// Validate a query outcome against a test case
///
/// # Arguments
///
/// * `source` - Document text with the cursor marker removed
/// * `actual` - Outcome of the query
/// * `case` - The test case with expected results
pub fn validate_outcome(
    source: &str,
    actual: &Outcome,
    case: &TestCase,
) -> Result<(), ValidationError> {
    match (&case.expected, actual) {
        (Expected::Ranges(expected), Outcome::Ranges(ranges)) => {
            if expected != ranges {
                return Err(ValidationError::RangeMismatch {
                    expected: expected.clone(),
                    actual: ranges.clone(),
                });
            }
            Ok(())
        }
        (Expected::Output(expected), Outcome::Edits(edits)) => {
            let output = apply_edits(source, edits)?;
            if output != *expected {
                return Err(ValidationError::OutputMismatch {
                    expected: expected.clone(),
                    actual: output,
                });
            }
            Ok(())
        }
        (Expected::Error(reason), Outcome::Failed(actual)) if reason == actual => Ok(()),
        (expected, actual) => Err(ValidationError::OutcomeMismatch {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }),
    }
}

/// Apply edits to `source`, last edit first so earlier offsets stay valid
pub fn apply_edits(source: &str, edits: &[(Range, String)]) -> Result<String, ValidationError> {
    let index = LineIndex::new(source);
    let mut ordered: Vec<&(Range, String)> = edits.iter().collect();
    ordered.sort_by_key(|(range, _)| std::cmp::Reverse(range.start));

    let mut text = source.to_string();
    for (range, new_text) in ordered {
        let start = index
            .offset(range.start)
            .ok_or(ValidationError::EditOutOfBounds(*range))?;
        let end = index
            .offset(range.end)
            .ok_or(ValidationError::EditOutOfBounds(*range))?;
        text.replace_range(start..end, new_text);
    }
    Ok(text)
}

/// Get the byte offset of the cursor marker
pub fn get_cursor_offset(input: &str) -> Option<usize> {
    input.find(CURSOR_MARKER)
}

/// Remove cursor marker from input SQL
pub fn remove_cursor_marker(input: &str) -> String {
    match get_cursor_offset(input) {
        Some(offset) => {
            let mut text = input.to_string();
            text.remove(offset);
            text
        }
        None => input.to_string(),
    }
}

/// Split an input into its text and the cursor position
///
/// Only the first marker counts, so `||` further on stays intact.
pub fn extract_cursor(input: &str) -> Option<(String, Position)> {
    let offset = get_cursor_offset(input)?;
    let text = remove_cursor_marker(input);
    let position = LineIndex::new(&text).position(offset);
    Some((text, position))
}

/// Position of the `nth` occurrence of `needle` in `text`
pub fn position_of(text: &str, needle: &str, nth: usize) -> Option<Position> {
    let (offset, _) = text.match_indices(needle).nth(nth)?;
    Some(LineIndex::new(text).position(offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_case_parser::Action;

    fn range(line: u32, start: u32, end: u32) -> Range {
        Range::new(Position::new(line, start), Position::new(line, end))
    }

    fn case(expected: Expected) -> TestCase {
        TestCase {
            description: "Test".to_string(),
            action: Action::References,
            input: "SELECT |a.x FROM t AS a".to_string(),
            expected,
        }
    }

    #[test]
    fn test_validate_ranges() {
        let expected = vec![range(0, 7, 8), range(0, 21, 22)];
        let test_case = case(Expected::Ranges(expected.clone()));

        assert!(validate_outcome("", &Outcome::Ranges(expected), &test_case).is_ok());
        assert!(validate_outcome("", &Outcome::Ranges(vec![range(0, 7, 8)]), &test_case).is_err());
    }

    #[test]
    fn test_validate_output() {
        let source = "SELECT a.x FROM t AS a";
        let test_case = case(Expected::Output("SELECT o.x FROM t AS o".to_string()));
        let edits = vec![
            (range(0, 7, 8), "o".to_string()),
            (range(0, 21, 22), "o".to_string()),
        ];

        assert!(validate_outcome(source, &Outcome::Edits(edits), &test_case).is_ok());
    }

    #[test]
    fn test_validate_failure_reason() {
        let test_case = case(Expected::Error("conflict".to_string()));
        assert!(validate_outcome("", &Outcome::Failed("conflict".to_string()), &test_case).is_ok());
        assert!(
            validate_outcome("", &Outcome::Failed("unresolved".to_string()), &test_case).is_err()
        );
        assert!(validate_outcome("", &Outcome::Ranges(vec![]), &test_case).is_err());
    }

    #[test]
    fn test_apply_edits_multiline() {
        let source = "SELECT x\nFROM t\nWHERE x > 1";
        let edits = vec![
            (range(2, 6, 7), "y".to_string()),
            (range(0, 7, 8), "y".to_string()),
        ];
        assert_eq!(
            apply_edits(source, &edits).unwrap(),
            "SELECT y\nFROM t\nWHERE y > 1"
        );
    }

    #[test]
    fn test_extract_cursor() {
        let (text, position) = extract_cursor("SELECT a\nFROM |t").unwrap();
        assert_eq!(text, "SELECT a\nFROM t");
        assert_eq!(position, Position::new(1, 5));
        assert!(extract_cursor("SELECT 1").is_none());
    }

    #[test]
    fn test_remove_cursor_marker_keeps_concat() {
        assert_eq!(
            remove_cursor_marker("SELECT |a || b FROM t"),
            "SELECT a || b FROM t"
        );
    }

    #[test]
    fn test_position_of() {
        assert_eq!(
            position_of("SELECT a.x FROM t AS a", "a", 1),
            Some(Position::new(0, 21))
        );
        assert_eq!(position_of("SELECT 1", "z", 0), None);
    }
}
