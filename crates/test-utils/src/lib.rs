// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Testing utilities for flink-sql-lsp
//!
//! This crate provides common testing components including:
//! - The `---`-separated test case format for references and rename
//! - Outcome validation and edit application
//! - Range assertions and sample Flink SQL documents

pub mod assertions;
pub mod fixtures;
pub mod test_case_parser;
pub mod test_case_validator;

// Re-exports for convenience
pub use assertions::SqlAssertions;
pub use fixtures::SqlFixtures;
pub use test_case_parser::{
    Action, Expected, ParseError, TestCase, parse_range, parse_test_content, parse_test_file,
};
pub use test_case_validator::{
    CURSOR_MARKER, Outcome, ValidationError, apply_edits, extract_cursor, get_cursor_offset,
    position_of, remove_cursor_marker, validate_outcome,
};
