// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Flink SQL Grammar
//!
//! Lexer and error-tolerant parser for the Flink SQL dialect.
//!
//! The parser never fails: every input produces a [`ParseTree`] holding the
//! statements it could recognize and the syntax errors it recovered from.
//!
//! ## Usage
//!
//! ```rust
//! use flink_sql_grammar::{parse, Statement};
//!
//! let tree = parse("SELECT o.id FROM orders AS o");
//! assert!(tree.errors.is_empty());
//! assert!(matches!(tree.script.statements[0], Statement::Query(_)));
//! ```

pub mod error;
pub mod keywords;
pub mod lexer;
mod parser;
pub mod syntax;
pub mod text;

pub use error::{SyntaxError, SyntaxErrorKind};
pub use keywords::{is_reserved_keyword, is_valid_identifier, unquote_identifier};
pub use parser::MAX_NESTING_DEPTH;
pub use syntax::*;
pub use text::{LineIndex, Position, Range};

use parser::Parser;
use tracing::debug;

/// Result of parsing a document
#[derive(Debug, Clone)]
pub struct ParseTree {
    /// Recognized statements in document order
    pub script: Script,
    /// Syntax errors, in the order they were encountered
    pub errors: Vec<SyntaxError>,
    /// Offset/position mapping for the parsed text
    pub line_index: LineIndex,
}

impl ParseTree {
    /// Whether the document parsed without syntax errors
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse a Flink SQL document
///
/// # Arguments
///
/// * `text` - Full document text, possibly containing several statements
///
/// # Returns
///
/// A [`ParseTree`]; syntax errors are reported in [`ParseTree::errors`].
pub fn parse(text: &str) -> ParseTree {
    let mut parser = Parser::new(text);
    let script = parser.parse_script();
    let (errors, line_index) = parser.finish();

    debug!(
        "Parsed {} statement(s) with {} syntax error(s)",
        script.statements.len(),
        errors.len()
    );

    ParseTree {
        script,
        errors,
        line_index,
    }
}
