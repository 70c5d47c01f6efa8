// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Syntax errors
//!
//! Errors the parser recovered from. They travel on the [`ParseTree`]
//! rather than aborting the parse.
//!
//! [`ParseTree`]: crate::ParseTree

use crate::text::Range;
use thiserror::Error;

/// Kinds of syntax errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    /// A specific token or construct was expected
    #[error("expected {expected}, found {found}")]
    Expected { expected: String, found: String },

    /// A token that cannot start or continue the current construct
    #[error("unexpected {0}")]
    Unexpected(String),

    /// Characters the lexer could not turn into a token
    #[error("invalid token '{0}'")]
    InvalidToken(String),

    /// Input ended inside a construct
    #[error("unexpected end of input, expected {0}")]
    UnexpectedEof(String),

    /// Groups nested deeper than the parser descends
    #[error("nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}

/// A syntax error with its location
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind} at {range}")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub range: Range,
}

impl SyntaxError {
    pub fn new(kind: SyntaxErrorKind, range: Range) -> Self {
        Self { kind, range }
    }

    /// Message without the location suffix
    pub fn message(&self) -> String {
        format!("Syntax error: {}", self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::Position;

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError::new(
            SyntaxErrorKind::Expected {
                expected: "')'".to_string(),
                found: "end of input".to_string(),
            },
            Range::new(Position::new(0, 3), Position::new(0, 3)),
        );
        let msg = err.to_string();
        assert!(msg.contains("expected ')'"));
        assert!(msg.contains("0:3"));
        assert_eq!(err.message(), "Syntax error: expected ')', found end of input");
    }

    #[test]
    fn test_syntax_error_invalid_token() {
        let err = SyntaxErrorKind::InvalidToken("'abc".to_string());
        assert_eq!(err.to_string(), "invalid token ''abc'");
    }
}
