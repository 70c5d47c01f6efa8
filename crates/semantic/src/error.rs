// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details
//
//! # Error types for symbol queries
//!
//! Failures of find-references and rename. Analysis itself never fails; its
//! problems are reported as [`Diagnostic`](crate::Diagnostic)s.

use flink_sql_grammar::Position;
use thiserror::Error;

/// Result type alias for symbol queries
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors returned by reference and rename queries
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// No identifier occupies the queried position
    #[error("No identifier found at {0}")]
    NotFound(Position),

    /// The identifier is a reference that does not resolve to a declaration
    #[error("'{0}' does not resolve to a declaration")]
    Unresolved(String),

    /// The new name collides with a visible declaration
    #[error("Renaming to '{new_name}' conflicts with the {kind} declared at {at}")]
    Conflict {
        new_name: String,
        kind: String,
        at: Position,
    },

    /// The new name is not a valid Flink SQL identifier
    #[error("'{0}' is not a valid identifier")]
    InvalidName(String),

    /// The identifier names an object declared outside this document
    #[error("'{0}' is declared outside this document")]
    External(String),
}

impl QueryError {
    /// Short machine-readable reason, stable across message wording changes
    pub fn reason(&self) -> &'static str {
        match self {
            QueryError::NotFound(_) => "not-found",
            QueryError::Unresolved(_) => "unresolved",
            QueryError::Conflict { .. } => "conflict",
            QueryError::InvalidName(_) => "invalid-name",
            QueryError::External(_) => "external",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = QueryError::NotFound(Position::new(2, 7));
        assert_eq!(err.to_string(), "No identifier found at 2:7");
        assert_eq!(err.reason(), "not-found");
    }

    #[test]
    fn test_error_display_unresolved() {
        let err = QueryError::Unresolved("b".to_string());
        let msg = err.to_string();
        assert!(msg.contains("'b'"));
        assert!(msg.contains("does not resolve"));
    }

    #[test]
    fn test_error_display_conflict() {
        let err = QueryError::Conflict {
            new_name: "t".to_string(),
            kind: "alias".to_string(),
            at: Position::new(0, 31),
        };
        let msg = err.to_string();
        assert!(msg.contains("'t'"));
        assert!(msg.contains("alias"));
        assert!(msg.contains("0:31"));
        assert_eq!(err.reason(), "conflict");
    }

    #[test]
    fn test_error_display_invalid_name() {
        let err = QueryError::InvalidName("select".to_string());
        assert!(err.to_string().contains("not a valid identifier"));
    }

    #[test]
    fn test_error_display_external() {
        let err = QueryError::External("orders".to_string());
        assert!(err.to_string().contains("outside this document"));
        assert_eq!(err.reason(), "external");
    }
}
