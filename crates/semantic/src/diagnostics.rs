// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Diagnostics
//!
//! Problems found while parsing and analyzing a document. Analysis writes
//! them into a [`DiagnosticSink`] handed in by the caller; nothing is
//! presented from here.

use flink_sql_grammar::{Range, SyntaxError, SyntaxErrorKind};
use serde::{Deserialize, Serialize};

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

/// Diagnostic kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Reported by the parser
    SyntaxError,
    /// Parsed, but structurally incomplete (`FROM t AS`, `a.`)
    MalformedConstruct,
    /// Second declaration of a name and kind in one scope
    DuplicateDeclaration,
    /// Reference with no visible declaration
    UnresolvedReference,
    /// Reference matching several visible declarations
    AmbiguousReference,
}

impl DiagnosticKind {
    /// Stable diagnostic code
    pub fn code(&self) -> &'static str {
        match self {
            DiagnosticKind::SyntaxError => "SYNTAX-001",
            DiagnosticKind::MalformedConstruct => "SYNTAX-002",
            DiagnosticKind::DuplicateDeclaration => "SEMANTIC-001",
            DiagnosticKind::UnresolvedReference => "SEMANTIC-002",
            DiagnosticKind::AmbiguousReference => "SEMANTIC-003",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            DiagnosticKind::MalformedConstruct => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// A single diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub range: Range,
    pub severity: Severity,
}

impl Diagnostic {
    /// Create a diagnostic with the kind's default severity
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, range: Range) -> Self {
        Self {
            kind,
            message: message.into(),
            range,
            severity: kind.default_severity(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Convert a parser error, adding a hint for common mistakes
    pub fn from_syntax_error(error: &SyntaxError) -> Self {
        Self::new(
            DiagnosticKind::SyntaxError,
            enhance_syntax_message(error),
            error.range,
        )
    }

    pub fn malformed(message: impl Into<String>, range: Range) -> Self {
        Self::new(DiagnosticKind::MalformedConstruct, message, range)
    }

    pub fn duplicate(kind: &str, name: &str, range: Range, first: Range) -> Self {
        Self::new(
            DiagnosticKind::DuplicateDeclaration,
            format!(
                "Duplicate {} '{}' (first declared at {})",
                kind, name, first.start
            ),
            range,
        )
    }

    pub fn unresolved(what: &str, name: &str, range: Range) -> Self {
        Self::new(
            DiagnosticKind::UnresolvedReference,
            format!("Unresolved {} '{}'", what, name),
            range,
        )
    }

    pub fn ambiguous(name: &str, candidates: &[String], range: Range) -> Self {
        Self::new(
            DiagnosticKind::AmbiguousReference,
            format!(
                "Ambiguous reference '{}' (found in {})",
                name,
                candidates.join(", ")
            ),
            range,
        )
    }
}

/// Pick a more helpful message for common syntax mistakes
fn enhance_syntax_message(error: &SyntaxError) -> String {
    match &error.kind {
        SyntaxErrorKind::UnexpectedEof(expected) if expected.contains(')') => {
            "Syntax error: unbalanced parentheses. Check opening/closing pairs".to_string()
        }
        SyntaxErrorKind::Expected { expected, found }
            if expected.contains("end of statement") && found.starts_with('\'') =>
        {
            format!(
                "Syntax error: unexpected {}. Suggestion: check for a missing comma or ';'",
                found
            )
        }
        _ => error.message(),
    }
}

/// Destination for diagnostics produced during one analysis
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    limit: Option<usize>,
    dropped: usize,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` diagnostics; later ones are counted and dropped
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.limit.is_some_and(|limit| self.diagnostics.len() >= limit) {
            self.dropped += 1;
            return;
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Number of diagnostics dropped because of the limit
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drain the sink, ordered by range start (stable for equal starts)
    pub fn take_sorted(&mut self) -> Vec<Diagnostic> {
        let mut diagnostics = std::mem::take(&mut self.diagnostics);
        diagnostics.sort_by_key(|d| d.range.start);
        self.dropped = 0;
        diagnostics
    }
}
