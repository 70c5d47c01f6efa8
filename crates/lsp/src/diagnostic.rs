// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Diagnostics Infrastructure
//!
//! This module provides the diagnostic infrastructure for Flink SQL LSP.
//!
//! ## Overview
//!
//! The diagnostics system handles:
//! - Collection of syntax and semantic problems through the analyzer
//! - Conversion to LSP diagnostic format
//! - Publishing diagnostics to clients and clearing them again
//!
//! ## Architecture
//!
//! ```text
//! Document → DiagnosticsFeature → analyze_into(sink) → SqlDiagnostic → LSP Diagnostic → Client
//! ```
//!
//! The [`DiagnosticsFeature`] exists only while diagnostics are enabled. The
//! backend creates it from the configuration and drops it (after clearing
//! everything it published) when diagnostics are switched off.
//!
//! ## Usage
//!
//! ```rust
//! use flink_sql_lsp::{DiagnosticsConfig, DiagnosticsFeature, Document};
//! use tower_lsp::lsp_types::Url;
//!
//! let feature = DiagnosticsFeature::new(&DiagnosticsConfig::default());
//! let uri = Url::parse("file:///query.sql").unwrap();
//! let document = Document::new(uri, "SELECT b.x FROM t AS a".to_string(), 1, "flinksql".to_string());
//!
//! let diagnostics = feature.collect(&document);
//! assert_eq!(diagnostics.len(), 1);
//! assert!(diagnostics[0].message.contains("'b'"));
//! ```

use crate::document::Document;
use flink_sql_lsp_semantic::{self as semantic, DiagnosticKind, DiagnosticSink, Severity};
use std::collections::HashSet;
use tokio::sync::Mutex;
use tower_lsp::Client;
use tower_lsp::lsp_types::*;
use tracing::{debug, info};

use crate::config::DiagnosticsConfig;

/// Value of the `source` field of every published diagnostic
pub const DIAGNOSTIC_SOURCE: &str = "flink-sql-lsp";

/// Diagnostic code identifying the type of diagnostic
///
/// These codes are used to categorize different types of SQL errors and warnings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    /// Syntax error reported by the parser
    SyntaxError,

    /// Structurally incomplete construct (`FROM t AS`, `a.`)
    MalformedConstruct,

    /// Second declaration of a name in one scope
    DuplicateDeclaration,

    /// Reference with no visible declaration
    UnresolvedReference,

    /// Reference matching several declarations
    AmbiguousReference,

    /// Custom diagnostic code with description
    Custom(String),
}

impl DiagnosticCode {
    /// Get the string representation of this diagnostic code
    pub fn as_str(&self) -> String {
        match self {
            DiagnosticCode::SyntaxError => "SYNTAX-001".to_string(),
            DiagnosticCode::MalformedConstruct => "SYNTAX-002".to_string(),
            DiagnosticCode::DuplicateDeclaration => "SEMANTIC-001".to_string(),
            DiagnosticCode::UnresolvedReference => "SEMANTIC-002".to_string(),
            DiagnosticCode::AmbiguousReference => "SEMANTIC-003".to_string(),
            DiagnosticCode::Custom(s) => s.clone(),
        }
    }

    /// Get a human-readable description of this diagnostic code
    pub fn description(&self) -> String {
        match self {
            DiagnosticCode::SyntaxError => "SQL syntax error".to_string(),
            DiagnosticCode::MalformedConstruct => "Incomplete SQL construct".to_string(),
            DiagnosticCode::DuplicateDeclaration => "Duplicate declaration".to_string(),
            DiagnosticCode::UnresolvedReference => "Unresolved reference".to_string(),
            DiagnosticCode::AmbiguousReference => "Ambiguous reference".to_string(),
            DiagnosticCode::Custom(s) => format!("Custom diagnostic: {}", s),
        }
    }
}

impl From<DiagnosticKind> for DiagnosticCode {
    fn from(kind: DiagnosticKind) -> Self {
        match kind {
            DiagnosticKind::SyntaxError => DiagnosticCode::SyntaxError,
            DiagnosticKind::MalformedConstruct => DiagnosticCode::MalformedConstruct,
            DiagnosticKind::DuplicateDeclaration => DiagnosticCode::DuplicateDeclaration,
            DiagnosticKind::UnresolvedReference => DiagnosticCode::UnresolvedReference,
            DiagnosticKind::AmbiguousReference => DiagnosticCode::AmbiguousReference,
        }
    }
}

impl From<DiagnosticCode> for NumberOrString {
    fn from(code: DiagnosticCode) -> Self {
        NumberOrString::String(code.as_str())
    }
}

fn lsp_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Information => DiagnosticSeverity::INFORMATION,
        Severity::Hint => DiagnosticSeverity::HINT,
    }
}

/// SQL diagnostic
///
/// Represents a diagnostic that can be reported for SQL code.
/// This is the internal representation before conversion to LSP format.
#[derive(Debug, Clone)]
pub struct SqlDiagnostic {
    /// Diagnostic message
    pub message: String,

    /// Severity level
    pub severity: DiagnosticSeverity,

    /// Range in the source code
    pub range: Range,

    /// Diagnostic code
    pub code: Option<DiagnosticCode>,

    /// Source of the diagnostic (always "flink-sql-lsp")
    pub source: String,
}

impl SqlDiagnostic {
    /// Create a new SQL diagnostic
    ///
    /// # Arguments
    ///
    /// - `message`: The diagnostic message
    /// - `severity`: The severity level
    /// - `range`: The range in the source code
    pub fn new(message: String, severity: DiagnosticSeverity, range: Range) -> Self {
        Self {
            message,
            severity,
            range,
            code: None,
            source: DIAGNOSTIC_SOURCE.to_string(),
        }
    }

    /// Set the diagnostic code
    pub fn with_code(mut self, code: DiagnosticCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Convert an analyzer diagnostic, mapping its range onto `document`
    pub fn from_semantic(diagnostic: &semantic::Diagnostic, document: &Document) -> Self {
        Self::new(
            diagnostic.message.clone(),
            lsp_severity(diagnostic.severity),
            document.to_lsp_range(diagnostic.range),
        )
        .with_code(diagnostic.kind.into())
    }

    /// Convert to LSP diagnostic format
    pub fn to_lsp(self) -> Diagnostic {
        Diagnostic {
            range: self.range,
            severity: Some(self.severity),
            code: self.code.map(|c| c.into()),
            code_description: None,
            source: Some(self.source),
            message: self.message,
            related_information: None,
            tags: None,
            data: None,
        }
    }

    /// Create an error diagnostic
    pub fn error(message: String, range: Range) -> Self {
        Self::new(message, DiagnosticSeverity::ERROR, range)
    }

    /// Create an information diagnostic
    pub fn information(message: String, range: Range) -> Self {
        Self::new(message, DiagnosticSeverity::INFORMATION, range)
    }
}

/// Diagnostics handle, alive while diagnostics are enabled
///
/// Owns the problem cap and remembers which documents it published for, so
/// tearing it down can clear them.
#[derive(Debug)]
pub struct DiagnosticsFeature {
    max_problems: usize,
    published: Mutex<HashSet<Url>>,
}

impl DiagnosticsFeature {
    pub fn new(config: &DiagnosticsConfig) -> Self {
        Self {
            max_problems: config.max_problems,
            published: Mutex::new(HashSet::new()),
        }
    }

    pub fn max_problems(&self) -> usize {
        self.max_problems
    }

    pub fn set_max_problems(&mut self, max_problems: usize) {
        self.max_problems = max_problems;
    }

    /// Analyze a document snapshot and convert its diagnostics
    ///
    /// At most `max_problems` diagnostics are returned; when some were dropped
    /// an information diagnostic at the start of the document says how many.
    pub fn collect(&self, document: &Document) -> Vec<SqlDiagnostic> {
        let mut sink = DiagnosticSink::with_limit(self.max_problems);
        semantic::analyze_into(&document.get_content(), &mut sink);
        let dropped = sink.dropped();

        let mut diagnostics: Vec<SqlDiagnostic> = sink
            .take_sorted()
            .iter()
            .map(|d| SqlDiagnostic::from_semantic(d, document))
            .collect();

        if dropped > 0 {
            debug!(
                "Dropped {} diagnostics over the limit of {} for {}",
                dropped,
                self.max_problems,
                document.uri()
            );
            diagnostics.push(
                SqlDiagnostic::information(
                    format!(
                        "{} more problems not shown (diagnostics.maxProblems = {})",
                        dropped, self.max_problems
                    ),
                    Range::default(),
                )
                .with_code(DiagnosticCode::Custom("LIMIT-001".to_string())),
            );
        }

        diagnostics
    }

    /// Analyze a document and publish its diagnostics
    ///
    /// # Returns
    ///
    /// The number of diagnostics published
    pub async fn publish(&self, client: &Client, document: &Document) -> usize {
        let diagnostics: Vec<Diagnostic> = self
            .collect(document)
            .into_iter()
            .map(|d| d.to_lsp())
            .collect();

        let count = diagnostics.len();
        if count > 0 {
            info!("Publishing {} diagnostics for {}", count, document.uri());
        }

        self.published.lock().await.insert(document.uri().clone());
        client
            .publish_diagnostics(document.uri().clone(), diagnostics, Some(document.version()))
            .await;

        count
    }

    /// Clear the diagnostics of one document
    pub async fn clear(&self, client: &Client, uri: &Url) {
        if self.published.lock().await.remove(uri) {
            client.publish_diagnostics(uri.clone(), Vec::new(), None).await;
        }
    }

    /// Clear everything this handle published
    pub async fn teardown(self, client: &Client) {
        let published = self.published.into_inner();
        info!("Clearing diagnostics for {} documents", published.len());
        for uri in published {
            client.publish_diagnostics(uri, Vec::new(), None).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_range(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Range {
        Range {
            start: Position {
                line: start_line,
                character: start_col,
            },
            end: Position {
                line: end_line,
                character: end_col,
            },
        }
    }

    fn document(content: &str) -> Document {
        let uri = Url::parse("file:///test.sql").unwrap();
        Document::new(uri, content.to_string(), 1, "flinksql".to_string())
    }

    fn feature(max_problems: usize) -> DiagnosticsFeature {
        DiagnosticsFeature::new(&DiagnosticsConfig {
            max_problems,
            ..Default::default()
        })
    }

    #[test]
    fn test_sql_diagnostic_new() {
        let range = create_test_range(0, 0, 0, 10);
        let diagnostic =
            SqlDiagnostic::new("Test message".to_string(), DiagnosticSeverity::ERROR, range);

        assert_eq!(diagnostic.message, "Test message");
        assert_eq!(diagnostic.severity, DiagnosticSeverity::ERROR);
        assert_eq!(diagnostic.source, "flink-sql-lsp");
        assert!(diagnostic.code.is_none());
    }

    #[test]
    fn test_sql_diagnostic_to_lsp() {
        let range = create_test_range(0, 0, 1, 5);
        let lsp_diagnostic = SqlDiagnostic::error("Error".to_string(), range)
            .with_code(DiagnosticCode::UnresolvedReference)
            .to_lsp();

        assert_eq!(lsp_diagnostic.message, "Error");
        assert_eq!(lsp_diagnostic.range, range);
        assert_eq!(lsp_diagnostic.severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(lsp_diagnostic.source, Some("flink-sql-lsp".to_string()));
        assert_eq!(
            lsp_diagnostic.code,
            Some(NumberOrString::String("SEMANTIC-002".to_string()))
        );
    }

    #[test]
    fn test_diagnostic_code_as_str() {
        assert_eq!(DiagnosticCode::SyntaxError.as_str(), "SYNTAX-001");
        assert_eq!(DiagnosticCode::MalformedConstruct.as_str(), "SYNTAX-002");
        assert_eq!(DiagnosticCode::DuplicateDeclaration.as_str(), "SEMANTIC-001");
        assert_eq!(DiagnosticCode::UnresolvedReference.as_str(), "SEMANTIC-002");
        assert_eq!(DiagnosticCode::AmbiguousReference.as_str(), "SEMANTIC-003");
        assert_eq!(
            DiagnosticCode::Custom("CUSTOM-123".to_string()).as_str(),
            "CUSTOM-123"
        );
    }

    #[test]
    fn test_codes_match_analyzer_codes() {
        for kind in [
            DiagnosticKind::SyntaxError,
            DiagnosticKind::MalformedConstruct,
            DiagnosticKind::DuplicateDeclaration,
            DiagnosticKind::UnresolvedReference,
            DiagnosticKind::AmbiguousReference,
        ] {
            assert_eq!(DiagnosticCode::from(kind).as_str(), kind.code());
        }
    }

    #[test]
    fn test_collect_clean_document() {
        let diagnostics = feature(100).collect(&document("SELECT a.x FROM t AS a"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_collect_maps_severity_and_range() {
        let diagnostics = feature(100).collect(&document("SELECT a.x\nFROM t AS"));

        assert_eq!(diagnostics.len(), 2);
        let malformed = diagnostics
            .iter()
            .find(|d| d.code == Some(DiagnosticCode::MalformedConstruct))
            .unwrap();
        assert_eq!(malformed.severity, DiagnosticSeverity::WARNING);
        assert_eq!(malformed.range.start.line, 1);

        let unresolved = diagnostics
            .iter()
            .find(|d| d.code == Some(DiagnosticCode::UnresolvedReference))
            .unwrap();
        assert_eq!(unresolved.range, create_test_range(0, 7, 0, 8));
    }

    #[test]
    fn test_collect_respects_limit() {
        let diagnostics = feature(2).collect(&document("SELECT b.x, c.y, d.z FROM t AS a"));

        assert_eq!(diagnostics.len(), 3);
        let last = diagnostics.last().unwrap();
        assert_eq!(last.severity, DiagnosticSeverity::INFORMATION);
        assert!(last.message.starts_with("1 more problems"));
    }
}
