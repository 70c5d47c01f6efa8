// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details
//
//! # Flink SQL LSP - Semantic Analysis Layer
//!
//! This crate turns a Flink SQL parse tree into a symbol table and answers
//! find-references and rename queries against it.
//!
//! ## Overview
//!
//! - **Semantic visitor** ([`SemanticAnalyzer`]): one pass over the parse
//!   tree that builds scopes, declarations and resolved references
//! - **Symbol table** ([`SymbolTable`]): the read-only result of a pass
//! - **Reference resolver** ([`ReferenceResolver`]): position to every
//!   occurrence of the same symbol
//! - **Rename engine** ([`RenameEngine`]): position and new name to a
//!   validated, all-or-nothing batch of [`TextEdit`]s
//!
//! Every analysis starts from scratch; a table is never updated in place.
//!
//! ## Core Concepts
//!
//! ### Scopes
//!
//! A [`Scope`] is a lexical region: the document, a `CREATE TABLE` column
//! list, a query block, a CTE body. Inner scopes see outer declarations.
//!
//! ```rust
//! use flink_sql_lsp_semantic::{ScopeKind, ScopeManager};
//! use flink_sql_grammar::Range;
//!
//! let mut manager = ScopeManager::new();
//! let document = manager.create_scope(ScopeKind::Document, None, Range::default());
//! let query = manager.create_scope(ScopeKind::Query, Some(document), Range::default());
//!
//! let chain: Vec<_> = manager.ancestors(query).map(|s| s.id).collect();
//! assert_eq!(chain, vec![query, document]);
//! ```
//!
//! ### Analysis
//!
//! ```rust
//! use flink_sql_lsp_semantic::{analyze, DeclarationKind, Resolution};
//!
//! let analysis = analyze("SELECT a.x FROM t AS a");
//!
//! let alias = &analysis.table.declarations()[0];
//! assert_eq!(alias.kind, DeclarationKind::Alias);
//! assert!(analysis
//!     .table
//!     .references()
//!     .iter()
//!     .any(|r| r.resolution == Resolution::Declared(alias.id)));
//! assert!(analysis.diagnostics.is_empty());
//! ```
//!
//! ### Diagnostics
//!
//! Problems never abort analysis. Syntax and semantic diagnostics come back
//! together, ordered by range start.
//!
//! ```rust
//! use flink_sql_lsp_semantic::{analyze, DiagnosticKind};
//!
//! let analysis = analyze("SELECT b.x FROM t AS a");
//! assert_eq!(analysis.diagnostics.len(), 1);
//! assert_eq!(analysis.diagnostics[0].kind, DiagnosticKind::UnresolvedReference);
//! ```

pub mod analyzer;
pub mod diagnostics;
pub mod error;
pub mod references;
pub mod rename;
pub mod scope;
pub mod suggest;
pub mod symbol;
pub mod table;

// Re-export commonly used types
pub use analyzer::SemanticAnalyzer;
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Severity};
pub use error::{QueryError, QueryResult};
pub use references::{ReferenceResolver, Target};
pub use rename::{RenameEngine, TextEdit};
pub use scope::{RangeVariable, Scope, ScopeKind, ScopeManager};
pub use symbol::{
    ColumnTarget, Declaration, DeclarationId, DeclarationKind, ExternalSymbol, OutputColumn,
    Reference, ReferenceId, ReferenceKind, Relation, RelationId, RelationSource, Resolution,
    ScopeId,
};
pub use table::{Occurrence, SymbolTable};

/// Symbol table and diagnostics of one document
#[derive(Debug, Clone)]
pub struct Analysis {
    pub table: SymbolTable,
    /// Syntax and semantic diagnostics ordered by range start
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse and analyze a document
pub fn analyze(text: &str) -> Analysis {
    let mut sink = DiagnosticSink::new();
    let table = analyze_into(text, &mut sink);
    Analysis {
        table,
        diagnostics: sink.take_sorted(),
    }
}

/// Parse and analyze a document, reporting into a caller-owned sink
///
/// Syntax errors are pushed before semantic diagnostics, so a capped sink
/// keeps them first. The sink is left unsorted; [`DiagnosticSink::take_sorted`]
/// drains it ordered by range start.
pub fn analyze_into(text: &str, sink: &mut DiagnosticSink) -> SymbolTable {
    let tree = flink_sql_grammar::parse(text);
    for error in &tree.errors {
        sink.push(Diagnostic::from_syntax_error(error));
    }
    SemanticAnalyzer::new().analyze(&tree, sink)
}
