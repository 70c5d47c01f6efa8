// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Find References
//!
//! Answers `textDocument/references` for one open document.
//!
//! Each request analyzes a snapshot of the document, so no analysis state is
//! shared between requests. Positions arrive in UTF-16 code units and are
//! converted to character positions before reaching the analyzer.
//!
//! ## Example
//!
//! ```rust
//! use flink_sql_lsp::{references, Document};
//! use tower_lsp::lsp_types::{Position, Url};
//!
//! let uri = Url::parse("file:///query.sql").unwrap();
//! let document = Document::new(uri, "SELECT a.x FROM t AS a".to_string(), 1, "flinksql".to_string());
//!
//! let locations = references::find_references(&document, Position::new(0, 7), true).unwrap();
//! assert_eq!(locations.len(), 2);
//! ```

use crate::backend::LspError;
use crate::document::Document;
use flink_sql_lsp_semantic::{ReferenceResolver, Target, analyze};
use tower_lsp::lsp_types::{Location, Position};
use tracing::debug;

/// Locations of every occurrence of the symbol under `position`
///
/// With `include_declaration` unset, the declaration's own range is left out.
/// Symbols declared outside the document have no declaration range, so all of
/// their references are always returned.
pub fn find_references(
    document: &Document,
    position: Position,
    include_declaration: bool,
) -> Result<Vec<Location>, LspError> {
    let text_position = document
        .to_text_position(position)
        .ok_or(LspError::InvalidPosition(position))?;

    let analysis = analyze(&document.get_content());
    let resolver = ReferenceResolver::new(&analysis.table);
    let (_, target) = resolver.resolve_target(text_position)?;

    let declaration_range = match &target {
        Target::Declaration(id) if !include_declaration => {
            analysis.table.declaration(*id).map(|d| d.range)
        }
        _ => None,
    };

    let locations: Vec<Location> = resolver
        .occurrences(&target)
        .into_iter()
        .filter(|range| Some(*range) != declaration_range)
        .map(|range| Location::new(document.uri().clone(), document.to_lsp_range(range)))
        .collect();

    debug!(
        "Found {} references at {}:{} in {}",
        locations.len(),
        position.line,
        position.character,
        document.uri()
    );

    Ok(locations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::{Range, Url};

    fn document(content: &str) -> Document {
        let uri = Url::parse("file:///test.sql").unwrap();
        Document::new(uri, content.to_string(), 1, "flinksql".to_string())
    }

    fn range(line: u32, start: u32, end: u32) -> Range {
        Range::new(Position::new(line, start), Position::new(line, end))
    }

    #[test]
    fn test_find_references_with_declaration() {
        let doc = document("SELECT a.x FROM t AS a");
        let locations = find_references(&doc, Position::new(0, 21), true).unwrap();

        let ranges: Vec<Range> = locations.iter().map(|l| l.range).collect();
        assert_eq!(ranges, vec![range(0, 7, 8), range(0, 21, 22)]);
        assert!(locations.iter().all(|l| l.uri == *doc.uri()));
    }

    #[test]
    fn test_find_references_without_declaration() {
        let doc = document("SELECT a.x FROM t AS a");
        let locations = find_references(&doc, Position::new(0, 7), false).unwrap();

        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].range, range(0, 7, 8));
    }

    #[test]
    fn test_find_references_external_keeps_everything() {
        let doc = document("SELECT orders.id FROM orders");
        let locations = find_references(&doc, Position::new(0, 22), false).unwrap();
        assert_eq!(locations.len(), 2);
    }

    #[test]
    fn test_find_references_utf16_positions() {
        // The string literal holds one astral character: two UTF-16 units.
        let doc = document("SELECT '😀', a.x FROM t AS a");
        let locations = find_references(&doc, Position::new(0, 13), true).unwrap();

        let ranges: Vec<Range> = locations.iter().map(|l| l.range).collect();
        assert_eq!(ranges, vec![range(0, 13, 14), range(0, 27, 28)]);
    }

    #[test]
    fn test_find_references_errors() {
        let doc = document("SELECT b.x FROM t AS a");

        let unresolved = find_references(&doc, Position::new(0, 7), true).unwrap_err();
        assert_eq!(unresolved.reason(), "unresolved");

        let not_found = find_references(&doc, Position::new(0, 2), true).unwrap_err();
        assert_eq!(not_found.reason(), "not-found");

        let outside = find_references(&doc, Position::new(4, 0), true).unwrap_err();
        assert!(matches!(outside, LspError::InvalidPosition(_)));
    }
}
