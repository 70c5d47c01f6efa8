// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details
//
//! # Reference resolution
//!
//! Answers find-all-references queries against a built [`SymbolTable`]:
//! the identifier under the cursor is mapped to its declaration and every
//! reference linked to it is collected.

use crate::error::{QueryError, QueryResult};
use crate::symbol::{DeclarationId, ExternalSymbol, ReferenceKind, Resolution};
use crate::table::{Occurrence, SymbolTable};
use flink_sql_grammar::{Position, Range};

/// The symbol an occurrence stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Declared in the document
    Declaration(DeclarationId),
    /// Declared outside the document; occurrences are grouped by kind and name
    External(ReferenceKind, ExternalSymbol),
}

/// Read-only reference queries over one symbol table
#[derive(Debug, Clone, Copy)]
pub struct ReferenceResolver<'a> {
    table: &'a SymbolTable,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(table: &'a SymbolTable) -> Self {
        Self { table }
    }

    /// Find the occurrence under `position` and the symbol it stands for
    ///
    /// # Errors
    ///
    /// - [`QueryError::NotFound`] when no identifier covers `position`
    /// - [`QueryError::Unresolved`] when the identifier is an unresolved reference
    pub fn resolve_target(&self, position: Position) -> QueryResult<(Occurrence, Target)> {
        let occurrence = self
            .table
            .occurrence_at(position)
            .ok_or(QueryError::NotFound(position))?;

        let target = match occurrence {
            Occurrence::Declaration(id) => Target::Declaration(id),
            Occurrence::Reference(id) => {
                let reference = self
                    .table
                    .reference(id)
                    .ok_or(QueryError::NotFound(position))?;
                match &reference.resolution {
                    Resolution::Declared(declaration) => Target::Declaration(*declaration),
                    Resolution::External(symbol) => {
                        Target::External(reference.kind, symbol.clone())
                    }
                    Resolution::Unresolved => {
                        return Err(QueryError::Unresolved(reference.name.clone()));
                    }
                }
            }
        };
        Ok((occurrence, target))
    }

    /// Every range naming `target`, sorted by position and deduplicated
    pub fn occurrences(&self, target: &Target) -> Vec<Range> {
        let mut ranges: Vec<Range> = match target {
            Target::Declaration(id) => self
                .table
                .declaration(*id)
                .map(|d| d.range)
                .into_iter()
                .chain(self.table.references_to(*id).map(|r| r.range))
                .collect(),
            Target::External(kind, symbol) => self
                .table
                .external_references(*kind, symbol)
                .map(|r| r.range)
                .collect(),
        };
        ranges.sort_by_key(|r| (r.start, r.end));
        ranges.dedup();
        ranges
    }

    /// Find all references to the identifier at `position`
    ///
    /// The result includes the declaration itself.
    ///
    /// # Examples
    ///
    /// ```
    /// use flink_sql_lsp_semantic::{analyze, ReferenceResolver};
    /// use flink_sql_grammar::Position;
    ///
    /// let analysis = analyze("SELECT a.x FROM t AS a");
    /// let ranges = ReferenceResolver::new(&analysis.table)
    ///     .find_references(Position::new(0, 7))
    ///     .unwrap();
    ///
    /// assert_eq!(ranges.len(), 2);
    /// assert_eq!(ranges[0].start, Position::new(0, 7));
    /// assert_eq!(ranges[1].start, Position::new(0, 21));
    /// ```
    pub fn find_references(&self, position: Position) -> QueryResult<Vec<Range>> {
        let (_, target) = self.resolve_target(position)?;
        Ok(self.occurrences(&target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze;

    fn pos(character: u32) -> Position {
        Position::new(0, character)
    }

    #[test]
    fn test_find_references_from_declaration_and_reference() {
        let analysis = analyze("SELECT a.x FROM t AS a");
        let resolver = ReferenceResolver::new(&analysis.table);

        let from_reference = resolver.find_references(pos(7)).unwrap();
        let from_declaration = resolver.find_references(pos(21)).unwrap();
        assert_eq!(from_reference, from_declaration);
        assert_eq!(from_reference.len(), 2);
    }

    #[test]
    fn test_find_references_unresolved() {
        let analysis = analyze("SELECT b.x FROM t AS a");
        let resolver = ReferenceResolver::new(&analysis.table);

        assert_eq!(
            resolver.find_references(pos(7)),
            Err(QueryError::Unresolved("b".to_string()))
        );
        assert_eq!(
            resolver.find_references(pos(9)),
            Err(QueryError::Unresolved("x".to_string()))
        );
    }

    #[test]
    fn test_find_references_not_found() {
        let analysis = analyze("SELECT a.x FROM t AS a");
        let resolver = ReferenceResolver::new(&analysis.table);

        assert_eq!(
            resolver.find_references(pos(13)),
            Err(QueryError::NotFound(pos(13)))
        );
    }

    #[test]
    fn test_external_table_occurrences_are_grouped() {
        let source = "SELECT * FROM orders;\nSELECT * FROM orders AS o";
        let analysis = analyze(source);
        let resolver = ReferenceResolver::new(&analysis.table);

        let ranges = resolver.find_references(pos(14)).unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1].start, Position::new(1, 14));
    }

    #[test]
    fn test_external_columns_group_by_relation() {
        let source = "SELECT id FROM a;\nSELECT id FROM b;\nSELECT id FROM a";
        let analysis = analyze(source);
        let resolver = ReferenceResolver::new(&analysis.table);

        let ranges = resolver.find_references(pos(7)).unwrap();
        let lines: Vec<u32> = ranges.iter().map(|r| r.start.line).collect();
        assert_eq!(lines, vec![0, 2]);
    }

    #[test]
    fn test_results_are_sorted() {
        let source = "CREATE TABLE t (x INT);\nSELECT x FROM t WHERE x > 0 ORDER BY x";
        let analysis = analyze(source);
        let resolver = ReferenceResolver::new(&analysis.table);

        let ranges = resolver.find_references(Position::new(0, 16)).unwrap();
        assert_eq!(ranges.len(), 4);
        assert!(ranges.windows(2).all(|w| w[0].start < w[1].start));
    }
}
