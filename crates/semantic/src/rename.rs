// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details
//
//! # Rename
//!
//! Computes the edit batch for renaming a declared identifier. The target is
//! resolved the same way as find-references; the new name is validated and
//! checked for collisions before any edit is produced, so a failure always
//! means zero edits.

use crate::error::{QueryError, QueryResult};
use crate::references::{ReferenceResolver, Target};
use crate::scope::RangeVariable;
use crate::symbol::{
    ColumnTarget, Declaration, DeclarationKind, OutputColumn, ReferenceKind, RelationSource,
    Resolution, ScopeId,
};
use crate::table::{Occurrence, SymbolTable};
use flink_sql_grammar::{is_valid_identifier, unquote_identifier, Position, Range};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Replacement of one range of document text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

/// Rename queries over one symbol table
#[derive(Debug, Clone, Copy)]
pub struct RenameEngine<'a> {
    table: &'a SymbolTable,
}

impl<'a> RenameEngine<'a> {
    pub fn new(table: &'a SymbolTable) -> Self {
        Self { table }
    }

    /// Range and current text of the identifier that a rename at `position`
    /// would change
    pub fn prepare_rename(&self, position: Position) -> QueryResult<(Range, String)> {
        let (occurrence, declaration) = self.resolve(position)?;
        let range = self
            .table
            .occurrence_range(occurrence)
            .ok_or(QueryError::NotFound(position))?;
        Ok((range, simple_name(declaration).to_string()))
    }

    /// Rename the identifier at `position` to `new_name`
    ///
    /// # Arguments
    ///
    /// * `position` - Cursor on a declaration or on a reference to one
    /// * `new_name` - Replacement, plain or backtick-quoted
    ///
    /// # Returns
    ///
    /// One edit per occurrence, sorted by position.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidName`], [`QueryError::NotFound`],
    /// [`QueryError::Unresolved`], [`QueryError::External`] or
    /// [`QueryError::Conflict`]; no edits are produced in any of these cases.
    ///
    /// # Examples
    ///
    /// ```
    /// use flink_sql_lsp_semantic::{analyze, RenameEngine};
    /// use flink_sql_grammar::Position;
    ///
    /// let analysis = analyze("SELECT a.x FROM t AS a");
    /// let edits = RenameEngine::new(&analysis.table)
    ///     .rename(Position::new(0, 21), "b")
    ///     .unwrap();
    ///
    /// assert_eq!(edits.len(), 2);
    /// assert!(edits.iter().all(|e| e.new_text == "b"));
    /// ```
    pub fn rename(&self, position: Position, new_name: &str) -> QueryResult<Vec<TextEdit>> {
        if !is_valid_identifier(new_name) {
            return Err(QueryError::InvalidName(new_name.to_string()));
        }

        let (_, declaration) = self.resolve(position)?;
        let new_text = unquote_identifier(new_name);

        if new_text != simple_name(declaration) {
            self.check_declarations(declaration, &new_text)?;
            self.check_range_variables(declaration, &new_text)?;
            match declaration.kind {
                DeclarationKind::Column => self.check_relation_columns(declaration, &new_text)?,
                DeclarationKind::Table | DeclarationKind::Cte => {
                    self.check_external_relations(declaration, &new_text)?
                }
                DeclarationKind::Alias => {}
            }
        }

        let ranges = ReferenceResolver::new(self.table)
            .occurrences(&Target::Declaration(declaration.id));
        debug!(
            "Renaming {} '{}' to '{}' at {} location(s)",
            declaration.kind,
            declaration.name,
            new_name,
            ranges.len()
        );

        Ok(ranges
            .into_iter()
            .map(|range| TextEdit {
                range,
                new_text: new_name.to_string(),
            })
            .collect())
    }

    fn resolve(&self, position: Position) -> QueryResult<(Occurrence, &'a Declaration)> {
        let (occurrence, target) = ReferenceResolver::new(self.table).resolve_target(position)?;
        match target {
            Target::Declaration(id) => {
                let declaration = self
                    .table
                    .declaration(id)
                    .ok_or(QueryError::NotFound(position))?;
                Ok((occurrence, declaration))
            }
            Target::External(_, symbol) => {
                let name = match symbol.column {
                    Some(column) => column,
                    None => symbol.relation,
                };
                Err(QueryError::External(name))
            }
        }
    }

    /// Scopes in which an occurrence of `declaration` appears
    fn occurrence_scopes(&self, declaration: &Declaration) -> Vec<ScopeId> {
        let mut scopes: Vec<ScopeId> = std::iter::once(declaration.scope)
            .chain(self.table.references_to(declaration.id).map(|r| r.scope))
            .collect();
        scopes.sort_unstable();
        scopes.dedup();
        scopes
    }

    /// A different declaration of the same kind named `new_text` visible
    /// from any occurrence
    fn check_declarations(&self, declaration: &Declaration, new_text: &str) -> QueryResult<()> {
        let kinds: &[DeclarationKind] = if declaration.kind.is_relation() {
            &[DeclarationKind::Table, DeclarationKind::Cte]
        } else {
            std::slice::from_ref(&declaration.kind)
        };
        let full_name = renamed(declaration, new_text);

        for scope_id in self.occurrence_scopes(declaration) {
            for scope in self.table.scopes().ancestors(scope_id) {
                for kind in kinds {
                    let other = scope
                        .declaration(&full_name, *kind)
                        .filter(|other| *other != declaration.id)
                        .and_then(|other| self.table.declaration(other));
                    if let Some(other) = other {
                        return Err(QueryError::Conflict {
                            new_name: new_text.to_string(),
                            kind: other.kind.to_string(),
                            at: other.range.start,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// A range variable named `new_text` that would capture a renamed
    /// qualifier
    fn check_range_variables(&self, declaration: &Declaration, new_text: &str) -> QueryResult<()> {
        match declaration.kind {
            DeclarationKind::Alias => {
                let owns = |rv: &RangeVariable| rv.alias == Some(declaration.id);
                for scope_id in self.occurrence_scopes(declaration) {
                    let walked: Vec<ScopeId> = self
                        .table
                        .scopes()
                        .ancestors(scope_id)
                        .map(|s| s.id)
                        .scan(false, |done, id| {
                            if *done {
                                return None;
                            }
                            *done = id == declaration.scope;
                            Some(id)
                        })
                        .collect();
                    self.check_scopes(&walked, new_text, owns)?;
                }
                Ok(())
            }
            DeclarationKind::Table | DeclarationKind::Cte => {
                let owns = |rv: &RangeVariable| {
                    rv.alias.is_none()
                        && self.table.relation(rv.relation).is_some_and(|relation| {
                            relation.source == RelationSource::Declared(declaration.id)
                        })
                };
                for reference in self.table.references_to(declaration.id) {
                    if reference.kind != ReferenceKind::Relation {
                        continue;
                    }
                    // Scopes up to the one binding the table under its own name
                    let mut walked = Vec::new();
                    let mut bound = false;
                    for scope in self.table.scopes().ancestors(reference.scope) {
                        walked.push(scope.id);
                        if scope.range_variables.iter().any(|rv| owns(rv)) {
                            bound = true;
                            break;
                        }
                    }
                    if bound {
                        self.check_scopes(&walked, new_text, owns)?;
                    }
                }
                Ok(())
            }
            DeclarationKind::Column => Ok(()),
        }
    }

    /// A column named `new_text` of another relation visible where the
    /// renamed column is referenced
    ///
    /// A reference pinned to one relation only checks that relation. For the
    /// others the walk stops at the scope whose relation exposes the column;
    /// outer relations cannot capture it.
    fn check_relation_columns(&self, declaration: &Declaration, new_text: &str) -> QueryResult<()> {
        let binds = |column: &OutputColumn| column.target == ColumnTarget::Declared(declaration.id);
        let conflict = |at: Position| QueryError::Conflict {
            new_name: new_text.to_string(),
            kind: DeclarationKind::Column.to_string(),
            at,
        };

        for reference in self.table.references_to(declaration.id) {
            if let Some(relation) = reference.relation {
                let taken = self
                    .table
                    .relation(relation)
                    .and_then(|relation| relation.find_column(new_text))
                    .is_some_and(|c| !binds(c));
                if taken {
                    return Err(conflict(reference.range.start));
                }
                continue;
            }

            for scope in self.table.scopes().ancestors(reference.scope) {
                let mut bound = false;
                for rv in &scope.range_variables {
                    let Some(relation) = self.table.relation(rv.relation) else {
                        continue;
                    };
                    bound |= relation.columns.iter().any(|c| binds(c));
                    if relation.find_column(new_text).is_some_and(|c| !binds(c)) {
                        return Err(conflict(self.range_variable_position(rv)));
                    }
                }
                if bound {
                    break;
                }
            }
        }
        Ok(())
    }

    /// A catalog table reference named like the renamed table or CTE inside
    /// its declaring scope, which the rename would capture
    fn check_external_relations(&self, declaration: &Declaration, new_text: &str) -> QueryResult<()> {
        let full_name = renamed(declaration, new_text);
        let captured = self.table.references().iter().find(|reference| {
            reference.kind == ReferenceKind::Relation
                && matches!(
                    &reference.resolution,
                    Resolution::External(symbol)
                        if symbol.column.is_none() && symbol.relation == full_name
                )
                && self
                    .table
                    .scopes()
                    .ancestors(reference.scope)
                    .any(|scope| scope.id == declaration.scope)
        });

        match captured {
            Some(reference) => Err(QueryError::Conflict {
                new_name: new_text.to_string(),
                kind: "catalog table".to_string(),
                at: reference.range.start,
            }),
            None => Ok(()),
        }
    }

    fn check_scopes(
        &self,
        scopes: &[ScopeId],
        new_text: &str,
        owns: impl Fn(&RangeVariable) -> bool,
    ) -> QueryResult<()> {
        for scope in scopes.iter().filter_map(|id| self.table.scope(*id)) {
            if let Some(rv) = scope.range_variables_named(new_text).find(|rv| !owns(rv)) {
                return Err(QueryError::Conflict {
                    new_name: new_text.to_string(),
                    kind: "range variable".to_string(),
                    at: self.range_variable_position(rv),
                });
            }
        }
        Ok(())
    }

    fn range_variable_position(&self, rv: &RangeVariable) -> Position {
        let declared = rv
            .alias
            .and_then(|id| self.table.declaration(id))
            .map(|d| d.range.start);
        let referenced = rv
            .origin
            .and_then(|id| self.table.reference(id))
            .map(|r| r.range.start);
        declared.or(referenced).unwrap_or_default()
    }
}

/// Name as written at the declaration site (last part of a dotted table name)
fn simple_name(declaration: &Declaration) -> &str {
    match declaration.kind {
        DeclarationKind::Table => declaration
            .name
            .rsplit_once('.')
            .map_or(declaration.name.as_str(), |(_, base)| base),
        _ => &declaration.name,
    }
}

/// Full name of `declaration` after renaming it to `new_text`
fn renamed(declaration: &Declaration, new_text: &str) -> String {
    match declaration.kind {
        DeclarationKind::Table => match declaration.name.rsplit_once('.') {
            Some((qualifier, _)) => format!("{}.{}", qualifier, new_text),
            None => new_text.to_string(),
        },
        _ => new_text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze;
    use flink_sql_grammar::LineIndex;

    fn pos(character: u32) -> Position {
        Position::new(0, character)
    }

    /// Apply edits back to front so earlier offsets stay valid
    fn apply(source: &str, edits: &[TextEdit]) -> String {
        let index = LineIndex::new(source);
        let mut text = source.to_string();
        let mut edits = edits.to_vec();
        edits.sort_by_key(|e| std::cmp::Reverse(e.range.start));
        for edit in edits {
            let start = index.offset(edit.range.start).unwrap();
            let end = index.offset(edit.range.end).unwrap();
            text.replace_range(start..end, &edit.new_text);
        }
        text
    }

    #[test]
    fn test_rename_alias() {
        let source = "SELECT a.x FROM t AS a";
        let analysis = analyze(source);
        let edits = RenameEngine::new(&analysis.table).rename(pos(7), "o").unwrap();
        assert_eq!(apply(source, &edits), "SELECT o.x FROM t AS o");
    }

    #[test]
    fn test_rename_conflicts_with_alias_in_same_scope() {
        let analysis = analyze("SELECT a.x FROM t AS a, s AS t");
        let result = RenameEngine::new(&analysis.table).rename(pos(7), "t");
        assert!(matches!(
            result,
            Err(QueryError::Conflict { ref kind, .. }) if kind == "alias"
        ));
    }

    #[test]
    fn test_rename_conflicts_with_unaliased_table() {
        let analysis = analyze("SELECT a.x FROM t AS a, t");
        let result = RenameEngine::new(&analysis.table).rename(pos(7), "t");
        assert!(matches!(result, Err(QueryError::Conflict { .. })));
    }

    #[test]
    fn test_rename_invalid_name() {
        let analysis = analyze("SELECT a.x FROM t AS a");
        let engine = RenameEngine::new(&analysis.table);
        assert_eq!(
            engine.rename(pos(7), "SELECT"),
            Err(QueryError::InvalidName("SELECT".to_string()))
        );
        assert!(matches!(
            engine.rename(pos(7), "1abc"),
            Err(QueryError::InvalidName(_))
        ));
    }

    #[test]
    fn test_rename_to_quoted_name() {
        let source = "SELECT a.x FROM t AS a";
        let analysis = analyze(source);
        let edits = RenameEngine::new(&analysis.table)
            .rename(pos(7), "`order`")
            .unwrap();
        assert_eq!(apply(source, &edits), "SELECT `order`.x FROM t AS `order`");
    }

    #[test]
    fn test_rename_same_name_is_noop() {
        let analysis = analyze("SELECT a.x FROM t AS a, s AS b");
        let edits = RenameEngine::new(&analysis.table).rename(pos(7), "a").unwrap();
        assert_eq!(edits.len(), 2);
    }

    #[test]
    fn test_rename_external_fails() {
        let analysis = analyze("SELECT x FROM orders");
        let result = RenameEngine::new(&analysis.table).rename(pos(14), "o");
        assert_eq!(result, Err(QueryError::External("orders".to_string())));
    }

    #[test]
    fn test_rename_unresolved_fails() {
        let analysis = analyze("SELECT b.x FROM t AS a");
        let result = RenameEngine::new(&analysis.table).rename(pos(7), "c");
        assert_eq!(result, Err(QueryError::Unresolved("b".to_string())));
    }

    #[test]
    fn test_rename_declared_table_and_qualified_column() {
        let source = "CREATE TABLE t (x INT);\nSELECT t.x FROM t";
        let analysis = analyze(source);
        let edits = RenameEngine::new(&analysis.table)
            .rename(Position::new(1, 16), "u")
            .unwrap();
        assert_eq!(
            apply(source, &edits),
            "CREATE TABLE u (x INT);\nSELECT u.x FROM u"
        );
    }

    #[test]
    fn test_rename_table_conflicts_with_other_table() {
        let source = "CREATE TABLE t (x INT);\nCREATE TABLE u (y INT);\nSELECT x FROM t";
        let analysis = analyze(source);
        let result = RenameEngine::new(&analysis.table).rename(Position::new(0, 13), "u");
        assert!(matches!(
            result,
            Err(QueryError::Conflict { ref kind, .. }) if kind == "table"
        ));
    }

    #[test]
    fn test_rename_column_round_trip() {
        let source = "CREATE TABLE t (x INT);\nSELECT x FROM t WHERE x > 1";
        let analysis = analyze(source);
        let edits = RenameEngine::new(&analysis.table).rename(pos(16), "y").unwrap();
        let renamed = apply(source, &edits);
        assert_eq!(renamed, "CREATE TABLE t (y INT);\nSELECT y FROM t WHERE y > 1");

        let analysis = analyze(&renamed);
        let edits = RenameEngine::new(&analysis.table).rename(pos(16), "x").unwrap();
        assert_eq!(apply(&renamed, &edits), source);
    }

    #[test]
    fn test_rename_column_conflicts_with_column_of_other_relation() {
        let source = "CREATE TABLE t (x INT);\nCREATE TABLE u (y INT);\nSELECT x FROM t, u";
        let analysis = analyze(source);
        let engine = RenameEngine::new(&analysis.table);

        let result = engine.rename(Position::new(2, 7), "y");
        assert_eq!(
            result,
            Err(QueryError::Conflict {
                new_name: "y".to_string(),
                kind: "column".to_string(),
                at: Position::new(2, 17),
            })
        );
        // A name no visible relation exposes is still accepted
        assert_eq!(engine.rename(Position::new(2, 7), "z").map(|e| e.len()), Ok(2));
    }

    #[test]
    fn test_rename_column_ignores_relations_outside_binding_scope() {
        let source = "CREATE TABLE t (x INT);\nCREATE TABLE u (y INT);\n\
                      SELECT y FROM u WHERE EXISTS (SELECT x FROM t)";
        let analysis = analyze(source);
        let edits = RenameEngine::new(&analysis.table)
            .rename(Position::new(0, 16), "y")
            .unwrap();
        assert_eq!(edits.len(), 2);
    }

    #[test]
    fn test_rename_qualified_column_only_checks_its_relation() {
        let source = "CREATE TABLE t (x INT);\nCREATE TABLE u (y INT);\nSELECT t.x FROM t, u";
        let analysis = analyze(source);
        let edits = RenameEngine::new(&analysis.table)
            .rename(Position::new(2, 9), "y")
            .unwrap();
        assert_eq!(
            apply(source, &edits),
            "CREATE TABLE t (y INT);\nCREATE TABLE u (y INT);\nSELECT t.y FROM t, u"
        );
    }

    #[test]
    fn test_rename_column_conflicts_inside_derived_table() {
        let source = "CREATE TABLE t (x INT, z INT);\n\
                      SELECT d.x FROM (SELECT x, z AS y FROM t) AS d";
        let analysis = analyze(source);
        let result = RenameEngine::new(&analysis.table).rename(Position::new(0, 16), "y");
        assert!(matches!(result, Err(QueryError::Conflict { .. })));
    }

    #[test]
    fn test_rename_cte_conflicts_with_catalog_table_it_would_capture() {
        let source = "WITH c AS (SELECT 1 AS n) SELECT n FROM c WHERE EXISTS (SELECT * FROM orders)";
        let analysis = analyze(source);
        let result = RenameEngine::new(&analysis.table).rename(pos(5), "orders");
        assert_eq!(
            result,
            Err(QueryError::Conflict {
                new_name: "orders".to_string(),
                kind: "catalog table".to_string(),
                at: pos(70),
            })
        );
    }

    #[test]
    fn test_rename_table_conflicts_with_catalog_table_of_same_name() {
        let source = "CREATE TABLE t (x INT);\nSELECT x FROM t;\nSELECT * FROM orders";
        let analysis = analyze(source);
        let result = RenameEngine::new(&analysis.table).rename(Position::new(0, 13), "orders");
        assert!(matches!(result, Err(QueryError::Conflict { .. })));
    }

    #[test]
    fn test_prepare_rename() {
        let analysis = analyze("SELECT a.x FROM t AS a");
        let engine = RenameEngine::new(&analysis.table);

        let (range, text) = engine.prepare_rename(pos(8)).unwrap();
        assert_eq!(range, Range::new(pos(7), pos(8)));
        assert_eq!(text, "a");
        assert!(matches!(
            engine.prepare_rename(pos(13)),
            Err(QueryError::NotFound(_))
        ));
    }
}
