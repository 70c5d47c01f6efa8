// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details
//
//! # Symbol table
//!
//! The aggregate produced by one analysis: scopes, declarations, references
//! and relations. Built by the analyzer and read-only afterwards.

use crate::scope::{Scope, ScopeManager};
use crate::symbol::{
    Declaration, DeclarationId, DeclarationKind, ExternalSymbol, Reference, ReferenceId,
    ReferenceKind, Relation, RelationId, Resolution, ScopeId,
};
use flink_sql_grammar::{Position, Range};
use std::collections::HashMap;

/// Identifier occurrence under a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    Declaration(DeclarationId),
    Reference(ReferenceId),
}

/// Scopes, declarations and references of one document
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    scopes: ScopeManager,
    declarations: Vec<Declaration>,
    references: Vec<Reference>,
    relations: Vec<Relation>,
    /// Relation exposed by each table, view and CTE declaration
    declared_relations: HashMap<DeclarationId, RelationId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scopes(&self) -> &ScopeManager {
        &self.scopes
    }

    pub(crate) fn scopes_mut(&mut self) -> &mut ScopeManager {
        &mut self.scopes
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get_scope(id)
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn declaration(&self, id: DeclarationId) -> Option<&Declaration> {
        self.declarations.get(id)
    }

    pub fn reference(&self, id: ReferenceId) -> Option<&Reference> {
        self.references.get(id)
    }

    pub fn relation(&self, id: RelationId) -> Option<&Relation> {
        self.relations.get(id)
    }

    /// Relation exposed by a table, view or CTE declaration
    pub fn declared_relation(&self, declaration: DeclarationId) -> Option<&Relation> {
        self.declared_relations
            .get(&declaration)
            .and_then(|id| self.relations.get(*id))
    }

    pub(crate) fn declared_relation_id(&self, declaration: DeclarationId) -> Option<RelationId> {
        self.declared_relations.get(&declaration).copied()
    }

    /// Declarations with the given name, in document order
    pub fn declarations_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Declaration> + 'a {
        self.declarations.iter().filter(move |d| d.name == name)
    }

    /// References linked to `declaration`
    pub fn references_to(&self, declaration: DeclarationId) -> impl Iterator<Item = &Reference> + '_ {
        self.references
            .iter()
            .filter(move |r| r.resolution == Resolution::Declared(declaration))
    }

    /// References naming the same external object
    pub fn external_references<'a>(
        &'a self,
        kind: ReferenceKind,
        symbol: &'a ExternalSymbol,
    ) -> impl Iterator<Item = &'a Reference> + 'a {
        self.references.iter().filter(move |r| {
            r.kind == kind && matches!(&r.resolution, Resolution::External(s) if s == symbol)
        })
    }

    /// Smallest declaration or reference whose range contains `position`
    ///
    /// Declarations win ties against references.
    pub fn occurrence_at(&self, position: Position) -> Option<Occurrence> {
        let declarations = self
            .declarations
            .iter()
            .filter(|d| d.range.contains(position))
            .map(|d| (d.range, 0, Occurrence::Declaration(d.id)));
        let references = self
            .references
            .iter()
            .filter(|r| r.range.contains(position))
            .map(|r| (r.range, 1, Occurrence::Reference(r.id)));

        declarations
            .chain(references)
            .min_by_key(|(range, rank, _)| (range.single_line_len(), *rank, range.start))
            .map(|(_, _, occurrence)| occurrence)
    }

    /// Range of an occurrence
    pub fn occurrence_range(&self, occurrence: Occurrence) -> Option<Range> {
        match occurrence {
            Occurrence::Declaration(id) => self.declaration(id).map(|d| d.range),
            Occurrence::Reference(id) => self.reference(id).map(|r| r.range),
        }
    }

    pub(crate) fn add_declaration(
        &mut self,
        name: &str,
        range: Range,
        kind: DeclarationKind,
        scope: ScopeId,
    ) -> DeclarationId {
        let id = self.declarations.len();
        self.declarations.push(Declaration {
            id,
            name: name.to_string(),
            range,
            kind,
            scope,
        });
        id
    }

    pub(crate) fn add_reference(
        &mut self,
        name: &str,
        range: Range,
        kind: ReferenceKind,
        scope: ScopeId,
        resolution: Resolution,
    ) -> ReferenceId {
        let id = self.references.len();
        self.references.push(Reference {
            id,
            name: name.to_string(),
            range,
            kind,
            scope,
            resolution,
            relation: None,
        });
        id
    }

    pub(crate) fn pin_reference(&mut self, reference: ReferenceId, relation: RelationId) {
        if let Some(r) = self.references.get_mut(reference) {
            r.relation = Some(relation);
        }
    }

    pub(crate) fn add_relation(&mut self, mut relation: Relation) -> RelationId {
        let id = self.relations.len();
        relation.id = id;
        self.relations.push(relation);
        id
    }

    pub(crate) fn bind_relation(&mut self, declaration: DeclarationId, relation: RelationId) {
        self.declared_relations.insert(declaration, relation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeKind;

    fn range(start: u32, end: u32) -> Range {
        Range::new(Position::new(0, start), Position::new(0, end))
    }

    fn sample() -> SymbolTable {
        let mut table = SymbolTable::new();
        let root = table
            .scopes_mut()
            .create_scope(ScopeKind::Document, None, range(0, 40));
        let decl = table.add_declaration("a", range(21, 22), DeclarationKind::Alias, root);
        table.add_reference(
            "a",
            range(7, 8),
            ReferenceKind::Relation,
            root,
            Resolution::Declared(decl),
        );
        table.add_reference(
            "x",
            range(9, 10),
            ReferenceKind::Column,
            root,
            Resolution::Unresolved,
        );
        table
    }

    #[test]
    fn test_occurrence_at_declaration_and_reference() {
        let table = sample();
        assert_eq!(
            table.occurrence_at(Position::new(0, 21)),
            Some(Occurrence::Declaration(0))
        );
        assert_eq!(
            table.occurrence_at(Position::new(0, 7)),
            Some(Occurrence::Reference(0))
        );
        assert_eq!(table.occurrence_at(Position::new(0, 15)), None);
    }

    #[test]
    fn test_occurrence_at_end_is_inclusive() {
        let table = sample();
        assert_eq!(
            table.occurrence_at(Position::new(0, 22)),
            Some(Occurrence::Declaration(0))
        );
    }

    #[test]
    fn test_references_to() {
        let table = sample();
        let refs: Vec<_> = table.references_to(0).map(|r| r.id).collect();
        assert_eq!(refs, vec![0]);
    }
}
