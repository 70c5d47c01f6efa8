// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details
//
//! # Symbol types for semantic analysis
//!
//! Declarations (binding sites), references (usage sites) and the relations
//! that give `FROM` items their columns.

use flink_sql_grammar::Range;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a scope in the [`SymbolTable`](crate::SymbolTable)
pub type ScopeId = usize;
/// Index of a declaration in the [`SymbolTable`](crate::SymbolTable)
pub type DeclarationId = usize;
/// Index of a reference in the [`SymbolTable`](crate::SymbolTable)
pub type ReferenceId = usize;
/// Index of a relation in the [`SymbolTable`](crate::SymbolTable)
pub type RelationId = usize;

/// Kind of a declared name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeclarationKind {
    /// `CREATE TABLE` or `CREATE VIEW` name
    Table,
    /// Range variable alias (`FROM t AS a`)
    Alias,
    /// Table column, column-list entry or select-item alias
    Column,
    /// `WITH name AS (...)`
    Cte,
}

impl DeclarationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationKind::Table => "table",
            DeclarationKind::Alias => "alias",
            DeclarationKind::Column => "column",
            DeclarationKind::Cte => "CTE",
        }
    }

    /// Whether the kind names a relation usable in `FROM`
    pub fn is_relation(&self) -> bool {
        matches!(self, DeclarationKind::Table | DeclarationKind::Cte)
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A binding site of a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub id: DeclarationId,
    /// Identifier text, quoting removed
    pub name: String,
    /// Range of the identifier token
    pub range: Range,
    pub kind: DeclarationKind,
    /// Scope owning this declaration
    pub scope: ScopeId,
}

/// What a reference names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// Table, view, CTE or alias used as a relation or qualifier
    Relation,
    /// Column of a relation
    Column,
}

/// An object that lives outside the document, such as a catalog table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalSymbol {
    /// Relation name (dotted for qualified catalog names, empty when the
    /// owning relation is unknown)
    pub relation: String,
    /// Column name for external columns
    pub column: Option<String>,
}

impl ExternalSymbol {
    pub fn relation(name: impl Into<String>) -> Self {
        Self {
            relation: name.into(),
            column: None,
        }
    }

    pub fn column(relation: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            column: Some(column.into()),
        }
    }
}

/// How a reference was resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Linked to a declaration in this document
    Declared(DeclarationId),
    /// Nothing matched; a diagnostic is reported on it or on its qualifier
    Unresolved,
    /// Names an object declared outside the document
    External(ExternalSymbol),
}

impl Resolution {
    pub fn declaration(&self) -> Option<DeclarationId> {
        match self {
            Resolution::Declared(id) => Some(*id),
            _ => None,
        }
    }
}

/// A usage site of a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: ReferenceId,
    /// Identifier text, quoting removed (dotted for qualified table names)
    pub name: String,
    /// Range of the identifier token
    pub range: Range,
    pub kind: ReferenceKind,
    /// Scope active when the reference was seen
    pub scope: ScopeId,
    pub resolution: Resolution,
    /// Relation a column was looked up in, when the lookup was pinned to one
    /// (`q.c`, an `INSERT` column list, `USING`)
    pub relation: Option<RelationId>,
}

/// Where a relation's rows come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationSource {
    /// A table, view or CTE declared in the document
    Declared(DeclarationId),
    /// A subquery, table function or `VALUES` list in `FROM`
    Derived,
    /// A catalog table
    External,
}

/// What an output column of a relation stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnTarget {
    Declared(DeclarationId),
    External(ExternalSymbol),
    /// Passed through from a reference that did not resolve
    Unknown,
}

impl From<&Resolution> for ColumnTarget {
    fn from(resolution: &Resolution) -> Self {
        match resolution {
            Resolution::Declared(id) => ColumnTarget::Declared(*id),
            Resolution::External(symbol) => ColumnTarget::External(symbol.clone()),
            Resolution::Unresolved => ColumnTarget::Unknown,
        }
    }
}

/// A named output column of a relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    pub name: String,
    pub target: ColumnTarget,
}

impl OutputColumn {
    pub fn new(name: impl Into<String>, target: ColumnTarget) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }
}

/// A column-producing object a range variable stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub id: RelationId,
    /// Display name used in messages and for external columns
    pub name: String,
    pub source: RelationSource,
    /// Known output columns, in order
    pub columns: Vec<OutputColumn>,
    /// Whether columns beyond `columns` may exist
    pub open: bool,
}

impl Relation {
    /// Find an output column by exact name
    pub fn find_column(&self, name: &str) -> Option<&OutputColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether the relation has, or may have, a column called `name`
    pub fn may_expose(&self, name: &str) -> bool {
        self.open || self.find_column(name).is_some()
    }
}
