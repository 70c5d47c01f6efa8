// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details
//
//! # Scope management for semantic analysis
//!
//! Scopes form a tree rooted at the document. Each scope owns at most one
//! declaration per `(name, kind)` pair and, for query blocks, the range
//! variables introduced by its `FROM` clause.

use crate::symbol::{DeclarationId, DeclarationKind, ReferenceId, RelationId, ScopeId};
use flink_sql_grammar::Range;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Type of a lexical scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    /// Root scope: table and view names
    Document,
    /// Column list of a `CREATE TABLE`
    TableDefinition,
    /// Explicit column list of a CTE, view or derived-table alias
    ColumnList,
    /// Top-level query block of a statement
    Query,
    /// Nested query block (expression subquery, derived table, set operand)
    Subquery,
    /// Body of a `WITH` element
    Cte,
    /// Body of a `CREATE VIEW`
    View,
}

impl ScopeKind {
    /// Whether scopes of this kind hold range variables
    pub fn is_query_block(&self) -> bool {
        matches!(
            self,
            ScopeKind::Query | ScopeKind::Subquery | ScopeKind::Cte | ScopeKind::View
        )
    }
}

/// Name under which a `FROM` item is visible inside its query block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeVariable {
    /// Alias if present, otherwise the table name
    pub name: String,
    pub relation: RelationId,
    /// Alias declaration, for aliased items
    pub alias: Option<DeclarationId>,
    /// Table-name reference that introduced an unaliased item
    pub origin: Option<ReferenceId>,
}

/// A lexical scope
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub id: ScopeId,
    pub parent_id: Option<ScopeId>,
    pub kind: ScopeKind,
    /// Source range covered by the scope
    pub range: Range,
    declarations: HashMap<(String, DeclarationKind), DeclarationId>,
    /// Range variables in `FROM` order
    pub range_variables: Vec<RangeVariable>,
    /// Columns merged by `JOIN ... USING`
    pub using_columns: Vec<String>,
}

impl Scope {
    /// Create a new scope
    ///
    /// # Examples
    ///
    /// ```
    /// use flink_sql_lsp_semantic::{Scope, ScopeKind};
    /// use flink_sql_grammar::Range;
    ///
    /// let scope = Scope::new(0, ScopeKind::Document, Range::default());
    /// assert_eq!(scope.id, 0);
    /// assert!(scope.parent_id.is_none());
    /// ```
    pub fn new(id: ScopeId, kind: ScopeKind, range: Range) -> Self {
        Self {
            id,
            parent_id: None,
            kind,
            range,
            declarations: HashMap::new(),
            range_variables: Vec::new(),
            using_columns: Vec::new(),
        }
    }

    /// Set the parent scope
    pub fn with_parent(mut self, parent_id: ScopeId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Declaration of `name` with `kind` in this scope only
    pub fn declaration(&self, name: &str, kind: DeclarationKind) -> Option<DeclarationId> {
        self.declarations.get(&(name.to_string(), kind)).copied()
    }

    /// Register a declaration
    ///
    /// # Returns
    ///
    /// `Err(existing)` when the scope already declares `name` with `kind`;
    /// the existing declaration is kept.
    pub fn declare(
        &mut self,
        name: &str,
        kind: DeclarationKind,
        id: DeclarationId,
    ) -> Result<(), DeclarationId> {
        let key = (name.to_string(), kind);
        if let Some(existing) = self.declarations.get(&key) {
            return Err(*existing);
        }
        self.declarations.insert(key, id);
        Ok(())
    }

    /// Range variables visible under `name`
    pub fn range_variables_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a RangeVariable> + 'a {
        self.range_variables.iter().filter(move |rv| rv.name == name)
    }

    pub fn add_range_variable(&mut self, range_variable: RangeVariable) {
        self.range_variables.push(range_variable);
    }
}

/// Owns every scope of one analysis
#[derive(Debug, Clone, Default)]
pub struct ScopeManager {
    scopes: Vec<Scope>,
}

impl ScopeManager {
    /// Create an empty scope manager
    ///
    /// # Examples
    ///
    /// ```
    /// use flink_sql_lsp_semantic::ScopeManager;
    ///
    /// let manager = ScopeManager::new();
    /// assert_eq!(manager.scope_count(), 0);
    /// ```
    pub fn new() -> Self {
        Self { scopes: Vec::new() }
    }

    /// Create a new scope
    ///
    /// # Arguments
    ///
    /// * `kind` - Type of scope to create
    /// * `parent_id` - Enclosing scope, `None` for the root
    /// * `range` - Source range covered by the scope
    ///
    /// # Returns
    ///
    /// The ID of the newly created scope
    ///
    /// # Examples
    ///
    /// ```
    /// use flink_sql_lsp_semantic::{ScopeKind, ScopeManager};
    /// use flink_sql_grammar::Range;
    ///
    /// let mut manager = ScopeManager::new();
    /// let root = manager.create_scope(ScopeKind::Document, None, Range::default());
    /// let query = manager.create_scope(ScopeKind::Query, Some(root), Range::default());
    ///
    /// assert!(query > root);
    /// ```
    pub fn create_scope(&mut self, kind: ScopeKind, parent_id: Option<ScopeId>, range: Range) -> ScopeId {
        let id = self.scopes.len();
        let mut scope = Scope::new(id, kind, range);
        if let Some(parent) = parent_id {
            scope = scope.with_parent(parent);
        }
        self.scopes.push(scope);
        id
    }

    pub fn get_scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id)
    }

    pub fn get_scope_mut(&mut self, id: ScopeId) -> Option<&mut Scope> {
        self.scopes.get_mut(id)
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }

    /// `id` followed by each enclosing scope up to the root
    pub fn ancestors(&self, id: ScopeId) -> impl Iterator<Item = &Scope> + '_ {
        std::iter::successors(self.get_scope(id), move |scope| {
            scope.parent_id.and_then(|parent| self.get_scope(parent))
        })
    }

    /// Resolve `name` with `kind` from `from` outwards; innermost wins
    pub fn lookup(&self, name: &str, kind: DeclarationKind, from: ScopeId) -> Option<DeclarationId> {
        self.ancestors(from)
            .find_map(|scope| scope.declaration(name, kind))
    }
}
