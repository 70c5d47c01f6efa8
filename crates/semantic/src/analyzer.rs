// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details
//
//! # Semantic Analyzer
//!
//! Walks a parse tree once, in document order, and builds the
//! [`SymbolTable`]: one scope per lexical region, a declaration per binding
//! site and a resolved reference per usage site.
//!
//! Within a query block the `FROM` clause is visited first so that its
//! range variables are in place before the select list, `WHERE`,
//! `GROUP BY`, `HAVING` and `ORDER BY` are resolved. Names are looked up
//! from the innermost scope outwards and the first scope that can answer
//! wins.
//!
//! Tables that are never declared in the document are treated as catalog
//! objects: references to them and to their columns resolve to
//! [`Resolution::External`] without a diagnostic.

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::scope::{RangeVariable, ScopeKind};
use crate::suggest::closest_match;
use crate::symbol::{
    ColumnTarget, DeclarationId, DeclarationKind, ExternalSymbol, OutputColumn, ReferenceId,
    ReferenceKind, Relation, RelationId, RelationSource, Resolution, ScopeId,
};
use crate::table::SymbolTable;
use flink_sql_grammar::{
    Alias, ColumnKind, ColumnRef, CreateTable, CreateView, Cte, Expr, Ident, Insert, JoinConstraint,
    ObjectName, ParseTree, Position, Query, Range, Script, Select, SelectItem, SetExpr, Statement,
    TableElement, TableFactor, TableFunctionArg, TableWithJoins,
};
use tracing::{debug, trace};

/// Windowing table-valued functions
const WINDOW_FUNCTIONS: &[&str] = &["CUMULATE", "HOP", "SESSION", "TUMBLE"];

/// Columns appended by the windowing table-valued functions
const WINDOW_COLUMNS: &[&str] = &["window_start", "window_end", "window_time"];

/// Builds a [`SymbolTable`] from a parse tree
///
/// The analyzer holds no state between calls; every call to
/// [`analyze`](SemanticAnalyzer::analyze) produces an independent table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemanticAnalyzer;

impl SemanticAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a parsed document
    ///
    /// # Arguments
    ///
    /// * `tree` - Parse tree of the whole document
    /// * `sink` - Receives semantic diagnostics, in discovery order
    ///
    /// # Returns
    ///
    /// The symbol table of the document. Analysis never fails; problems are
    /// reported through `sink`.
    pub fn analyze(&self, tree: &ParseTree, sink: &mut DiagnosticSink) -> SymbolTable {
        let end = tree.line_index.position(tree.line_index.text().len());
        let mut visitor = Visitor::new(sink);
        visitor.visit_script(&tree.script, Range::new(Position::default(), end));
        let table = visitor.finish();

        debug!(
            "Semantic analysis built {} scope(s), {} declaration(s), {} reference(s)",
            table.scopes().scope_count(),
            table.declarations().len(),
            table.references().len()
        );
        table
    }
}

/// Columns produced by a query
#[derive(Debug, Default)]
struct QueryOutput {
    columns: Vec<OutputColumn>,
    open: bool,
}

enum RangeVariableMatch {
    Found(RangeVariable),
    /// Several range variables share the name in the innermost scope that has it
    Ambiguous(Vec<String>),
}

enum ColumnLookup {
    Found(ColumnTarget),
    Ambiguous(Vec<String>),
    /// Not visible anywhere; carries the visible column names for hints
    Missing(Vec<String>),
}

struct Visitor<'a> {
    table: SymbolTable,
    sink: &'a mut DiagnosticSink,
    stack: Vec<ScopeId>,
    /// Output columns of the query whose `ORDER BY` is being visited
    order_by_outputs: Option<Vec<OutputColumn>>,
}

impl<'a> Visitor<'a> {
    fn new(sink: &'a mut DiagnosticSink) -> Self {
        Self {
            table: SymbolTable::new(),
            sink,
            stack: Vec::new(),
            order_by_outputs: None,
        }
    }

    fn finish(self) -> SymbolTable {
        self.table
    }

    // ----- scopes and symbols -----

    fn current(&self) -> ScopeId {
        self.stack.last().copied().unwrap_or_default()
    }

    fn enter_scope(&mut self, kind: ScopeKind, range: Range) -> ScopeId {
        let parent = self.stack.last().copied();
        let id = self.table.scopes_mut().create_scope(kind, parent, range);
        trace!("Entering {:?} scope {} at {}", kind, id, range);
        self.stack.push(id);
        id
    }

    fn exit_scope(&mut self) {
        self.stack.pop();
    }

    /// Declare `name` in the current scope
    ///
    /// Returns `None` for a duplicate; the first declaration is kept and a
    /// diagnostic is reported on the second.
    fn declare(&mut self, name: &str, range: Range, kind: DeclarationKind) -> Option<DeclarationId> {
        let scope = self.current();
        if let Some(existing) = self.table.scope(scope).and_then(|s| s.declaration(name, kind)) {
            let first = self
                .table
                .declaration(existing)
                .map(|d| d.range)
                .unwrap_or(range);
            self.sink
                .push(Diagnostic::duplicate(kind.as_str(), name, range, first));
            return None;
        }

        let id = self.table.add_declaration(name, range, kind, scope);
        if let Some(s) = self.table.scopes_mut().get_scope_mut(scope) {
            let _ = s.declare(name, kind, id);
        }
        Some(id)
    }

    fn declare_ident(&mut self, ident: &Ident, kind: DeclarationKind) -> Option<DeclarationId> {
        self.declare(&ident.text, ident.range, kind)
    }

    fn add_reference(
        &mut self,
        name: &str,
        range: Range,
        kind: ReferenceKind,
        resolution: Resolution,
    ) -> ReferenceId {
        let scope = self.current();
        self.table
            .add_reference(name, range, kind, scope, resolution)
    }

    fn add_range_variable(&mut self, range_variable: RangeVariable) {
        let scope = self.current();
        if let Some(s) = self.table.scopes_mut().get_scope_mut(scope) {
            s.add_range_variable(range_variable);
        }
    }

    fn new_relation(
        &mut self,
        name: impl Into<String>,
        source: RelationSource,
        columns: Vec<OutputColumn>,
        open: bool,
    ) -> RelationId {
        self.table.add_relation(Relation {
            id: 0,
            name: name.into(),
            source,
            columns,
            open,
        })
    }

    fn report_unresolved(&mut self, what: &str, name: &str, range: Range, candidates: &[String]) {
        let mut diagnostic = Diagnostic::unresolved(what, name, range);
        if let Some(hint) = closest_match(name, candidates.iter().map(String::as_str)) {
            diagnostic.message.push_str(&format!(". Did you mean '{}'?", hint));
        }
        self.sink.push(diagnostic);
    }

    // ----- statements -----

    fn visit_script(&mut self, script: &Script, range: Range) {
        self.enter_scope(ScopeKind::Document, range);
        for statement in &script.statements {
            self.visit_statement(statement);
        }
        self.exit_scope();
    }

    fn visit_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::CreateTable(create) => self.visit_create_table(create),
            Statement::CreateView(view) => self.visit_create_view(view),
            Statement::Insert(insert) => self.visit_insert(insert),
            Statement::Query(query) => {
                self.visit_query(query, ScopeKind::Query);
            }
            Statement::Other { .. } | Statement::Error { .. } => {}
        }
    }

    fn visit_create_table(&mut self, create: &CreateTable) {
        let Some(base) = create.name.base() else {
            return;
        };
        let name = create.name.dotted();
        let declaration = self.declare(&name, base.range, DeclarationKind::Table);

        let mut open = false;
        let mut inherited = Vec::new();
        if let Some(source) = &create.like {
            let (_, relation) = self.visit_relation_name(source);
            if let Some(relation) = self.table.relation(relation) {
                inherited.extend(relation.columns.iter().cloned());
                open |= relation.open;
            }
        }
        if let Some(query) = &create.as_query {
            let output = self.visit_query(query, ScopeKind::Query);
            inherited.extend(output.columns);
            open |= output.open;
        }

        self.enter_scope(ScopeKind::TableDefinition, create.range);

        let mut columns = Vec::new();
        for element in &create.elements {
            if let TableElement::Column(column) = element {
                if let Some(id) = self.declare_ident(&column.name, DeclarationKind::Column) {
                    columns.push(OutputColumn::new(
                        &column.name.text,
                        ColumnTarget::Declared(id),
                    ));
                }
            }
        }
        columns.extend(inherited);

        let source = match declaration {
            Some(id) => RelationSource::Declared(id),
            None => RelationSource::Derived,
        };
        let relation = self.new_relation(&name, source, columns, open);
        if let Some(id) = declaration {
            self.table.bind_relation(id, relation);
        }
        self.add_range_variable(RangeVariable {
            name: base.text.clone(),
            relation,
            alias: None,
            origin: None,
        });

        for element in &create.elements {
            match element {
                TableElement::Column(column) => {
                    if let ColumnKind::Computed { expr } = &column.kind {
                        self.visit_expr(expr);
                    }
                }
                TableElement::Watermark { column, expr, .. } => {
                    self.resolve_in_relation(column, relation);
                    self.visit_expr(expr);
                }
                TableElement::PrimaryKey { columns, .. } => {
                    for column in columns {
                        self.resolve_in_relation(column, relation);
                    }
                }
            }
        }
        for column in &create.partitioned_by {
            self.resolve_in_relation(column, relation);
        }

        self.exit_scope();
    }

    fn visit_create_view(&mut self, view: &CreateView) {
        let output = self.visit_query(&view.query, ScopeKind::View);
        let (columns, open) = if view.columns.is_empty() {
            (output.columns, output.open)
        } else {
            (self.declare_column_list(&view.columns), false)
        };

        let Some(base) = view.name.base() else {
            return;
        };
        let name = view.name.dotted();
        let declaration = self.declare(&name, base.range, DeclarationKind::Table);
        if let Some(id) = declaration {
            let relation = self.new_relation(&name, RelationSource::Declared(id), columns, open);
            self.table.bind_relation(id, relation);
        }
    }

    fn visit_insert(&mut self, insert: &Insert) {
        let (_, relation) = self.visit_relation_name(&insert.target);
        for column in &insert.columns {
            self.resolve_in_relation(column, relation);
        }
        self.visit_query(&insert.query, ScopeKind::Query);
    }

    // ----- queries -----

    fn visit_query(&mut self, query: &Query, kind: ScopeKind) -> QueryOutput {
        let saved = self.order_by_outputs.take();
        self.enter_scope(kind, query.range);

        for cte in &query.with {
            self.visit_cte(cte);
        }

        let output = self.visit_set_expr(&query.body, true);

        if !query.order_by.is_empty() {
            self.order_by_outputs = Some(output.columns.clone());
            for item in &query.order_by {
                self.visit_expr(&item.expr);
            }
            self.order_by_outputs = None;
        }
        if let Some(limit) = &query.limit {
            self.visit_expr(limit);
        }

        self.exit_scope();
        self.order_by_outputs = saved;
        output
    }

    /// A CTE is visible to later siblings and the main query, not to itself
    fn visit_cte(&mut self, cte: &Cte) {
        let output = self.visit_query(&cte.query, ScopeKind::Cte);
        let (columns, open) = if cte.columns.is_empty() {
            (output.columns, output.open)
        } else {
            (self.declare_column_list(&cte.columns), false)
        };

        if let Some(id) = self.declare_ident(&cte.name, DeclarationKind::Cte) {
            let relation =
                self.new_relation(&cte.name.text, RelationSource::Declared(id), columns, open);
            self.table.bind_relation(id, relation);
        }
    }

    /// `direct` is set for the body of a query, which shares the query's scope
    fn visit_set_expr(&mut self, body: &SetExpr, direct: bool) -> QueryOutput {
        match body {
            SetExpr::Select(select) if direct => self.visit_select(select),
            SetExpr::Select(select) => {
                self.enter_scope(ScopeKind::Subquery, select.range);
                let output = self.visit_select(select);
                self.exit_scope();
                output
            }
            SetExpr::Query(query) => self.visit_query(query, ScopeKind::Subquery),
            SetExpr::SetOperation { .. } => {
                // Long UNION chains are left-deep; walk the spine iteratively
                let mut rights = Vec::new();
                let mut leftmost = body;
                while let SetExpr::SetOperation { left, right, .. } = leftmost {
                    rights.push(right.as_ref());
                    leftmost = left.as_ref();
                }
                // Output column names come from the left operand
                let output = self.visit_set_expr(leftmost, false);
                for right in rights.into_iter().rev() {
                    self.visit_set_expr(right, false);
                }
                output
            }
            SetExpr::Values { rows, .. } => {
                for expr in rows.iter().flatten() {
                    self.visit_expr(expr);
                }
                QueryOutput::default()
            }
        }
    }

    fn visit_select(&mut self, select: &Select) -> QueryOutput {
        for item in &select.from {
            self.visit_table_with_joins(item);
        }

        let output = self.visit_projection(&select.projection);

        if let Some(selection) = &select.selection {
            self.visit_expr(selection);
        }
        for expr in &select.group_by {
            self.visit_expr(expr);
        }
        if let Some(having) = &select.having {
            self.visit_expr(having);
        }
        output
    }

    fn visit_projection(&mut self, items: &[SelectItem]) -> QueryOutput {
        let mut output = QueryOutput::default();

        for item in items {
            match item {
                SelectItem::Expr { expr, alias, .. } => {
                    let passthrough = match expr {
                        Expr::Column(column) => self.visit_column_ref(column),
                        other => {
                            self.visit_expr(other);
                            None
                        }
                    };
                    match alias {
                        Some(Alias {
                            name: Some(ident), ..
                        }) => {
                            if let Some(id) = self.declare_ident(ident, DeclarationKind::Column) {
                                output
                                    .columns
                                    .push(OutputColumn::new(&ident.text, ColumnTarget::Declared(id)));
                            }
                        }
                        Some(Alias { name: None, range, .. }) => {
                            self.sink
                                .push(Diagnostic::malformed("Missing alias name after AS", *range));
                        }
                        None => output.columns.extend(passthrough),
                    }
                }
                SelectItem::Wildcard { .. } => {
                    let relations: Vec<RelationId> = self
                        .table
                        .scope(self.current())
                        .map(|s| s.range_variables.iter().map(|rv| rv.relation).collect())
                        .unwrap_or_default();
                    for relation in relations {
                        self.expand_relation(relation, &mut output);
                    }
                }
                SelectItem::QualifiedWildcard { qualifier, .. } => {
                    match self.visit_qualifier(qualifier) {
                        Some(relation) => self.expand_relation(relation, &mut output),
                        None => output.open = true,
                    }
                }
                SelectItem::Missing { range } => {
                    self.sink
                        .push(Diagnostic::malformed("Missing select item", *range));
                }
            }
        }
        output
    }

    fn expand_relation(&self, relation: RelationId, output: &mut QueryOutput) {
        if let Some(relation) = self.table.relation(relation) {
            output.columns.extend(relation.columns.iter().cloned());
            output.open |= relation.open;
        }
    }

    /// Declare an explicit column list in its own scope
    fn declare_column_list(&mut self, idents: &[Ident]) -> Vec<OutputColumn> {
        let range = idents
            .iter()
            .map(|ident| ident.range)
            .reduce(|a, b| a.cover(&b))
            .unwrap_or_default();

        self.enter_scope(ScopeKind::ColumnList, range);
        let mut columns = Vec::with_capacity(idents.len());
        for ident in idents {
            if let Some(id) = self.declare_ident(ident, DeclarationKind::Column) {
                columns.push(OutputColumn::new(&ident.text, ColumnTarget::Declared(id)));
            }
        }
        self.exit_scope();
        columns
    }

    // ----- FROM clause -----

    fn visit_table_with_joins(&mut self, item: &TableWithJoins) {
        self.visit_table_factor(&item.relation);

        for join in &item.joins {
            let relation = self.visit_table_factor(&join.relation);
            match &join.constraint {
                JoinConstraint::On(expr) => self.visit_expr(expr),
                JoinConstraint::Using(columns) => {
                    for column in columns {
                        match relation {
                            Some(relation) => {
                                self.resolve_in_relation(column, relation);
                            }
                            None => {
                                self.resolve_unqualified(column);
                            }
                        }
                        let scope = self.current();
                        if let Some(s) = self.table.scopes_mut().get_scope_mut(scope) {
                            s.using_columns.push(column.text.clone());
                        }
                    }
                }
                JoinConstraint::None => {}
            }
        }
    }

    /// Visit a `FROM` item and bind its range variable
    ///
    /// Returns the relation of the new range variable.
    fn visit_table_factor(&mut self, factor: &TableFactor) -> Option<RelationId> {
        match factor {
            TableFactor::Table {
                name,
                temporal,
                alias,
                ..
            } => {
                let (origin, relation) = self.visit_relation_name(name);
                if let Some(expr) = temporal {
                    self.visit_expr(expr);
                }
                let relation = self.apply_alias_columns(alias.as_ref(), relation);
                let default_name = name.base().map(|b| b.text.as_str()).unwrap_or_default();
                self.bind_range_variable(default_name, alias.as_ref(), relation, origin);
                Some(relation)
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let output = self.visit_query(subquery, ScopeKind::Subquery);
                let name = alias
                    .as_ref()
                    .and_then(|a| a.name.as_ref())
                    .map(|n| n.text.clone())
                    .unwrap_or_default();
                let relation =
                    self.new_relation(name, RelationSource::Derived, output.columns, output.open);
                let relation = self.apply_alias_columns(alias.as_ref(), relation);
                self.bind_range_variable("", alias.as_ref(), relation, None);
                Some(relation)
            }
            TableFactor::TableFunction {
                function,
                args,
                alias,
                ..
            } => {
                let relation = self.visit_table_function(function, args);
                let relation = self.apply_alias_columns(alias.as_ref(), relation);
                self.bind_range_variable("", alias.as_ref(), relation, None);
                Some(relation)
            }
            TableFactor::Nested { inner, .. } => {
                self.visit_table_with_joins(inner);
                None
            }
        }
    }

    /// Resolve a table, view or CTE name used as a relation
    ///
    /// Undeclared names are catalog tables and get an open external relation.
    fn visit_relation_name(&mut self, name: &ObjectName) -> (Option<ReferenceId>, RelationId) {
        let dotted = name.dotted();
        let Some(base) = name.base() else {
            let relation = self.new_relation(&dotted, RelationSource::External, Vec::new(), true);
            return (None, relation);
        };

        let declared = self
            .table
            .scopes()
            .ancestors(self.current())
            .find_map(|scope| {
                scope
                    .declaration(&dotted, DeclarationKind::Cte)
                    .or_else(|| scope.declaration(&dotted, DeclarationKind::Table))
            });

        match declared {
            Some(id) => {
                let reference = self.add_reference(
                    &dotted,
                    base.range,
                    ReferenceKind::Relation,
                    Resolution::Declared(id),
                );
                // A table referring to itself (`LIKE`) has no relation yet
                let relation = match self.table.declared_relation_id(id) {
                    Some(relation) => relation,
                    None => self.new_relation(&dotted, RelationSource::Declared(id), Vec::new(), true),
                };
                (Some(reference), relation)
            }
            None => {
                let reference = self.add_reference(
                    &dotted,
                    base.range,
                    ReferenceKind::Relation,
                    Resolution::External(ExternalSymbol::relation(&dotted)),
                );
                let relation = self.new_relation(&dotted, RelationSource::External, Vec::new(), true);
                (Some(reference), relation)
            }
        }
    }

    fn visit_table_function(&mut self, function: &Ident, args: &[TableFunctionArg]) -> RelationId {
        let mut source = None;
        for arg in args {
            match arg {
                TableFunctionArg::Table(name) => {
                    let (_, relation) = self.visit_relation_name(name);
                    if source.is_none() {
                        source = Some(relation);
                    }
                }
                TableFunctionArg::Descriptor { columns, .. } => {
                    if let Some(relation) = source {
                        for column in columns {
                            self.resolve_in_relation(column, relation);
                        }
                    }
                }
                TableFunctionArg::Expr(expr) => self.visit_expr(expr),
            }
        }

        let upper = function.text.to_ascii_uppercase();
        if !WINDOW_FUNCTIONS.contains(&upper.as_str()) {
            return self.new_relation(&function.text, RelationSource::Derived, Vec::new(), true);
        }

        let (mut columns, open) = match source.and_then(|id| self.table.relation(id)) {
            Some(relation) => (relation.columns.clone(), relation.open),
            None => (Vec::new(), true),
        };
        for column in WINDOW_COLUMNS {
            columns.push(OutputColumn::new(
                *column,
                ColumnTarget::External(ExternalSymbol::column(&upper, *column)),
            ));
        }
        self.new_relation(upper, RelationSource::Derived, columns, open)
    }

    /// `AS t(a, b)` renames the relation's columns
    fn apply_alias_columns(&mut self, alias: Option<&Alias>, relation: RelationId) -> RelationId {
        let Some(alias) = alias.filter(|a| !a.columns.is_empty()) else {
            return relation;
        };
        let name = alias
            .name
            .as_ref()
            .map(|n| n.text.clone())
            .unwrap_or_default();
        let columns = self.declare_column_list(&alias.columns);
        self.new_relation(name, RelationSource::Derived, columns, false)
    }

    fn bind_range_variable(
        &mut self,
        default_name: &str,
        alias: Option<&Alias>,
        relation: RelationId,
        origin: Option<ReferenceId>,
    ) {
        let range_variable = match alias {
            Some(Alias {
                name: Some(ident), ..
            }) => match self.declare_ident(ident, DeclarationKind::Alias) {
                Some(id) => RangeVariable {
                    name: ident.text.clone(),
                    relation,
                    alias: Some(id),
                    origin: None,
                },
                // Duplicate: columns stay visible, the name keeps its first binding
                None => RangeVariable {
                    name: String::new(),
                    relation,
                    alias: None,
                    origin: None,
                },
            },
            Some(Alias { name: None, range, .. }) => {
                self.sink
                    .push(Diagnostic::malformed("Missing alias name after AS", *range));
                RangeVariable {
                    name: default_name.to_string(),
                    relation,
                    alias: None,
                    origin,
                }
            }
            None => RangeVariable {
                name: default_name.to_string(),
                relation,
                alias: None,
                origin,
            },
        };
        self.add_range_variable(range_variable);
    }

    // ----- name resolution -----

    fn find_range_variable(&self, name: &str) -> Option<RangeVariableMatch> {
        if name.is_empty() {
            return None;
        }
        for scope in self.table.scopes().ancestors(self.current()) {
            let matches: Vec<&RangeVariable> = scope.range_variables_named(name).collect();
            match matches.as_slice() {
                [] => continue,
                [only] => return Some(RangeVariableMatch::Found((*only).clone())),
                several => {
                    let names = several
                        .iter()
                        .map(|rv| self.relation_name(rv.relation))
                        .collect();
                    return Some(RangeVariableMatch::Ambiguous(names));
                }
            }
        }
        None
    }

    fn relation_name(&self, relation: RelationId) -> String {
        self.table
            .relation(relation)
            .map(|r| r.name.clone())
            .unwrap_or_default()
    }

    fn visible_range_variable_names(&self) -> Vec<String> {
        self.table
            .scopes()
            .ancestors(self.current())
            .flat_map(|scope| scope.range_variables.iter())
            .filter(|rv| !rv.name.is_empty())
            .map(|rv| rv.name.clone())
            .collect()
    }

    /// Whether some visible relation has a known column `name`
    fn column_exposed(&self, name: &str) -> bool {
        self.table
            .scopes()
            .ancestors(self.current())
            .flat_map(|scope| scope.range_variables.iter())
            .filter_map(|rv| self.table.relation(rv.relation))
            .any(|relation| relation.find_column(name).is_some())
    }

    /// What a qualifier naming `range_variable` links to
    fn qualifier_resolution(&self, range_variable: &RangeVariable) -> Resolution {
        if let Some(alias) = range_variable.alias {
            return Resolution::Declared(alias);
        }
        match self.table.relation(range_variable.relation) {
            Some(Relation {
                source: RelationSource::Declared(id),
                ..
            }) => Resolution::Declared(*id),
            Some(relation) => Resolution::External(ExternalSymbol::relation(&relation.name)),
            None => Resolution::Unresolved,
        }
    }

    /// Resolve a qualifier (`a` in `a.x` or `a.*`) to a range variable
    fn visit_qualifier(&mut self, ident: &Ident) -> Option<RelationId> {
        match self.find_range_variable(&ident.text) {
            Some(RangeVariableMatch::Found(range_variable)) => {
                let resolution = self.qualifier_resolution(&range_variable);
                if resolution == Resolution::Unresolved {
                    self.report_unresolved("table or alias", &ident.text, ident.range, &[]);
                }
                self.add_reference(&ident.text, ident.range, ReferenceKind::Relation, resolution);
                Some(range_variable.relation)
            }
            Some(RangeVariableMatch::Ambiguous(candidates)) => {
                self.sink
                    .push(Diagnostic::ambiguous(&ident.text, &candidates, ident.range));
                self.add_reference(
                    &ident.text,
                    ident.range,
                    ReferenceKind::Relation,
                    Resolution::Unresolved,
                );
                None
            }
            None => {
                let candidates = self.visible_range_variable_names();
                self.report_unresolved("table or alias", &ident.text, ident.range, &candidates);
                self.add_reference(
                    &ident.text,
                    ident.range,
                    ReferenceKind::Relation,
                    Resolution::Unresolved,
                );
                None
            }
        }
    }

    /// Resolve `ident` as a column of a specific relation
    fn resolve_in_relation(&mut self, ident: &Ident, relation: RelationId) -> Resolution {
        let name = ident.text.as_str();
        let (resolution, candidates) = match self.table.relation(relation) {
            Some(relation) => match relation.find_column(name) {
                Some(column) => match &column.target {
                    ColumnTarget::Declared(id) => (Resolution::Declared(*id), None),
                    ColumnTarget::External(symbol) => (Resolution::External(symbol.clone()), None),
                    ColumnTarget::Unknown => (Resolution::Unresolved, Some(Vec::new())),
                },
                None if relation.open => (
                    Resolution::External(ExternalSymbol::column(&relation.name, name)),
                    None,
                ),
                None => (
                    Resolution::Unresolved,
                    Some(relation.columns.iter().map(|c| c.name.clone()).collect()),
                ),
            },
            None => (Resolution::Unresolved, Some(Vec::new())),
        };

        if let Some(candidates) = candidates {
            self.report_unresolved("column", name, ident.range, &candidates);
        }
        let id = self.add_reference(name, ident.range, ReferenceKind::Column, resolution.clone());
        self.table.pin_reference(id, relation);
        resolution
    }

    fn lookup_column(&self, name: &str) -> ColumnLookup {
        let mut visible = Vec::new();

        for scope in self.table.scopes().ancestors(self.current()) {
            let mut found: Vec<(&RangeVariable, &OutputColumn)> = Vec::new();
            let mut open: Vec<&Relation> = Vec::new();

            for range_variable in &scope.range_variables {
                let Some(relation) = self.table.relation(range_variable.relation) else {
                    continue;
                };
                match relation.find_column(name) {
                    Some(column) => found.push((range_variable, column)),
                    None if relation.open => open.push(relation),
                    None => {}
                }
                visible.extend(relation.columns.iter().map(|c| c.name.clone()));
            }

            match found.as_slice() {
                [] => {}
                [(_, column)] => return ColumnLookup::Found(column.target.clone()),
                [(_, column), ..] if scope.using_columns.iter().any(|c| c == name) => {
                    return ColumnLookup::Found(column.target.clone());
                }
                several => {
                    let owners = several
                        .iter()
                        .map(|(rv, _)| {
                            if rv.name.is_empty() {
                                self.relation_name(rv.relation)
                            } else {
                                rv.name.clone()
                            }
                        })
                        .collect();
                    return ColumnLookup::Ambiguous(owners);
                }
            }

            if !open.is_empty() {
                let owner = match open.as_slice() {
                    [only] => only.name.clone(),
                    _ => String::new(),
                };
                return ColumnLookup::Found(ColumnTarget::External(ExternalSymbol::column(
                    owner, name,
                )));
            }
        }

        ColumnLookup::Missing(visible)
    }

    /// Resolve an unqualified column name
    fn resolve_unqualified(&mut self, ident: &Ident) -> Resolution {
        let name = ident.text.as_str();

        let output_target = self.order_by_outputs.as_ref().and_then(|outputs| {
            outputs
                .iter()
                .find(|c| c.name == name && c.target != ColumnTarget::Unknown)
                .map(|c| c.target.clone())
        });

        let resolution = match output_target {
            Some(target) => target_resolution(&target),
            None => match self.lookup_column(name) {
                ColumnLookup::Found(ColumnTarget::Unknown) => {
                    self.report_unresolved("column", name, ident.range, &[]);
                    Resolution::Unresolved
                }
                ColumnLookup::Found(target) => target_resolution(&target),
                ColumnLookup::Ambiguous(owners) => {
                    self.sink
                        .push(Diagnostic::ambiguous(name, &owners, ident.range));
                    Resolution::Unresolved
                }
                ColumnLookup::Missing(candidates) => {
                    self.report_unresolved("column", name, ident.range, &candidates);
                    Resolution::Unresolved
                }
            },
        };

        self.add_reference(name, ident.range, ReferenceKind::Column, resolution.clone());
        resolution
    }

    /// Visit a column reference
    ///
    /// Returns the output column it contributes when used as a select item.
    fn visit_column_ref(&mut self, column: &ColumnRef) -> Option<OutputColumn> {
        if let Some(dot) = column.dangling_dot {
            self.sink
                .push(Diagnostic::malformed("Missing column name after '.'", dot));
        }

        let (first, rest) = column.parts.split_first()?;
        let qualified = !rest.is_empty() || column.dangling_dot.is_some();

        if !qualified {
            let resolution = self.resolve_unqualified(first);
            return Some(OutputColumn::new(&first.text, ColumnTarget::from(&resolution)));
        }

        // `p0.p1`: a range variable qualifier, or a column with field access
        let (ident, fields, resolution) = if self.find_range_variable(&first.text).is_some()
            || !self.column_exposed(&first.text)
        {
            let Some(relation) = self.visit_qualifier(first) else {
                // Already reported on the qualifier
                if let Some(ident) = rest.first() {
                    self.add_reference(
                        &ident.text,
                        ident.range,
                        ReferenceKind::Column,
                        Resolution::Unresolved,
                    );
                }
                return None;
            };
            let (ident, fields) = rest.split_first()?;
            let resolution = self.resolve_in_relation(ident, relation);
            (ident, fields, resolution)
        } else {
            let resolution = self.resolve_unqualified(first);
            (first, rest, resolution)
        };

        match fields.last() {
            None => Some(OutputColumn::new(&ident.text, ColumnTarget::from(&resolution))),
            Some(field) => Some(OutputColumn::new(
                &field.text,
                ColumnTarget::External(ExternalSymbol::column("", &field.text)),
            )),
        }
    }

    // ----- expressions -----

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Column(column) => {
                self.visit_column_ref(column);
            }
            Expr::Literal { .. } => {}
            Expr::Function { args, over, .. } => {
                for arg in args {
                    self.visit_expr(arg);
                }
                if let Some(window) = over {
                    for expr in &window.partition_by {
                        self.visit_expr(expr);
                    }
                    for item in &window.order_by {
                        self.visit_expr(&item.expr);
                    }
                }
            }
            Expr::Cast { expr, .. } | Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } => {
                self.visit_expr(expr)
            }
            Expr::Case {
                operand,
                branches,
                else_result,
                ..
            } => {
                if let Some(operand) = operand {
                    self.visit_expr(operand);
                }
                for (condition, result) in branches {
                    self.visit_expr(condition);
                    self.visit_expr(result);
                }
                if let Some(else_result) = else_result {
                    self.visit_expr(else_result);
                }
            }
            Expr::Binary { .. } => {
                let mut rights = Vec::new();
                let mut leftmost = expr;
                while let Expr::Binary { left, right, .. } = leftmost {
                    rights.push(right.as_ref());
                    leftmost = left.as_ref();
                }
                self.visit_expr(leftmost);
                for right in rights.into_iter().rev() {
                    self.visit_expr(right);
                }
            }
            Expr::InList { expr, list, .. } => {
                self.visit_expr(expr);
                for item in list {
                    self.visit_expr(item);
                }
            }
            Expr::InSubquery { expr, subquery, .. } => {
                self.visit_expr(expr);
                self.visit_query(subquery, ScopeKind::Subquery);
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                self.visit_expr(expr);
                self.visit_expr(low);
                self.visit_expr(high);
            }
            Expr::Exists { subquery, .. } | Expr::Subquery { query: subquery, .. } => {
                self.visit_query(subquery, ScopeKind::Subquery);
            }
            Expr::Constructor { items, .. } => {
                for item in items {
                    self.visit_expr(item);
                }
            }
            Expr::Index { base, index, .. } => {
                self.visit_expr(base);
                self.visit_expr(index);
            }
        }
    }
}

fn target_resolution(target: &ColumnTarget) -> Resolution {
    match target {
        ColumnTarget::Declared(id) => Resolution::Declared(*id),
        ColumnTarget::External(symbol) => Resolution::External(symbol.clone()),
        ColumnTarget::Unknown => Resolution::Unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use crate::symbol::Reference;
    use flink_sql_grammar::{parse, LineIndex};

    fn analyze(source: &str) -> (SymbolTable, Vec<Diagnostic>) {
        let tree = parse(source);
        let mut sink = DiagnosticSink::new();
        let table = SemanticAnalyzer::new().analyze(&tree, &mut sink);
        (table, sink.take_sorted())
    }

    /// Position of the `nth` occurrence of `needle`
    fn at(source: &str, needle: &str, nth: usize) -> Position {
        let offset = source
            .match_indices(needle)
            .nth(nth)
            .map(|(offset, _)| offset)
            .expect("needle not found");
        LineIndex::new(source).position(offset)
    }

    fn reference_at<'t>(table: &'t SymbolTable, position: Position) -> &'t Reference {
        table
            .references()
            .iter()
            .find(|r| r.range.start == position)
            .expect("no reference at position")
    }

    fn declaration_at(table: &SymbolTable, position: Position) -> DeclarationId {
        table
            .declarations()
            .iter()
            .find(|d| d.range.start == position)
            .map(|d| d.id)
            .expect("no declaration at position")
    }

    fn count(diagnostics: &[Diagnostic], kind: DiagnosticKind) -> usize {
        diagnostics.iter().filter(|d| d.kind == kind).count()
    }

    #[test]
    fn test_alias_qualifier_resolves_to_alias() {
        let source = "SELECT a.x FROM t AS a";
        let (table, diagnostics) = analyze(source);

        let alias = declaration_at(&table, at(source, "a", 1));
        assert_eq!(
            reference_at(&table, at(source, "a.x", 0)).resolution,
            Resolution::Declared(alias)
        );
        assert_eq!(
            reference_at(&table, at(source, "x", 0)).resolution,
            Resolution::External(ExternalSymbol::column("t", "x"))
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_unknown_qualifier_is_unresolved() {
        let source = "SELECT b.x FROM t AS a";
        let (table, diagnostics) = analyze(source);

        let b = reference_at(&table, at(source, "b", 0));
        assert_eq!(b.resolution, Resolution::Unresolved);
        assert_eq!(count(&diagnostics, DiagnosticKind::UnresolvedReference), 1);
        assert_eq!(diagnostics[0].range, b.range);

        // The column part is recorded without a second diagnostic
        let x = reference_at(&table, at(source, "x", 0));
        assert_eq!(x.kind, ReferenceKind::Column);
        assert_eq!(x.resolution, Resolution::Unresolved);
    }

    #[test]
    fn test_deeply_nested_input_is_a_syntax_error() {
        let depth = 10_000;
        let source = format!(
            "SELECT {}a.x{} FROM t AS a",
            "(".repeat(depth),
            ")".repeat(depth)
        );
        let analysis = crate::analyze(&source);

        assert_eq!(analysis.diagnostics.len(), 1);
        assert_eq!(analysis.diagnostics[0].kind, DiagnosticKind::SyntaxError);
        assert_eq!(analysis.table.declarations().len(), 1);
    }

    #[test]
    fn test_long_or_chain_resolves_every_operand() {
        let source = format!(
            "SELECT a.x FROM t AS a WHERE {}",
            vec!["a.x = 1"; 2_000].join(" OR ")
        );
        let (table, diagnostics) = analyze(&source);
        assert!(diagnostics.is_empty());

        let alias = declaration_at(&table, at(&source, "a", 1));
        let uses = table
            .references()
            .iter()
            .filter(|r| r.resolution == Resolution::Declared(alias))
            .count();
        assert_eq!(uses, 2_001);
    }

    #[test]
    fn test_long_union_chain_takes_columns_from_first_operand() {
        let source = format!(
            "SELECT d.n FROM ({}) AS d",
            vec!["SELECT 1 AS n"; 2_000].join(" UNION ALL ")
        );
        let (_, diagnostics) = analyze(&source);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_duplicate_alias_keeps_first() {
        let source = "SELECT a.x FROM t AS a, u AS a";
        let (table, diagnostics) = analyze(source);

        assert_eq!(count(&diagnostics, DiagnosticKind::DuplicateDeclaration), 1);
        let first = declaration_at(&table, at(source, "a", 1));
        assert_eq!(
            reference_at(&table, at(source, "a.x", 0)).resolution,
            Resolution::Declared(first)
        );
    }

    #[test]
    fn test_declared_table_columns() {
        let source = "CREATE TABLE t (x INT, y STRING);\nSELECT x, t.y FROM t";
        let (table, diagnostics) = analyze(source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let x = declaration_at(&table, at(source, "x", 0));
        let y = declaration_at(&table, at(source, "y", 0));
        let t = declaration_at(&table, at(source, "t", 0));
        assert_eq!(
            reference_at(&table, at(source, "x", 1)).resolution,
            Resolution::Declared(x)
        );
        assert_eq!(
            reference_at(&table, at(source, "t.y", 0)).resolution,
            Resolution::Declared(t)
        );
        assert_eq!(
            reference_at(&table, at(source, "y", 1)).resolution,
            Resolution::Declared(y)
        );
    }

    #[test]
    fn test_missing_column_of_declared_table() {
        let source = "CREATE TABLE t (amount INT);\nSELECT amout FROM t";
        let (table, diagnostics) = analyze(source);

        assert_eq!(
            reference_at(&table, at(source, "amout", 0)).resolution,
            Resolution::Unresolved
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("Did you mean 'amount'?"));
    }

    #[test]
    fn test_ambiguous_unqualified_column() {
        let source = "CREATE TABLE a (id INT);\nCREATE TABLE b (id INT);\nSELECT id FROM a, b";
        let (table, diagnostics) = analyze(source);

        assert_eq!(
            reference_at(&table, at(source, "id", 2)).resolution,
            Resolution::Unresolved
        );
        assert_eq!(count(&diagnostics, DiagnosticKind::AmbiguousReference), 1);
    }

    #[test]
    fn test_using_column_is_not_ambiguous() {
        let source =
            "CREATE TABLE a (id INT);\nCREATE TABLE b (id INT);\nSELECT id FROM a JOIN b USING (id)";
        let (table, diagnostics) = analyze(source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let a_id = declaration_at(&table, at(source, "id", 0));
        assert_eq!(
            reference_at(&table, at(source, "id", 2)).resolution,
            Resolution::Declared(a_id)
        );
    }

    #[test]
    fn test_cte_resolution_and_columns() {
        let source = "WITH c AS (SELECT 1 AS n) SELECT c.n, n FROM c";
        let (table, diagnostics) = analyze(source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let cte = declaration_at(&table, at(source, "c", 0));
        let n = declaration_at(&table, at(source, "n", 0));
        assert_eq!(table.declaration(cte).map(|d| d.kind), Some(DeclarationKind::Cte));
        assert_eq!(
            reference_at(&table, at(source, "c", 1)).resolution,
            Resolution::Declared(cte)
        );
        assert_eq!(
            reference_at(&table, at(source, "c", 2)).resolution,
            Resolution::Declared(cte)
        );
        assert_eq!(
            reference_at(&table, at(source, "n", 1)).resolution,
            Resolution::Declared(n)
        );
        assert_eq!(
            reference_at(&table, at(source, "n", 2)).resolution,
            Resolution::Declared(n)
        );
    }

    #[test]
    fn test_cte_not_visible_in_own_body() {
        let source = "WITH c AS (SELECT * FROM c) SELECT * FROM c";
        let (table, _) = analyze(source);

        assert!(matches!(
            reference_at(&table, at(source, "c", 1)).resolution,
            Resolution::External(_)
        ));
        let cte = declaration_at(&table, at(source, "c", 0));
        assert_eq!(
            reference_at(&table, at(source, "c", 2)).resolution,
            Resolution::Declared(cte)
        );
    }

    #[test]
    fn test_select_alias_in_order_by() {
        let source = "SELECT price * 2 AS total FROM orders ORDER BY total";
        let (table, diagnostics) = analyze(source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let total = declaration_at(&table, at(source, "total", 0));
        assert_eq!(
            reference_at(&table, at(source, "total", 1)).resolution,
            Resolution::Declared(total)
        );
    }

    #[test]
    fn test_innermost_alias_wins() {
        let source = "SELECT a.x FROM t AS a WHERE EXISTS (SELECT a.y FROM u AS a)";
        let (table, _) = analyze(source);

        let outer = declaration_at(&table, at(source, "a", 1));
        let inner = declaration_at(&table, at(source, "a", 3));
        assert_eq!(
            reference_at(&table, at(source, "a.x", 0)).resolution,
            Resolution::Declared(outer)
        );
        assert_eq!(
            reference_at(&table, at(source, "a.y", 0)).resolution,
            Resolution::Declared(inner)
        );
    }

    #[test]
    fn test_correlated_subquery_sees_outer_alias() {
        let source = "SELECT 1 FROM t AS o WHERE EXISTS (SELECT 1 FROM u AS i WHERE i.k = o.k)";
        let (table, diagnostics) = analyze(source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let o = declaration_at(&table, at(source, "o", 0));
        assert_eq!(
            reference_at(&table, at(source, "o.k", 0)).resolution,
            Resolution::Declared(o)
        );
    }

    #[test]
    fn test_malformed_constructs_are_warnings() {
        let (_, diagnostics) = analyze("SELECT a. FROM t AS a");
        assert_eq!(count(&diagnostics, DiagnosticKind::MalformedConstruct), 1);
        assert!(diagnostics
            .iter()
            .all(|d| d.severity == crate::diagnostics::Severity::Warning));

        let (table, diagnostics) = analyze("SELECT x FROM t AS");
        assert_eq!(count(&diagnostics, DiagnosticKind::MalformedConstruct), 1);
        assert!(table
            .declarations()
            .iter()
            .all(|d| d.kind != DeclarationKind::Alias));
    }

    #[test]
    fn test_external_columns_have_no_diagnostics() {
        let source = "SELECT id, email FROM catalog1.db1.users WHERE age > 3";
        let (table, diagnostics) = analyze(source);
        assert!(diagnostics.is_empty());

        assert_eq!(
            reference_at(&table, at(source, "users", 0)).resolution,
            Resolution::External(ExternalSymbol::relation("catalog1.db1.users"))
        );
        assert_eq!(
            reference_at(&table, at(source, "age", 0)).resolution,
            Resolution::External(ExternalSymbol::column("catalog1.db1.users", "age"))
        );
    }

    #[test]
    fn test_window_tvf_columns() {
        let source = "CREATE TABLE bids (bidtime TIMESTAMP(3), price INT);\n\
                      SELECT window_start, SUM(price) FROM TABLE(\
                      TUMBLE(TABLE bids, DESCRIPTOR(bidtime), INTERVAL '10' MINUTE)) \
                      GROUP BY window_start, window_end";
        let (table, diagnostics) = analyze(source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let bidtime = declaration_at(&table, at(source, "bidtime", 0));
        assert_eq!(
            reference_at(&table, at(source, "bidtime", 1)).resolution,
            Resolution::Declared(bidtime)
        );
        assert_eq!(
            reference_at(&table, at(source, "window_start", 0)).resolution,
            Resolution::External(ExternalSymbol::column("TUMBLE", "window_start"))
        );
        let price = declaration_at(&table, at(source, "price", 0));
        assert_eq!(
            reference_at(&table, at(source, "price", 1)).resolution,
            Resolution::Declared(price)
        );
    }

    #[test]
    fn test_computed_column_and_watermark() {
        let source = "CREATE TABLE t (\n  ts TIMESTAMP(3),\n  price INT,\n  doubled AS price * 2,\n  \
                      WATERMARK FOR ts AS ts - INTERVAL '5' SECOND\n)";
        let (table, diagnostics) = analyze(source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let ts = declaration_at(&table, at(source, "ts", 0));
        let refs: Vec<_> = table.references_to(ts).collect();
        assert_eq!(refs.len(), 2);
        let price = declaration_at(&table, at(source, "price", 0));
        assert_eq!(table.references_to(price).count(), 1);
    }

    #[test]
    fn test_derived_table_alias_columns() {
        let source = "SELECT d.k FROM (SELECT id FROM t) AS d(k)";
        let (table, diagnostics) = analyze(source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let k = declaration_at(&table, at(source, "k", 1));
        assert_eq!(
            reference_at(&table, at(source, "k", 0)).resolution,
            Resolution::Declared(k)
        );
    }

    #[test]
    fn test_view_exposes_query_columns() {
        let source = "CREATE TABLE t (x INT);\nCREATE VIEW v AS SELECT x AS y FROM t;\nSELECT y, z FROM v";
        let (table, diagnostics) = analyze(source);

        let y = declaration_at(&table, at(source, "y", 0));
        assert_eq!(
            reference_at(&table, at(source, "y", 1)).resolution,
            Resolution::Declared(y)
        );
        assert_eq!(
            reference_at(&table, at(source, "z", 0)).resolution,
            Resolution::Unresolved
        );
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_insert_target_columns() {
        let source = "CREATE TABLE sink (id INT);\nINSERT INTO sink (id) SELECT id FROM src";
        let (table, diagnostics) = analyze(source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let sink = declaration_at(&table, at(source, "sink", 0));
        let id = declaration_at(&table, at(source, "id", 0));
        assert_eq!(
            reference_at(&table, at(source, "sink", 1)).resolution,
            Resolution::Declared(sink)
        );
        assert_eq!(
            reference_at(&table, at(source, "id", 1)).resolution,
            Resolution::Declared(id)
        );
        assert!(matches!(
            reference_at(&table, at(source, "id", 2)).resolution,
            Resolution::External(_)
        ));
    }

    #[test]
    fn test_declarations_are_unique_per_scope() {
        let source = "CREATE TABLE t (x INT, x INT);\nCREATE TABLE t (y INT)";
        let (table, diagnostics) = analyze(source);
        assert_eq!(count(&diagnostics, DiagnosticKind::DuplicateDeclaration), 2);

        for scope in table.scopes().scopes() {
            let mut keys: Vec<_> = table
                .declarations()
                .iter()
                .filter(|d| d.scope == scope.id)
                .map(|d| (d.name.clone(), d.kind))
                .collect();
            let before = keys.len();
            keys.sort();
            keys.dedup();
            assert_eq!(keys.len(), before);
        }
    }
}
