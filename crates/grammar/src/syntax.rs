// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Parse tree
//!
//! A closed set of node kinds with source ranges. Consumers dispatch with
//! exhaustive `match`es, so a new node kind is a compile error in every
//! visitor that has not handled it yet.
//!
//! Nodes that the parser accepted but that are structurally incomplete keep
//! the missing part as `None` (for example [`Alias::name`] after a dangling
//! `AS`), which lets the semantic layer report them without the parser
//! aborting.

use crate::text::Range;

/// An identifier with quoting removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    /// Identifier text (backticks stripped, doubled backticks unescaped)
    pub text: String,
    /// Range of the identifier token, quotes included
    pub range: Range,
    /// Whether the identifier was written with backticks
    pub quoted: bool,
}

impl Ident {
    pub fn new(text: impl Into<String>, range: Range, quoted: bool) -> Self {
        Self {
            text: text.into(),
            range,
            quoted,
        }
    }
}

/// Possibly qualified object name (`catalog.db.table`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectName {
    pub parts: Vec<Ident>,
    pub range: Range,
}

impl ObjectName {
    /// The unqualified object name (last part)
    pub fn base(&self) -> Option<&Ident> {
        self.parts.last()
    }

    /// Whether the name carries a catalog or database qualifier
    pub fn is_qualified(&self) -> bool {
        self.parts.len() > 1
    }

    /// Dotted rendering of the full name
    pub fn dotted(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// A parsed document
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub statements: Vec<Statement>,
}

/// Top-level statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTable),
    CreateView(CreateView),
    Insert(Insert),
    Query(Query),
    /// Statement the semantic layer has no interest in (`SET`, `USE`, ...)
    Other { range: Range },
    /// Statement that failed to parse; its syntax error is on the tree
    Error { range: Range },
}

impl Statement {
    pub fn range(&self) -> Range {
        match self {
            Statement::CreateTable(s) => s.range,
            Statement::CreateView(s) => s.range,
            Statement::Insert(s) => s.range,
            Statement::Query(q) => q.range,
            Statement::Other { range } | Statement::Error { range } => *range,
        }
    }
}

/// `CREATE [TEMPORARY] TABLE`
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: ObjectName,
    pub elements: Vec<TableElement>,
    pub partitioned_by: Vec<Ident>,
    /// `LIKE source_table` clause
    pub like: Option<ObjectName>,
    /// `CREATE TABLE ... AS SELECT` body
    pub as_query: Option<Query>,
    pub range: Range,
}

/// Entry in a `CREATE TABLE` element list
#[derive(Debug, Clone, PartialEq)]
pub enum TableElement {
    Column(ColumnDef),
    Watermark {
        column: Ident,
        expr: Expr,
        range: Range,
    },
    PrimaryKey {
        columns: Vec<Ident>,
        range: Range,
    },
}

/// Column definition inside `CREATE TABLE`
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: Ident,
    pub kind: ColumnKind,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    /// `name TYPE`
    Physical { data_type: DataType },
    /// `name AS expr`
    Computed { expr: Expr },
    /// `name TYPE METADATA [FROM 'key'] [VIRTUAL]`
    Metadata {
        data_type: DataType,
        key: Option<String>,
        is_virtual: bool,
    },
}

/// Data type as written (`DECIMAL(10, 2)`, `ARRAY<STRING>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataType {
    pub text: String,
    pub range: Range,
}

/// `CREATE [TEMPORARY] VIEW name [(columns)] AS query`
#[derive(Debug, Clone, PartialEq)]
pub struct CreateView {
    pub name: ObjectName,
    pub columns: Vec<Ident>,
    pub query: Query,
    pub range: Range,
}

/// `INSERT INTO|OVERWRITE target [(columns)] query`
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub target: ObjectName,
    pub columns: Vec<Ident>,
    pub query: Query,
    pub overwrite: bool,
    pub range: Range,
}

/// A full query expression: `WITH` list, body, `ORDER BY`, `LIMIT`
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub with: Vec<Cte>,
    pub body: SetExpr,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Expr>,
    pub range: Range,
}

/// One `WITH` element
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: Ident,
    pub columns: Vec<Ident>,
    pub query: Box<Query>,
    pub range: Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

/// Body of a query
#[derive(Debug, Clone, PartialEq)]
pub enum SetExpr {
    Select(Box<Select>),
    /// Parenthesized query used as a set operand
    Query(Box<Query>),
    SetOperation {
        op: SetOperator,
        all: bool,
        left: Box<SetExpr>,
        right: Box<SetExpr>,
        range: Range,
    },
    Values {
        rows: Vec<Vec<Expr>>,
        range: Range,
    },
}

impl SetExpr {
    pub fn range(&self) -> Range {
        match self {
            SetExpr::Select(select) => select.range,
            SetExpr::Query(query) => query.range,
            SetExpr::SetOperation { range, .. } | SetExpr::Values { range, .. } => *range,
        }
    }
}

/// One `SELECT` query block
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    pub from: Vec<TableWithJoins>,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Expr {
        expr: Expr,
        alias: Option<Alias>,
        range: Range,
    },
    /// `*`
    Wildcard { range: Range },
    /// `q.*`
    QualifiedWildcard { qualifier: Ident, range: Range },
    /// Nothing between two commas
    Missing { range: Range },
}

/// `[AS] name [(columns)]`
///
/// `name` is `None` when `AS` is not followed by an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub name: Option<Ident>,
    pub columns: Vec<Ident>,
    pub range: Range,
}

/// A `FROM` item with the joins hanging off it
#[derive(Debug, Clone, PartialEq)]
pub struct TableWithJoins {
    pub relation: TableFactor,
    pub joins: Vec<Join>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub natural: bool,
    pub relation: TableFactor,
    pub constraint: JoinConstraint,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinConstraint {
    On(Expr),
    Using(Vec<Ident>),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableFactor {
    /// Named table, view or CTE
    Table {
        name: ObjectName,
        /// `FOR SYSTEM_TIME AS OF expr`
        temporal: Option<Expr>,
        alias: Option<Alias>,
        range: Range,
    },
    /// Parenthesized subquery
    Derived {
        lateral: bool,
        subquery: Box<Query>,
        alias: Option<Alias>,
        range: Range,
    },
    /// `[LATERAL] TABLE(func(args))`, including the windowing TVFs
    TableFunction {
        lateral: bool,
        function: Ident,
        args: Vec<TableFunctionArg>,
        alias: Option<Alias>,
        range: Range,
    },
    /// Parenthesized join tree
    Nested {
        inner: Box<TableWithJoins>,
        alias: Option<Alias>,
        range: Range,
    },
}

impl TableFactor {
    pub fn range(&self) -> Range {
        match self {
            TableFactor::Table { range, .. }
            | TableFactor::Derived { range, .. }
            | TableFactor::TableFunction { range, .. }
            | TableFactor::Nested { range, .. } => *range,
        }
    }

    pub fn alias(&self) -> Option<&Alias> {
        match self {
            TableFactor::Table { alias, .. }
            | TableFactor::Derived { alias, .. }
            | TableFactor::TableFunction { alias, .. }
            | TableFactor::Nested { alias, .. } => alias.as_ref(),
        }
    }
}

/// Argument of a table-valued function
#[derive(Debug, Clone, PartialEq)]
pub enum TableFunctionArg {
    /// `TABLE name`
    Table(ObjectName),
    /// `DESCRIPTOR(col, ...)`
    Descriptor { columns: Vec<Ident>, range: Range },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: Expr,
    pub descending: bool,
    pub range: Range,
}

/// `OVER (PARTITION BY ... ORDER BY ...)`
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub range: Range,
}

/// Column reference, possibly qualified and possibly followed by nested
/// field accesses (`t.address.city`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub parts: Vec<Ident>,
    /// Range of a trailing `.` with no name after it
    pub dangling_dot: Option<Range>,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    /// Literal of any type, including `INTERVAL` and typed literals
    Literal { range: Range },
    Function {
        name: Ident,
        args: Vec<Expr>,
        distinct: bool,
        /// `COUNT(*)`
        wildcard: bool,
        over: Option<WindowSpec>,
        range: Range,
    },
    Cast {
        expr: Box<Expr>,
        data_type: DataType,
        range: Range,
    },
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        else_result: Option<Box<Expr>>,
        range: Range,
    },
    Unary {
        op: String,
        expr: Box<Expr>,
        range: Range,
    },
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
        range: Range,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
        range: Range,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
        range: Range,
    },
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<Query>,
        negated: bool,
        range: Range,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
        range: Range,
    },
    Exists {
        subquery: Box<Query>,
        negated: bool,
        range: Range,
    },
    /// Scalar subquery
    Subquery { query: Box<Query>, range: Range },
    /// `(a, b)`, `ROW(a, b)`, `ARRAY[a, b]`, `MAP[k, v]`
    Constructor { items: Vec<Expr>, range: Range },
    /// `base[index]`
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        range: Range,
    },
}

impl Expr {
    pub fn range(&self) -> Range {
        match self {
            Expr::Column(c) => c.range,
            Expr::Literal { range }
            | Expr::Function { range, .. }
            | Expr::Cast { range, .. }
            | Expr::Case { range, .. }
            | Expr::Unary { range, .. }
            | Expr::Binary { range, .. }
            | Expr::IsNull { range, .. }
            | Expr::InList { range, .. }
            | Expr::InSubquery { range, .. }
            | Expr::Between { range, .. }
            | Expr::Exists { range, .. }
            | Expr::Subquery { range, .. }
            | Expr::Constructor { range, .. }
            | Expr::Index { range, .. } => *range,
        }
    }
}
