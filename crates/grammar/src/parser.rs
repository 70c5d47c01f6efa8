// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Recursive-descent parser
//!
//! Error-tolerant: syntax errors are recorded and the parser resynchronizes
//! at the next clause keyword (`FROM`, `WHERE`, ...) or statement
//! terminator, so the rest of the document still produces a tree.

use crate::error::{SyntaxError, SyntaxErrorKind};
use crate::keywords::{is_niladic_function, is_reserved_keyword, is_time_unit, unquote_identifier};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::syntax::*;
use crate::text::{LineIndex, Range};
use tracing::trace;

type PResult<T> = Result<T, SyntaxError>;

/// Keywords at which clause-level recovery stops
const CLAUSE_KEYWORDS: &[&str] = &[
    "FROM",
    "WHERE",
    "GROUP",
    "HAVING",
    "ORDER",
    "LIMIT",
    "UNION",
    "INTERSECT",
    "EXCEPT",
];

/// Functions whose arguments may be bare time units (`TIMESTAMPADD(HOUR, ...)`)
const TIME_UNIT_FUNCTIONS: &[&str] = &[
    "CEIL",
    "EXTRACT",
    "FLOOR",
    "TIMESTAMPADD",
    "TIMESTAMPDIFF",
];

/// Deepest nesting of parenthesized expressions, subqueries and joined
/// groups the parser descends into
pub const MAX_NESTING_DEPTH: usize = 16;

pub(crate) struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    /// Byte offset one past the last consumed token
    last_end: usize,
    line_index: LineIndex,
    errors: Vec<SyntaxError>,
    /// Current nesting depth
    depth: usize,
}

impl<'src> Parser<'src> {
    pub(crate) fn new(source: &'src str) -> Self {
        let line_index = LineIndex::new(source);
        let mut errors = Vec::new();
        let mut tokens = Vec::new();

        for token in tokenize(source) {
            if token.kind == TokenKind::Error {
                errors.push(SyntaxError::new(
                    SyntaxErrorKind::InvalidToken(token.text(source).to_string()),
                    line_index.range(token.span.clone()),
                ));
            } else {
                tokens.push(token);
            }
        }

        Self {
            source,
            tokens,
            pos: 0,
            last_end: 0,
            line_index,
            errors,
            depth: 0,
        }
    }

    pub(crate) fn finish(self) -> (Vec<SyntaxError>, LineIndex) {
        (self.errors, self.line_index)
    }

    // ---------------------------------------------------------------------
    // Token helpers
    // ---------------------------------------------------------------------

    fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn kind_nth(&self, n: usize) -> TokenKind {
        self.peek_nth(n).kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
            self.last_end = token.span.end;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(kind.describe()))
        }
    }

    fn word_at(&self, n: usize) -> Option<&'src str> {
        let token = self.peek_nth(n);
        (token.kind == TokenKind::Word).then(|| token.text(self.source))
    }

    fn at_kw_nth(&self, n: usize, keyword: &str) -> bool {
        self.word_at(n)
            .is_some_and(|w| w.eq_ignore_ascii_case(keyword))
    }

    fn at_kw(&self, keyword: &str) -> bool {
        self.at_kw_nth(0, keyword)
    }

    fn eat_kw(&mut self, keyword: &str) -> bool {
        if self.at_kw(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, keyword: &str) -> PResult<Token> {
        if self.at_kw(keyword) {
            Ok(self.advance())
        } else {
            Err(self.error_here(keyword))
        }
    }

    fn at_any_kw(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|kw| self.at_kw(kw))
    }

    /// Byte offset where the next token starts
    fn start(&self) -> usize {
        self.peek().span.start
    }

    fn range_from(&self, start: usize) -> Range {
        self.line_index.range(start..self.last_end.max(start))
    }

    fn token_range(&self, token: &Token) -> Range {
        self.line_index.range(token.span.clone())
    }

    fn describe_token(&self, token: &Token) -> String {
        match token.kind {
            TokenKind::Word | TokenKind::QuotedIdent | TokenKind::Number | TokenKind::String => {
                format!("'{}'", token.text(self.source))
            }
            other => other.describe().to_string(),
        }
    }

    fn error_here(&self, expected: &str) -> SyntaxError {
        let token = self.peek();
        let range = self.token_range(token);
        let kind = if token.kind == TokenKind::Eof {
            SyntaxErrorKind::UnexpectedEof(expected.to_string())
        } else {
            SyntaxErrorKind::Expected {
                expected: expected.to_string(),
                found: self.describe_token(token),
            }
        };
        SyntaxError::new(kind, range)
    }

    /// Record an error and skip to the next clause boundary
    fn recover<T>(&mut self, result: PResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                trace!("recovering from syntax error: {}", err);
                self.errors.push(err);
                self.synchronize();
                None
            }
        }
    }

    /// Skip tokens up to a clause keyword, `;`, or a `)` closing an
    /// enclosing group, all at nesting depth zero
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.kind() {
                TokenKind::Eof => return,
                TokenKind::Semicolon if depth == 0 => return,
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                TokenKind::Word if depth == 0 && self.at_any_kw(CLAUSE_KEYWORDS) => return,
                _ => {}
            }
            self.advance();
        }
    }

    /// Step one nesting level deeper
    ///
    /// At the limit the error is recorded, the depth is left unchanged and
    /// `false` is returned; the caller skips the rest of the group.
    fn enter_nesting(&mut self) -> bool {
        if self.depth >= MAX_NESTING_DEPTH {
            let range = self.token_range(self.peek());
            trace!("nesting limit reached at {}", range);
            self.errors.push(SyntaxError::new(
                SyntaxErrorKind::NestingTooDeep(MAX_NESTING_DEPTH),
                range,
            ));
            return false;
        }
        self.depth += 1;
        true
    }

    fn exit_nesting(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Skip up to the `)` closing the enclosing group, or `;` at depth zero
    fn skip_to_group_end(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.kind() {
                TokenKind::Eof => return,
                TokenKind::Semicolon if depth == 0 => return,
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.advance();
        }
    }

    /// Empty query standing in for a group skipped at the nesting limit
    fn skipped_query(&self, start: usize) -> Query {
        let range = self.range_from(start);
        Query {
            with: Vec::new(),
            body: SetExpr::Values {
                rows: Vec::new(),
                range,
            },
            order_by: Vec::new(),
            limit: None,
            range,
        }
    }

    /// Skip to the end of the current statement
    fn skip_statement(&mut self) {
        while !self.at(TokenKind::Semicolon) && !self.at(TokenKind::Eof) {
            self.advance();
        }
    }

    /// Skip a balanced group starting at the current open token
    fn skip_balanced(&mut self, open: TokenKind, close: TokenKind) -> PResult<()> {
        self.expect(open)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.kind() {
                TokenKind::Eof => return Err(self.error_here(close.describe())),
                k if k == open => depth += 1,
                k if k == close => depth -= 1,
                _ => {}
            }
            self.advance();
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Identifiers
    // ---------------------------------------------------------------------

    fn at_ident_nth(&self, n: usize) -> bool {
        let token = self.peek_nth(n);
        match token.kind {
            TokenKind::QuotedIdent => true,
            TokenKind::Word => !is_reserved_keyword(token.text(self.source)),
            _ => false,
        }
    }

    fn at_ident(&self) -> bool {
        self.at_ident_nth(0)
    }

    fn ident_from(&self, token: &Token) -> Ident {
        let raw = token.text(self.source);
        let quoted = token.kind == TokenKind::QuotedIdent;
        Ident::new(unquote_identifier(raw), self.token_range(token), quoted)
    }

    fn parse_ident(&mut self) -> PResult<Ident> {
        if self.at_ident() {
            let token = self.advance();
            Ok(self.ident_from(&token))
        } else {
            Err(self.error_here("identifier"))
        }
    }

    fn parse_ident_list(&mut self) -> PResult<Vec<Ident>> {
        self.expect(TokenKind::LParen)?;
        let mut idents = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                idents.push(self.parse_ident()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(idents)
    }

    fn parse_object_name(&mut self) -> PResult<ObjectName> {
        let start = self.start();
        let mut parts = vec![self.parse_ident()?];
        while self.at(TokenKind::Dot) && self.at_ident_nth(1) {
            self.advance();
            parts.push(self.parse_ident()?);
        }
        Ok(ObjectName {
            parts,
            range: self.range_from(start),
        })
    }

    /// `[AS] name [(columns)]`; returns `None` when no alias is present
    fn parse_alias(&mut self, allow_columns: bool) -> PResult<Option<Alias>> {
        let start = self.start();
        let name = if self.eat_kw("AS") {
            if self.at_ident() {
                Some(self.parse_ident()?)
            } else {
                None
            }
        } else if self.at_ident() {
            Some(self.parse_ident()?)
        } else {
            return Ok(None);
        };

        let columns = if allow_columns && name.is_some() && self.at(TokenKind::LParen) {
            self.parse_ident_list()?
        } else {
            Vec::new()
        };

        Ok(Some(Alias {
            name,
            columns,
            range: self.range_from(start),
        }))
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    pub(crate) fn parse_script(&mut self) -> Script {
        let mut statements = Vec::new();

        loop {
            while self.eat(TokenKind::Semicolon) {}
            if self.at(TokenKind::Eof) {
                break;
            }

            let start_pos = self.pos;
            let start = self.start();
            let statement = match self.parse_statement() {
                Ok(statement) => statement,
                Err(err) => {
                    self.errors.push(err);
                    self.skip_statement();
                    Statement::Error {
                        range: self.range_from(start),
                    }
                }
            };

            if !self.at(TokenKind::Semicolon) && !self.at(TokenKind::Eof) {
                let err = self.error_here("';' or end of statement");
                self.errors.push(err);
                self.skip_statement();
            }

            statements.push(statement);

            if self.pos == start_pos {
                self.advance();
            }
        }

        Script { statements }
    }

    fn parse_statement(&mut self) -> PResult<Statement> {
        if self.at_kw("CREATE") {
            let mut n = 1;
            if self.at_kw_nth(n, "TEMPORARY") {
                n += 1;
                if self.at_kw_nth(n, "SYSTEM") {
                    n += 1;
                }
            }
            if self.at_kw_nth(n, "TABLE") {
                return self.parse_create_table().map(Statement::CreateTable);
            }
            if self.at_kw_nth(n, "VIEW") {
                return self.parse_create_view().map(Statement::CreateView);
            }
        } else if self.at_kw("INSERT") {
            return self.parse_insert().map(Statement::Insert);
        } else if self.at_kw("SELECT")
            || self.at_kw("WITH")
            || self.at_kw("VALUES")
            || self.at(TokenKind::LParen)
        {
            return self.parse_query().map(Statement::Query);
        }

        let start = self.start();
        self.skip_statement();
        Ok(Statement::Other {
            range: self.range_from(start),
        })
    }

    fn parse_if_not_exists(&mut self) -> PResult<()> {
        if self.at_kw("IF") {
            self.advance();
            self.expect_kw("NOT")?;
            self.expect_kw("EXISTS")?;
        }
        Ok(())
    }

    fn parse_create_table(&mut self) -> PResult<CreateTable> {
        let start = self.start();
        self.expect_kw("CREATE")?;
        self.eat_kw("TEMPORARY");
        self.expect_kw("TABLE")?;
        self.parse_if_not_exists()?;
        let name = self.parse_object_name()?;

        let mut elements = Vec::new();
        if self.eat(TokenKind::LParen) {
            loop {
                elements.push(self.parse_table_element()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
        }

        let mut partitioned_by = Vec::new();
        let mut like = None;
        let mut as_query = None;
        loop {
            if self.eat_kw("COMMENT") {
                self.expect(TokenKind::String)?;
            } else if self.at_kw("PARTITIONED") {
                self.advance();
                self.expect_kw("BY")?;
                partitioned_by = self.parse_ident_list()?;
            } else if self.at_kw("WITH") {
                self.advance();
                self.skip_balanced(TokenKind::LParen, TokenKind::RParen)?;
            } else if self.eat_kw("LIKE") {
                like = Some(self.parse_object_name()?);
                if self.at(TokenKind::LParen) {
                    self.skip_balanced(TokenKind::LParen, TokenKind::RParen)?;
                }
            } else if self.eat_kw("AS") {
                as_query = Some(self.parse_query()?);
                break;
            } else {
                break;
            }
        }

        Ok(CreateTable {
            name,
            elements,
            partitioned_by,
            like,
            as_query,
            range: self.range_from(start),
        })
    }

    fn parse_table_element(&mut self) -> PResult<TableElement> {
        let start = self.start();

        if self.at_kw("WATERMARK") && self.at_kw_nth(1, "FOR") {
            self.advance();
            self.advance();
            let column = self.parse_ident()?;
            self.expect_kw("AS")?;
            let expr = self.parse_expr()?;
            return Ok(TableElement::Watermark {
                column,
                expr,
                range: self.range_from(start),
            });
        }

        if self.at_kw("CONSTRAINT") || (self.at_kw("PRIMARY") && self.at_kw_nth(1, "KEY")) {
            if self.eat_kw("CONSTRAINT") {
                self.parse_ident()?;
            }
            self.expect_kw("PRIMARY")?;
            self.expect_kw("KEY")?;
            let columns = self.parse_ident_list()?;
            self.parse_not_enforced()?;
            return Ok(TableElement::PrimaryKey {
                columns,
                range: self.range_from(start),
            });
        }

        let name = self.parse_ident()?;
        let kind = if self.eat_kw("AS") {
            ColumnKind::Computed {
                expr: self.parse_expr()?,
            }
        } else {
            let data_type = self.parse_data_type()?;
            if self.eat_kw("METADATA") {
                let key = if self.eat_kw("FROM") {
                    let token = self.expect(TokenKind::String)?;
                    Some(token.text(self.source).trim_matches('\'').to_string())
                } else {
                    None
                };
                let is_virtual = self.eat_kw("VIRTUAL");
                ColumnKind::Metadata {
                    data_type,
                    key,
                    is_virtual,
                }
            } else {
                ColumnKind::Physical { data_type }
            }
        };

        // Trailing column constraints
        loop {
            if self.at_kw("PRIMARY") {
                self.advance();
                self.expect_kw("KEY")?;
                self.parse_not_enforced()?;
            } else if self.eat_kw("COMMENT") {
                self.expect(TokenKind::String)?;
            } else {
                break;
            }
        }

        Ok(TableElement::Column(ColumnDef {
            name,
            kind,
            range: self.range_from(start),
        }))
    }

    fn parse_not_enforced(&mut self) -> PResult<()> {
        if self.eat_kw("NOT") {
            self.expect_kw("ENFORCED")?;
        }
        Ok(())
    }

    fn parse_data_type(&mut self) -> PResult<DataType> {
        let start = self.start();
        if !matches!(self.kind(), TokenKind::Word | TokenKind::QuotedIdent) {
            return Err(self.error_here("data type"));
        }
        self.advance();

        loop {
            if self.at(TokenKind::LParen) {
                self.skip_balanced(TokenKind::LParen, TokenKind::RParen)?;
            } else if self.at(TokenKind::Lt) {
                self.skip_balanced(TokenKind::Lt, TokenKind::Gt)?;
            } else if self.at_kw("WITH")
                && (self.at_kw_nth(1, "LOCAL") || self.at_kw_nth(1, "TIME"))
            {
                self.advance();
                self.eat_kw("LOCAL");
                self.expect_kw("TIME")?;
                self.expect_kw("ZONE")?;
            } else if self.at_kw("WITHOUT") {
                self.advance();
                self.expect_kw("TIME")?;
                self.expect_kw("ZONE")?;
            } else if self.at_kw("PRECISION") || self.at_kw("VARYING") {
                self.advance();
            } else if self.at_kw("NOT") && self.at_kw_nth(1, "NULL") {
                self.advance();
                self.advance();
            } else if self.at_kw("NULL") {
                self.advance();
            } else {
                break;
            }
        }

        let range = self.range_from(start);
        let text = self.source[start..self.last_end]
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        Ok(DataType { text, range })
    }

    fn parse_create_view(&mut self) -> PResult<CreateView> {
        let start = self.start();
        self.expect_kw("CREATE")?;
        if self.eat_kw("TEMPORARY") {
            self.eat_kw("SYSTEM");
        }
        self.expect_kw("VIEW")?;
        self.parse_if_not_exists()?;
        let name = self.parse_object_name()?;
        let columns = if self.at(TokenKind::LParen) {
            self.parse_ident_list()?
        } else {
            Vec::new()
        };
        if self.eat_kw("COMMENT") {
            self.expect(TokenKind::String)?;
        }
        self.expect_kw("AS")?;
        let query = self.parse_query()?;

        Ok(CreateView {
            name,
            columns,
            query,
            range: self.range_from(start),
        })
    }

    fn parse_insert(&mut self) -> PResult<Insert> {
        let start = self.start();
        self.expect_kw("INSERT")?;
        let overwrite = if self.eat_kw("OVERWRITE") {
            true
        } else {
            self.expect_kw("INTO")?;
            false
        };
        let target = self.parse_object_name()?;
        if self.at_kw("PARTITION") {
            self.advance();
            self.skip_balanced(TokenKind::LParen, TokenKind::RParen)?;
        }
        let columns = if self.at(TokenKind::LParen) && !self.at_kw_nth(1, "SELECT") {
            self.parse_ident_list()?
        } else {
            Vec::new()
        };
        let query = self.parse_query()?;

        Ok(Insert {
            target,
            columns,
            query,
            overwrite,
            range: self.range_from(start),
        })
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    fn parse_query(&mut self) -> PResult<Query> {
        let start = self.start();
        if !self.enter_nesting() {
            self.skip_to_group_end();
            return Ok(self.skipped_query(start));
        }
        let query = self.parse_query_body(start);
        self.exit_nesting();
        query
    }

    fn parse_query_body(&mut self, start: usize) -> PResult<Query> {
        let mut with = Vec::new();
        if self.eat_kw("WITH") {
            loop {
                with.push(self.parse_cte()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }

        let body = self.parse_set_expr()?;

        let mut order_by = Vec::new();
        if self.at_kw("ORDER") && self.at_kw_nth(1, "BY") {
            self.advance();
            self.advance();
            let items = self.parse_order_by_list();
            order_by = self.recover(items).unwrap_or_default();
        }

        let mut limit = None;
        if self.eat_kw("LIMIT") {
            let expr = self.parse_expr();
            limit = self.recover(expr);
        }
        if self.eat_kw("OFFSET") {
            let expr = self.parse_expr();
            self.recover(expr);
            if self.at_kw("ROW") || self.at_kw("ROWS") {
                self.advance();
            }
        }
        if self.eat_kw("FETCH") {
            while !self.at_kw("ONLY") && !self.at(TokenKind::Eof) && !self.at(TokenKind::Semicolon) {
                self.advance();
            }
            self.expect_kw("ONLY")?;
        }

        Ok(Query {
            with,
            body,
            order_by,
            limit,
            range: self.range_from(start),
        })
    }

    fn parse_cte(&mut self) -> PResult<Cte> {
        let start = self.start();
        let name = self.parse_ident()?;
        let columns = if self.at(TokenKind::LParen) {
            self.parse_ident_list()?
        } else {
            Vec::new()
        };
        self.expect_kw("AS")?;
        self.expect(TokenKind::LParen)?;
        let query = self.parse_query()?;
        self.expect(TokenKind::RParen)?;

        Ok(Cte {
            name,
            columns,
            query: Box::new(query),
            range: self.range_from(start),
        })
    }

    fn parse_set_expr(&mut self) -> PResult<SetExpr> {
        let start = self.start();
        let mut left = self.parse_set_operand()?;

        loop {
            let op = if self.at_kw("UNION") {
                SetOperator::Union
            } else if self.at_kw("INTERSECT") {
                SetOperator::Intersect
            } else if self.at_kw("EXCEPT") {
                SetOperator::Except
            } else {
                break;
            };
            self.advance();
            let all = self.eat_kw("ALL");
            if !all {
                self.eat_kw("DISTINCT");
            }
            let right = self.parse_set_operand()?;
            left = SetExpr::SetOperation {
                op,
                all,
                left: Box::new(left),
                right: Box::new(right),
                range: self.range_from(start),
            };
        }

        Ok(left)
    }

    fn parse_set_operand(&mut self) -> PResult<SetExpr> {
        if self.at_kw("SELECT") {
            return Ok(SetExpr::Select(Box::new(self.parse_select()?)));
        }

        if self.at_kw("VALUES") {
            let start = self.start();
            self.advance();
            let mut rows = Vec::new();
            loop {
                self.expect(TokenKind::LParen)?;
                rows.push(self.parse_expr_list(TokenKind::RParen)?);
                self.expect(TokenKind::RParen)?;
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            return Ok(SetExpr::Values {
                rows,
                range: self.range_from(start),
            });
        }

        if self.at(TokenKind::LParen) {
            self.advance();
            let query = self.parse_query()?;
            self.expect(TokenKind::RParen)?;
            return Ok(SetExpr::Query(Box::new(query)));
        }

        Err(self.error_here("SELECT"))
    }

    fn parse_select(&mut self) -> PResult<Select> {
        let start = self.start();
        self.expect_kw("SELECT")?;

        let distinct = self.eat_kw("DISTINCT");
        if !distinct {
            self.eat_kw("ALL");
        }

        let projection = self.parse_projection();
        let projection = self.recover(projection).unwrap_or_default();

        let mut from = Vec::new();
        if self.eat_kw("FROM") {
            let items = self.parse_from();
            from = self.recover(items).unwrap_or_default();
        }

        let mut selection = None;
        if self.eat_kw("WHERE") {
            let expr = self.parse_expr();
            selection = self.recover(expr);
        }

        let mut group_by = Vec::new();
        if self.at_kw("GROUP") && self.at_kw_nth(1, "BY") {
            self.advance();
            self.advance();
            let items = self.parse_group_by();
            group_by = self.recover(items).unwrap_or_default();
        }

        let mut having = None;
        if self.eat_kw("HAVING") {
            let expr = self.parse_expr();
            having = self.recover(expr);
        }

        Ok(Select {
            distinct,
            projection,
            from,
            selection,
            group_by,
            having,
            range: self.range_from(start),
        })
    }

    fn parse_projection(&mut self) -> PResult<Vec<SelectItem>> {
        let mut items = Vec::new();
        loop {
            items.push(self.parse_select_item()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn at_projection_end(&self) -> bool {
        self.at(TokenKind::Comma)
            || self.at(TokenKind::Eof)
            || self.at(TokenKind::Semicolon)
            || self.at(TokenKind::RParen)
            || self.at_any_kw(CLAUSE_KEYWORDS)
    }

    fn parse_select_item(&mut self) -> PResult<SelectItem> {
        if self.at_projection_end() {
            // Nothing where an item belongs: anchor at the preceding token
            let at = self.line_index.position(self.last_end);
            return Ok(SelectItem::Missing {
                range: Range::new(at, at),
            });
        }

        let start = self.start();
        if self.eat(TokenKind::Star) {
            return Ok(SelectItem::Wildcard {
                range: self.range_from(start),
            });
        }

        if self.at_ident() && self.kind_nth(1) == TokenKind::Dot && self.kind_nth(2) == TokenKind::Star
        {
            let qualifier = self.parse_ident()?;
            self.advance();
            self.advance();
            return Ok(SelectItem::QualifiedWildcard {
                qualifier,
                range: self.range_from(start),
            });
        }

        let expr = self.parse_expr()?;
        let alias = self.parse_alias(false)?;
        Ok(SelectItem::Expr {
            expr,
            alias,
            range: self.range_from(start),
        })
    }

    fn parse_group_by(&mut self) -> PResult<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            if self.at_kw("GROUPING") && self.at_kw_nth(1, "SETS") {
                self.advance();
                self.advance();
            }
            items.push(self.parse_expr()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn parse_order_by_list(&mut self) -> PResult<Vec<OrderByItem>> {
        let mut items = Vec::new();
        loop {
            let start = self.start();
            let expr = self.parse_expr()?;
            let descending = if self.eat_kw("DESC") {
                true
            } else {
                self.eat_kw("ASC");
                false
            };
            if self.eat_kw("NULLS") && !self.eat_kw("FIRST") {
                self.expect_kw("LAST")?;
            }
            items.push(OrderByItem {
                expr,
                descending,
                range: self.range_from(start),
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    // ---------------------------------------------------------------------
    // FROM clause
    // ---------------------------------------------------------------------

    fn parse_from(&mut self) -> PResult<Vec<TableWithJoins>> {
        let mut items = Vec::new();
        loop {
            items.push(self.parse_table_with_joins()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn parse_table_with_joins(&mut self) -> PResult<TableWithJoins> {
        let relation = self.parse_table_factor()?;
        let mut joins = Vec::new();

        loop {
            let start = self.start();
            let natural = self.eat_kw("NATURAL");
            let kind = if self.eat_kw("CROSS") {
                JoinKind::Cross
            } else if self.eat_kw("INNER") {
                JoinKind::Inner
            } else if self.eat_kw("LEFT") {
                self.eat_kw("OUTER");
                JoinKind::Left
            } else if self.eat_kw("RIGHT") {
                self.eat_kw("OUTER");
                JoinKind::Right
            } else if self.eat_kw("FULL") {
                self.eat_kw("OUTER");
                JoinKind::Full
            } else if self.at_kw("JOIN") {
                JoinKind::Inner
            } else if natural {
                return Err(self.error_here("JOIN"));
            } else {
                break;
            };
            self.expect_kw("JOIN")?;

            let relation = self.parse_table_factor()?;
            let constraint = if self.eat_kw("ON") {
                JoinConstraint::On(self.parse_expr()?)
            } else if self.eat_kw("USING") {
                JoinConstraint::Using(self.parse_ident_list()?)
            } else {
                JoinConstraint::None
            };

            joins.push(Join {
                kind,
                natural,
                relation,
                constraint,
                range: self.range_from(start),
            });
        }

        Ok(TableWithJoins { relation, joins })
    }

    fn parse_table_factor(&mut self) -> PResult<TableFactor> {
        let start = self.start();
        let lateral = self.eat_kw("LATERAL");

        if self.at_kw("TABLE") && self.kind_nth(1) == TokenKind::LParen {
            self.advance();
            self.advance();
            let function = self.parse_function_name()?;
            self.expect(TokenKind::LParen)?;
            let args = self.parse_table_function_args()?;
            self.expect(TokenKind::RParen)?;
            self.expect(TokenKind::RParen)?;
            let alias = self.parse_alias(true)?;
            return Ok(TableFactor::TableFunction {
                lateral,
                function,
                args,
                alias,
                range: self.range_from(start),
            });
        }

        if self.at(TokenKind::LParen) {
            let is_query = self.at_kw_nth(1, "SELECT")
                || self.at_kw_nth(1, "WITH")
                || self.at_kw_nth(1, "VALUES")
                || self.kind_nth(1) == TokenKind::LParen;
            self.advance();
            if is_query {
                let subquery = self.parse_query()?;
                self.expect(TokenKind::RParen)?;
                let alias = self.parse_alias(true)?;
                return Ok(TableFactor::Derived {
                    lateral,
                    subquery: Box::new(subquery),
                    alias,
                    range: self.range_from(start),
                });
            }
            if !self.enter_nesting() {
                self.skip_to_group_end();
                let subquery = self.skipped_query(start);
                self.expect(TokenKind::RParen)?;
                let alias = self.parse_alias(true)?;
                return Ok(TableFactor::Derived {
                    lateral,
                    subquery: Box::new(subquery),
                    alias,
                    range: self.range_from(start),
                });
            }
            let inner = self.parse_table_with_joins();
            self.exit_nesting();
            let inner = inner?;
            self.expect(TokenKind::RParen)?;
            let alias = self.parse_alias(true)?;
            return Ok(TableFactor::Nested {
                inner: Box::new(inner),
                alias,
                range: self.range_from(start),
            });
        }

        let name = self.parse_object_name()?;
        let temporal = if self.at_kw("FOR") && self.at_kw_nth(1, "SYSTEM_TIME") {
            self.advance();
            self.advance();
            self.expect_kw("AS")?;
            self.expect_kw("OF")?;
            Some(self.parse_additive()?)
        } else {
            None
        };
        let alias = self.parse_alias(true)?;

        Ok(TableFactor::Table {
            name,
            temporal,
            alias,
            range: self.range_from(start),
        })
    }

    fn parse_table_function_args(&mut self) -> PResult<Vec<TableFunctionArg>> {
        let mut args = Vec::new();
        if self.at(TokenKind::RParen) {
            return Ok(args);
        }

        loop {
            // Named argument: `DATA => TABLE t`
            if matches!(self.kind(), TokenKind::Word | TokenKind::QuotedIdent)
                && self.kind_nth(1) == TokenKind::Arrow
            {
                self.advance();
                self.advance();
            }

            if self.at_kw("TABLE") {
                self.advance();
                args.push(TableFunctionArg::Table(self.parse_object_name()?));
            } else if self.at_kw("DESCRIPTOR") && self.kind_nth(1) == TokenKind::LParen {
                let start = self.start();
                self.advance();
                let columns = self.parse_ident_list()?;
                args.push(TableFunctionArg::Descriptor {
                    columns,
                    range: self.range_from(start),
                });
            } else {
                args.push(TableFunctionArg::Expr(self.parse_expr()?));
            }

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        Ok(args)
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    fn parse_expr_list(&mut self, terminator: TokenKind) -> PResult<Vec<Expr>> {
        let mut items = Vec::new();
        if self.at(terminator) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    pub(crate) fn parse_expr(&mut self) -> PResult<Expr> {
        let start = self.start();
        if !self.enter_nesting() {
            self.synchronize();
            return Ok(self.literal(start));
        }
        let expr = self.parse_or();
        self.exit_nesting();
        expr
    }

    /// Parse the operand of a prefix operator one nesting level deeper
    fn parse_prefix_operand(&mut self, operand: fn(&mut Self) -> PResult<Expr>) -> PResult<Expr> {
        let start = self.start();
        if !self.enter_nesting() {
            self.synchronize();
            return Ok(self.literal(start));
        }
        let expr = operand(self);
        self.exit_nesting();
        expr
    }

    fn binary(&self, op: &str, left: Expr, right: Expr, start: usize) -> Expr {
        Expr::Binary {
            op: op.to_string(),
            left: Box::new(left),
            right: Box::new(right),
            range: self.range_from(start),
        }
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let start = self.start();
        let mut left = self.parse_and()?;
        while self.eat_kw("OR") {
            let right = self.parse_and()?;
            left = self.binary("OR", left, right, start);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let start = self.start();
        let mut left = self.parse_not()?;
        while self.eat_kw("AND") {
            let right = self.parse_not()?;
            left = self.binary("AND", left, right, start);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> PResult<Expr> {
        let start = self.start();
        if self.eat_kw("NOT") {
            let expr = self.parse_prefix_operand(Self::parse_not)?;
            return Ok(Expr::Unary {
                op: "NOT".to_string(),
                expr: Box::new(expr),
                range: self.range_from(start),
            });
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> PResult<Expr> {
        let start = self.start();
        let mut left = self.parse_additive()?;

        loop {
            if self.at_kw("IS") {
                self.advance();
                let negated = self.eat_kw("NOT");
                if self.eat_kw("DISTINCT") {
                    self.expect_kw("FROM")?;
                    let right = self.parse_additive()?;
                    left = self.binary("IS DISTINCT FROM", left, right, start);
                    continue;
                }
                if !(self.eat_kw("NULL")
                    || self.eat_kw("TRUE")
                    || self.eat_kw("FALSE")
                    || self.eat_kw("UNKNOWN"))
                {
                    return Err(self.error_here("NULL"));
                }
                left = Expr::IsNull {
                    expr: Box::new(left),
                    negated,
                    range: self.range_from(start),
                };
                continue;
            }

            let negated = self.at_kw("NOT")
                && (self.at_kw_nth(1, "IN")
                    || self.at_kw_nth(1, "BETWEEN")
                    || self.at_kw_nth(1, "LIKE")
                    || self.at_kw_nth(1, "SIMILAR"));
            if negated {
                self.advance();
            }

            if self.eat_kw("IN") {
                if !self.at(TokenKind::LParen) {
                    // `POSITION(a IN b)`
                    let right = self.parse_additive()?;
                    left = self.binary("IN", left, right, start);
                    continue;
                }
                self.advance();
                if self.at_kw("SELECT") || self.at_kw("WITH") {
                    let subquery = self.parse_query()?;
                    self.expect(TokenKind::RParen)?;
                    left = Expr::InSubquery {
                        expr: Box::new(left),
                        subquery: Box::new(subquery),
                        negated,
                        range: self.range_from(start),
                    };
                } else {
                    let list = self.parse_expr_list(TokenKind::RParen)?;
                    self.expect(TokenKind::RParen)?;
                    left = Expr::InList {
                        expr: Box::new(left),
                        list,
                        negated,
                        range: self.range_from(start),
                    };
                }
                continue;
            }

            if self.eat_kw("BETWEEN") {
                if !self.eat_kw("SYMMETRIC") {
                    self.eat_kw("ASYMMETRIC");
                }
                let low = self.parse_additive()?;
                self.expect_kw("AND")?;
                let high = self.parse_additive()?;
                left = Expr::Between {
                    expr: Box::new(left),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                    range: self.range_from(start),
                };
                continue;
            }

            if self.at_kw("LIKE") || self.at_kw("SIMILAR") {
                if self.eat_kw("SIMILAR") {
                    self.expect_kw("TO")?;
                } else {
                    self.advance();
                }
                let pattern = self.parse_additive()?;
                left = self.binary("LIKE", left, pattern, start);
                if self.eat_kw("ESCAPE") {
                    self.expect(TokenKind::String)?;
                }
                continue;
            }

            if negated {
                return Err(self.error_here("IN, BETWEEN or LIKE"));
            }

            if self.kind().is_comparison() {
                let op = self.advance();
                let right = self.parse_additive()?;
                left = self.binary(op.text(self.source), left, right, start);
                continue;
            }

            break;
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let start = self.start();
        let mut left = self.parse_multiplicative()?;
        while matches!(
            self.kind(),
            TokenKind::Plus | TokenKind::Minus | TokenKind::Concat
        ) {
            let op = self.advance();
            let right = self.parse_multiplicative()?;
            left = self.binary(op.text(self.source), left, right, start);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let start = self.start();
        let mut left = self.parse_unary()?;
        while matches!(
            self.kind(),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent
        ) {
            let op = self.advance();
            let right = self.parse_unary()?;
            left = self.binary(op.text(self.source), left, right, start);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let start = self.start();
        if matches!(self.kind(), TokenKind::Minus | TokenKind::Plus) {
            let op = self.advance();
            let expr = self.parse_prefix_operand(Self::parse_unary)?;
            return Ok(Expr::Unary {
                op: op.text(self.source).to_string(),
                expr: Box::new(expr),
                range: self.range_from(start),
            });
        }

        let mut expr = self.parse_primary()?;
        while self.at(TokenKind::LBracket) {
            self.advance();
            let index = self.parse_expr()?;
            self.expect(TokenKind::RBracket)?;
            expr = Expr::Index {
                base: Box::new(expr),
                index: Box::new(index),
                range: self.range_from(start),
            };
        }
        Ok(expr)
    }

    fn literal(&mut self, start: usize) -> Expr {
        Expr::Literal {
            range: self.range_from(start),
        }
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let start = self.start();

        match self.kind() {
            TokenKind::Number | TokenKind::String | TokenKind::Placeholder => {
                self.advance();
                return Ok(self.literal(start));
            }
            TokenKind::LParen => {
                self.advance();
                if self.at_kw("SELECT") || self.at_kw("WITH") {
                    let query = self.parse_query()?;
                    self.expect(TokenKind::RParen)?;
                    return Ok(Expr::Subquery {
                        query: Box::new(query),
                        range: self.range_from(start),
                    });
                }
                let mut items = self.parse_expr_list(TokenKind::RParen)?;
                self.expect(TokenKind::RParen)?;
                if items.len() == 1 {
                    if let Some(inner) = items.pop() {
                        return Ok(inner);
                    }
                }
                return Ok(Expr::Constructor {
                    items,
                    range: self.range_from(start),
                });
            }
            TokenKind::QuotedIdent => return self.parse_column_ref(),
            TokenKind::Word => {}
            _ => return Err(self.error_here("expression")),
        }

        let word = self.peek().text(self.source).to_ascii_uppercase();
        match word.as_str() {
            "TRUE" | "FALSE" | "NULL" | "UNKNOWN" => {
                self.advance();
                return Ok(self.literal(start));
            }
            "INTERVAL" => return self.parse_interval(),
            "DATE" | "TIME" | "TIMESTAMP" if self.kind_nth(1) == TokenKind::String => {
                self.advance();
                self.advance();
                return Ok(self.literal(start));
            }
            "CAST" | "TRY_CAST" if self.kind_nth(1) == TokenKind::LParen => {
                self.advance();
                self.advance();
                let expr = self.parse_expr()?;
                self.expect_kw("AS")?;
                let data_type = self.parse_data_type()?;
                self.expect(TokenKind::RParen)?;
                return Ok(Expr::Cast {
                    expr: Box::new(expr),
                    data_type,
                    range: self.range_from(start),
                });
            }
            "CASE" => return self.parse_case(),
            "EXISTS" if self.kind_nth(1) == TokenKind::LParen => {
                self.advance();
                self.advance();
                let subquery = self.parse_query()?;
                self.expect(TokenKind::RParen)?;
                return Ok(Expr::Exists {
                    subquery: Box::new(subquery),
                    negated: false,
                    range: self.range_from(start),
                });
            }
            "ARRAY" | "MAP" if self.kind_nth(1) == TokenKind::LBracket => {
                self.advance();
                self.advance();
                let items = self.parse_expr_list(TokenKind::RBracket)?;
                self.expect(TokenKind::RBracket)?;
                return Ok(Expr::Constructor {
                    items,
                    range: self.range_from(start),
                });
            }
            "ARRAY" | "ROW" if self.kind_nth(1) == TokenKind::LParen => {
                self.advance();
                self.advance();
                if self.at_kw("SELECT") {
                    let query = self.parse_query()?;
                    self.expect(TokenKind::RParen)?;
                    return Ok(Expr::Subquery {
                        query: Box::new(query),
                        range: self.range_from(start),
                    });
                }
                let items = self.parse_expr_list(TokenKind::RParen)?;
                self.expect(TokenKind::RParen)?;
                return Ok(Expr::Constructor {
                    items,
                    range: self.range_from(start),
                });
            }
            _ => {}
        }

        if self.kind_nth(1) == TokenKind::LParen {
            return self.parse_function_call();
        }

        if is_niladic_function(&word) {
            self.advance();
            return Ok(self.literal(start));
        }

        if self.at_ident() {
            return self.parse_column_ref();
        }

        Err(self.error_here("expression"))
    }

    fn parse_interval(&mut self) -> PResult<Expr> {
        let start = self.start();
        self.expect_kw("INTERVAL")?;
        if matches!(self.kind(), TokenKind::Minus | TokenKind::Plus) {
            self.advance();
        }
        match self.kind() {
            TokenKind::String | TokenKind::Number => {
                self.advance();
            }
            _ => {
                self.parse_primary()?;
            }
        }

        let mut saw_unit = false;
        while self.word_at(0).is_some_and(is_time_unit) {
            self.advance();
            saw_unit = true;
            if self.at(TokenKind::LParen) {
                self.skip_balanced(TokenKind::LParen, TokenKind::RParen)?;
            }
            if !self.eat_kw("TO") {
                break;
            }
        }
        if !saw_unit {
            return Err(self.error_here("interval unit"));
        }

        Ok(self.literal(start))
    }

    fn parse_case(&mut self) -> PResult<Expr> {
        let start = self.start();
        self.expect_kw("CASE")?;
        let operand = if self.at_kw("WHEN") {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };

        let mut branches = Vec::new();
        while self.eat_kw("WHEN") {
            let condition = self.parse_expr()?;
            self.expect_kw("THEN")?;
            let result = self.parse_expr()?;
            branches.push((condition, result));
        }
        if branches.is_empty() {
            return Err(self.error_here("WHEN"));
        }

        let else_result = if self.eat_kw("ELSE") {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_kw("END")?;

        Ok(Expr::Case {
            operand,
            branches,
            else_result,
            range: self.range_from(start),
        })
    }

    /// Function names may be reserved words (`LEFT(s, 2)`, `TIMESTAMP(...)`)
    fn parse_function_name(&mut self) -> PResult<Ident> {
        if matches!(self.kind(), TokenKind::Word | TokenKind::QuotedIdent) {
            let token = self.advance();
            Ok(self.ident_from(&token))
        } else {
            Err(self.error_here("function name"))
        }
    }

    fn parse_function_call(&mut self) -> PResult<Expr> {
        let start = self.start();
        let name = self.parse_function_name()?;
        let upper = name.text.to_ascii_uppercase();
        let accepts_units = TIME_UNIT_FUNCTIONS.contains(&upper.as_str());
        self.expect(TokenKind::LParen)?;

        let distinct = self.eat_kw("DISTINCT");
        if !distinct {
            self.eat_kw("ALL");
        }
        let wildcard = self.eat(TokenKind::Star);
        if upper == "TRIM" && (self.at_kw("BOTH") || self.at_kw("LEADING") || self.at_kw("TRAILING"))
        {
            self.advance();
        }

        let mut args = Vec::new();
        if !wildcard && !self.at(TokenKind::RParen) {
            loop {
                if self.at(TokenKind::RParen) {
                    break;
                }
                let arg_start = self.start();
                if accepts_units && self.word_at(0).is_some_and(is_time_unit) {
                    self.advance();
                    args.push(self.literal(arg_start));
                } else {
                    args.push(self.parse_expr()?);
                }
                if !(self.eat(TokenKind::Comma)
                    || self.eat_kw("FROM")
                    || self.eat_kw("FOR")
                    || self.eat_kw("TO"))
                {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        if self.at_kw("FILTER") && self.kind_nth(1) == TokenKind::LParen {
            self.advance();
            self.advance();
            self.expect_kw("WHERE")?;
            args.push(self.parse_expr()?);
            self.expect(TokenKind::RParen)?;
        }

        let over = if self.eat_kw("OVER") {
            if self.at(TokenKind::LParen) {
                Some(self.parse_window_spec()?)
            } else {
                self.parse_ident()?;
                None
            }
        } else {
            None
        };

        Ok(Expr::Function {
            name,
            args,
            distinct,
            wildcard,
            over,
            range: self.range_from(start),
        })
    }

    fn parse_window_spec(&mut self) -> PResult<WindowSpec> {
        let start = self.start();
        self.expect(TokenKind::LParen)?;

        let mut partition_by = Vec::new();
        if self.at_kw("PARTITION") && self.at_kw_nth(1, "BY") {
            self.advance();
            self.advance();
            partition_by = self.parse_expr_list(TokenKind::RParen)?;
        }

        let mut order_by = Vec::new();
        if self.at_kw("ORDER") && self.at_kw_nth(1, "BY") {
            self.advance();
            self.advance();
            order_by = self.parse_order_by_list()?;
        }

        // Frame clause carries no names
        let mut depth = 0usize;
        loop {
            match self.kind() {
                TokenKind::Eof => return Err(self.error_here("')'")),
                TokenKind::LParen => depth += 1,
                TokenKind::RParen if depth == 0 => break,
                TokenKind::RParen => depth -= 1,
                _ => {}
            }
            self.advance();
        }
        self.expect(TokenKind::RParen)?;

        Ok(WindowSpec {
            partition_by,
            order_by,
            range: self.range_from(start),
        })
    }

    fn parse_column_ref(&mut self) -> PResult<Expr> {
        let start = self.start();
        let mut parts = vec![self.parse_ident()?];
        let mut dangling_dot = None;

        while self.at(TokenKind::Dot) {
            if self.at_ident_nth(1) {
                self.advance();
                parts.push(self.parse_ident()?);
            } else {
                let dot = self.advance();
                dangling_dot = Some(self.token_range(&dot));
                break;
            }
        }

        Ok(Expr::Column(ColumnRef {
            parts,
            dangling_dot,
            range: self.range_from(start),
        }))
    }
}
