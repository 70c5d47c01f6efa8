// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Lexer
//!
//! Turns Flink SQL text into a flat token stream. Keywords are not separate
//! token kinds: every bare word is a [`TokenKind::Word`] and the parser
//! classifies it case-insensitively, which keeps non-reserved keywords
//! (`WATERMARK`, `METADATA`, ...) usable as identifiers.

use logos::Logos;
use std::ops::Range as Span;

/// Token kinds produced by the lexer
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"--[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum TokenKind {
    /// Bare word: identifier or keyword
    #[regex(r"[A-Za-z_][A-Za-z0-9_$]*")]
    Word,
    /// Backtick-quoted identifier
    #[regex(r"`([^`]|``)*`")]
    QuotedIdent,
    /// Single-quoted string literal
    #[regex(r"'([^']|'')*'")]
    String,
    /// Numeric literal
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?")]
    Number,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,
    #[token("*")]
    Star,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("||")]
    Concat,
    #[token("=")]
    Eq,
    #[token("=>")]
    Arrow,
    #[token("<>")]
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("?")]
    Placeholder,

    /// Character sequence no rule matches (unterminated quotes, stray bytes)
    Error,
    /// End of input
    Eof,
}

impl TokenKind {
    /// Whether this token is a binary comparison operator
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::NotEq
                | TokenKind::Lt
                | TokenKind::LtEq
                | TokenKind::Gt
                | TokenKind::GtEq
        )
    }

    /// Short human-readable description used in error messages
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Word => "word",
            TokenKind::QuotedIdent => "quoted identifier",
            TokenKind::String => "string literal",
            TokenKind::Number => "number",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Comma => "','",
            TokenKind::Semicolon => "';'",
            TokenKind::Dot => "'.'",
            TokenKind::Star => "'*'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Concat => "'||'",
            TokenKind::Eq => "'='",
            TokenKind::Arrow => "'=>'",
            TokenKind::NotEq => "'<>'",
            TokenKind::Lt => "'<'",
            TokenKind::LtEq => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::GtEq => "'>='",
            TokenKind::Placeholder => "'?'",
            TokenKind::Error => "invalid token",
            TokenKind::Eof => "end of input",
        }
    }
}

/// A token with its byte span in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span<usize>,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span<usize>) -> Self {
        Self { kind, span }
    }

    /// Source text of this token
    pub fn text<'src>(&self, source: &'src str) -> &'src str {
        &source[self.span.clone()]
    }
}

/// Tokenize a source string.
///
/// The returned vector always ends with a single [`TokenKind::Eof`] token.
/// Unlexable input becomes [`TokenKind::Error`] tokens rather than aborting.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut lexer = TokenKind::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let kind = result.unwrap_or(TokenKind::Error);
        tokens.push(Token::new(kind, lexer.span()));
    }

    tokens.push(Token::new(TokenKind::Eof, source.len()..source.len()));
    tokens
}
