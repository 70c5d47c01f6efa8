// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Document Management
//!
//! This module provides document management for the LSP server.
//!
//! ## Overview
//!
//! The document manager handles:
//! - Multiple open documents
//! - Document synchronization (open, change, close)
//! - Text content management using Ropey for efficient edits
//! - Position conversion between the editor and the analyzer
//!
//! ## Positions
//!
//! Editors address characters in UTF-16 code units, the analyzer in Unicode
//! scalar values. [`Document::to_text_position`] and
//! [`Document::to_lsp_position`] convert between the two on the current
//! content. Only `\n` and `\r\n` end a line on either side.
//!
//! ## Example
//!
//! ```rust
//! use flink_sql_lsp::Document;
//! use tower_lsp::lsp_types::{Position, Url};
//!
//! let uri = Url::parse("file:///query.sql").unwrap();
//! let doc = Document::new(uri, "SELECT '€' AS e, x FROM t".to_string(), 1, "flinksql".to_string());
//!
//! // `€` is one code unit in UTF-16, so columns agree here
//! let position = doc.to_text_position(Position::new(0, 17)).unwrap();
//! assert_eq!(position.character, 17);
//! ```

use flink_sql_grammar as text;
use ropey::Rope;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_lsp::lsp_types::{
    Position, Range, TextDocumentContentChangeEvent, Url, VersionedTextDocumentIdentifier,
};

/// Document metadata
///
/// Contains information about an open document.
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    /// Document URI
    pub uri: Url,

    /// Language identifier (e.g., "sql", "flinksql")
    pub language_id: String,

    /// Document version
    /// Incremented on each change
    pub version: i32,

    /// Line count
    pub line_count: usize,
}

impl DocumentMetadata {
    /// Create new document metadata
    pub fn new(uri: Url, language_id: String, version: i32, line_count: usize) -> Self {
        Self {
            uri,
            language_id,
            version,
            line_count,
        }
    }
}

/// A document managed by the LSP server
///
/// Contains the document's content and metadata.
/// Uses Ropey for efficient text manipulation.
#[derive(Debug, Clone)]
pub struct Document {
    /// Document metadata
    metadata: DocumentMetadata,

    /// Document content as a rope for efficient editing
    content: Rope,
}

impl Document {
    /// Create a new document
    pub fn new(uri: Url, content: String, version: i32, language_id: String) -> Self {
        let rope = Rope::from_str(&content);
        let line_count = rope.len_lines();

        let metadata = DocumentMetadata::new(uri, language_id, version, line_count);

        Self {
            metadata,
            content: rope,
        }
    }

    /// Get the document URI
    pub fn uri(&self) -> &Url {
        &self.metadata.uri
    }

    /// Get the document language ID
    pub fn language_id(&self) -> &str {
        &self.metadata.language_id
    }

    /// Get the document version
    pub fn version(&self) -> i32 {
        self.metadata.version
    }

    /// Get the line count
    pub fn line_count(&self) -> usize {
        self.metadata.line_count
    }

    /// Get the full document content as a string
    pub fn get_content(&self) -> String {
        self.content.to_string()
    }

    /// Get a line of text without its line ending
    pub fn get_line(&self, line: usize) -> Option<String> {
        if line >= self.line_count() {
            return None;
        }

        let line_with_ending = self.content.line(line).to_string();
        Some(line_with_ending.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Get the text covered by an editor range
    pub fn get_text(&self, range: Range) -> Option<String> {
        let start = self.char_index(range.start)?;
        let end = self.char_index(range.end)?;
        if start > end {
            return None;
        }
        Some(self.content.slice(start..end).to_string())
    }

    /// Number of characters on `line`, line ending excluded
    fn line_len_chars(&self, line: usize) -> usize {
        let slice = self.content.line(line);
        let mut len = slice.len_chars();
        while len > 0 && matches!(slice.char(len - 1), '\n' | '\r') {
            len -= 1;
        }
        len
    }

    /// Convert an editor position into a character index in the rope
    ///
    /// # Returns
    ///
    /// `None` if the line does not exist or the column lies past its end
    pub fn char_index(&self, position: Position) -> Option<usize> {
        let line = position.line as usize;
        if line >= self.line_count() {
            return None;
        }

        let slice = self.content.line(line);
        let line_chars = self.line_len_chars(line);
        let column = position.character as usize;
        if column > slice.char_to_utf16_cu(line_chars) {
            return None;
        }

        Some(self.content.line_to_char(line) + slice.utf16_cu_to_char(column))
    }

    /// Convert an editor position into an analyzer position
    pub fn to_text_position(&self, position: Position) -> Option<text::Position> {
        let index = self.char_index(position)?;
        let line_start = self.content.line_to_char(position.line as usize);
        Some(text::Position::new(
            position.line,
            (index - line_start) as u32,
        ))
    }

    /// Convert an analyzer position into an editor position
    ///
    /// Columns past the end of the line clamp to the line end.
    pub fn to_lsp_position(&self, position: text::Position) -> Position {
        let line = (position.line as usize).min(self.line_count().saturating_sub(1));
        let slice = self.content.line(line);
        let column = (position.character as usize).min(self.line_len_chars(line));
        Position::new(line as u32, slice.char_to_utf16_cu(column) as u32)
    }

    /// Convert an analyzer range into an editor range
    pub fn to_lsp_range(&self, range: text::Range) -> Range {
        Range::new(
            self.to_lsp_position(range.start),
            self.to_lsp_position(range.end),
        )
    }

    /// Apply content changes to the document
    ///
    /// A change with a range replaces that range; `range_length` is ignored
    /// as the protocol deprecates it. A change without a range replaces the
    /// whole content.
    pub fn apply_changes(
        &mut self,
        changes: &[TextDocumentContentChangeEvent],
        new_version: i32,
    ) -> Result<(), DocumentError> {
        for change in changes {
            match &change.range {
                Some(range) => {
                    let invalid = || DocumentError::InvalidRange {
                        start: (range.start.line as usize, range.start.character as usize),
                        end: (range.end.line as usize, range.end.character as usize),
                    };
                    let start_char = self.char_index(range.start).ok_or_else(invalid)?;
                    let end_char = self.char_index(range.end).ok_or_else(invalid)?;
                    if start_char > end_char {
                        return Err(invalid());
                    }

                    self.content.remove(start_char..end_char);
                    self.content.insert(start_char, &change.text);
                }
                None => {
                    self.content = Rope::from_str(&change.text);
                }
            }
            self.metadata.line_count = self.content.len_lines();
        }

        self.metadata.version = new_version;
        Ok(())
    }

    /// Get document metadata
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }
}

/// Document store for managing multiple documents
///
/// Thread-safe store for all open documents.
#[derive(Debug, Default)]
pub struct DocumentStore {
    /// Map of document URI to document
    documents: Arc<RwLock<HashMap<Url, Document>>>,
}

impl DocumentStore {
    /// Create a new document store
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a document, replacing any document with the same URI
    pub async fn open_document(&self, uri: Url, content: String, version: i32, language_id: String) {
        let mut docs = self.documents.write().await;
        let document = Document::new(uri.clone(), content, version, language_id);
        docs.insert(uri, document);
    }

    /// Close a document
    ///
    /// # Returns
    ///
    /// true if the document was closed, false if it didn't exist
    pub async fn close_document(&self, uri: &Url) -> bool {
        let mut docs = self.documents.write().await;
        docs.remove(uri).is_some()
    }

    /// Apply content changes to an open document
    pub async fn update_document(
        &self,
        identifier: &VersionedTextDocumentIdentifier,
        changes: &[TextDocumentContentChangeEvent],
    ) -> Result<(), DocumentError> {
        let mut docs = self.documents.write().await;

        let document = docs
            .get_mut(&identifier.uri)
            .ok_or_else(|| DocumentError::DocumentNotFound(identifier.uri.clone()))?;

        document.apply_changes(changes, identifier.version)
    }

    /// Replace the whole content of an open document (save with text)
    pub async fn replace_content(&self, uri: &Url, content: String) -> Result<(), DocumentError> {
        let mut docs = self.documents.write().await;
        let document = docs
            .get_mut(uri)
            .ok_or_else(|| DocumentError::DocumentNotFound(uri.clone()))?;
        let version = document.version();
        document.apply_changes(
            &[TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: content,
            }],
            version,
        )
    }

    /// Snapshot of a document by URI
    pub async fn get_document(&self, uri: &Url) -> Option<Document> {
        let docs = self.documents.read().await;
        docs.get(uri).cloned()
    }

    /// Check if a document exists
    pub async fn has_document(&self, uri: &Url) -> bool {
        let docs = self.documents.read().await;
        docs.contains_key(uri)
    }

    /// Get all document URIs
    pub async fn list_uris(&self) -> Vec<Url> {
        let docs = self.documents.read().await;
        docs.keys().cloned().collect()
    }

    /// Get the number of open documents
    pub async fn document_count(&self) -> usize {
        let docs = self.documents.read().await;
        docs.len()
    }
}

/// Document-related errors
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(Url),

    /// Invalid range for text operation
    #[error("Invalid range: start={start:?}, end={end:?}")]
    InvalidRange {
        start: (usize, usize),
        end: (usize, usize),
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_uri() -> Url {
        Url::parse("file:///test.sql").unwrap()
    }

    fn document(content: &str) -> Document {
        Document::new(create_test_uri(), content.to_string(), 1, "flinksql".to_string())
    }

    fn change(start: (u32, u32), end: (u32, u32), text: &str) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range: Some(Range::new(
                Position::new(start.0, start.1),
                Position::new(end.0, end.1),
            )),
            range_length: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_document_new() {
        let uri = create_test_uri();
        let doc = Document::new(
            uri.clone(),
            "SELECT * FROM users".to_string(),
            1,
            "flinksql".to_string(),
        );

        assert_eq!(doc.uri(), &uri);
        assert_eq!(doc.language_id(), "flinksql");
        assert_eq!(doc.version(), 1);
        assert_eq!(doc.get_content(), "SELECT * FROM users");
    }

    #[test]
    fn test_document_get_line() {
        let doc = document("SELECT *\r\nFROM users\nWHERE id = 1");

        assert_eq!(doc.get_line(0), Some("SELECT *".to_string()));
        assert_eq!(doc.get_line(1), Some("FROM users".to_string()));
        assert_eq!(doc.get_line(2), Some("WHERE id = 1".to_string()));
        assert_eq!(doc.get_line(3), None);
    }

    #[test]
    fn test_document_get_text() {
        let doc = document("SELECT *\nFROM users");

        assert_eq!(
            doc.get_text(Range::new(Position::new(0, 7), Position::new(0, 8))),
            Some("*".to_string())
        );
        assert_eq!(
            doc.get_text(Range::new(Position::new(1, 0), Position::new(1, 4))),
            Some("FROM".to_string())
        );
        assert_eq!(
            doc.get_text(Range::new(Position::new(1, 0), Position::new(1, 40))),
            None
        );
    }

    #[test]
    fn test_position_conversion_with_surrogate_pairs() {
        // '😀' is two UTF-16 code units but one character
        let doc = document("SELECT '😀', x FROM t");

        let position = doc.to_text_position(Position::new(0, 13)).unwrap();
        assert_eq!(position, text::Position::new(0, 12));
        assert_eq!(doc.to_lsp_position(position), Position::new(0, 13));
    }

    #[test]
    fn test_lsp_position_clamps_to_line_end() {
        let doc = document("SELECT x\nFROM t");

        assert_eq!(
            doc.to_lsp_position(text::Position::new(0, 99)),
            Position::new(0, 8)
        );
        assert_eq!(doc.to_text_position(Position::new(0, 9)), None);
        assert_eq!(doc.to_text_position(Position::new(5, 0)), None);
    }

    #[test]
    fn test_document_apply_changes_full() {
        let mut doc = document("old content");
        let changes = vec![TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "new content".to_string(),
        }];

        doc.apply_changes(&changes, 2).unwrap();

        assert_eq!(doc.get_content(), "new content");
        assert_eq!(doc.version(), 2);
    }

    #[test]
    fn test_document_apply_changes_incremental() {
        let mut doc = document("SELECT * FROM users");

        doc.apply_changes(&[change((0, 7), (0, 8), "id")], 2).unwrap();

        assert_eq!(doc.get_content(), "SELECT id FROM users");
        assert_eq!(doc.version(), 2);
    }

    #[test]
    fn test_document_apply_changes_in_sequence() {
        let mut doc = document("SELECT a\nFROM t");

        doc.apply_changes(
            &[
                change((1, 6), (1, 6), " AS x"),
                change((0, 7), (0, 8), "x.a"),
                change((1, 0), (1, 0), "\n"),
            ],
            3,
        )
        .unwrap();

        assert_eq!(doc.get_content(), "SELECT x.a\n\nFROM t AS x");
        assert_eq!(doc.line_count(), 3);
    }

    #[test]
    fn test_document_apply_changes_invalid_range() {
        let mut doc = document("SELECT *");

        let result = doc.apply_changes(&[change((0, 0), (10, 0), "x")], 2);

        assert!(matches!(result, Err(DocumentError::InvalidRange { .. })));
        assert_eq!(doc.get_content(), "SELECT *");
    }

    #[tokio::test]
    async fn test_document_store_open() {
        let store = DocumentStore::new();
        let uri = create_test_uri();

        store
            .open_document(uri.clone(), "SELECT *".to_string(), 1, "sql".to_string())
            .await;

        assert!(store.has_document(&uri).await);
        assert_eq!(store.document_count().await, 1);
    }

    #[tokio::test]
    async fn test_document_store_close() {
        let store = DocumentStore::new();
        let uri = create_test_uri();

        store
            .open_document(uri.clone(), "SELECT *".to_string(), 1, "sql".to_string())
            .await;

        assert!(store.close_document(&uri).await);
        assert!(!store.has_document(&uri).await);
        assert!(!store.close_document(&uri).await);
    }

    #[tokio::test]
    async fn test_document_store_update() {
        let store = DocumentStore::new();
        let uri = create_test_uri();

        store
            .open_document(uri.clone(), "SELECT * FROM t".to_string(), 1, "sql".to_string())
            .await;

        let identifier = VersionedTextDocumentIdentifier {
            uri: uri.clone(),
            version: 2,
        };
        store
            .update_document(&identifier, &[change((0, 7), (0, 8), "a")])
            .await
            .unwrap();

        let doc = store.get_document(&uri).await.unwrap();
        assert_eq!(doc.get_content(), "SELECT a FROM t");
        assert_eq!(doc.version(), 2);
    }

    #[tokio::test]
    async fn test_document_store_update_missing() {
        let store = DocumentStore::new();
        let identifier = VersionedTextDocumentIdentifier {
            uri: create_test_uri(),
            version: 2,
        };

        let result = store.update_document(&identifier, &[]).await;
        assert!(matches!(result, Err(DocumentError::DocumentNotFound(_))));
    }

    #[tokio::test]
    async fn test_document_store_replace_content() {
        let store = DocumentStore::new();
        let uri = create_test_uri();
        store
            .open_document(uri.clone(), "SELECT 1".to_string(), 4, "sql".to_string())
            .await;

        store
            .replace_content(&uri, "SELECT 2".to_string())
            .await
            .unwrap();

        let doc = store.get_document(&uri).await.unwrap();
        assert_eq!(doc.get_content(), "SELECT 2");
        assert_eq!(doc.version(), 4);
    }
}
