// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Document store integration tests
//!
//! Edits arrive as full or ranged changes and must leave the store with the
//! text the editor has, so later analysis sees the same document.

use flink_sql_lsp::{DocumentError, DocumentStore};
use flink_sql_lsp_test_utils::SqlFixtures;
use std::sync::Arc;
use tower_lsp::lsp_types::*;

fn create_test_uri(path: &str) -> Url {
    Url::parse(&format!("file://{}", path)).unwrap()
}

fn ranged_change(start: (u32, u32), end: (u32, u32), text: &str) -> TextDocumentContentChangeEvent {
    TextDocumentContentChangeEvent {
        range: Some(Range::new(
            Position::new(start.0, start.1),
            Position::new(end.0, end.1),
        )),
        range_length: None,
        text: text.to_string(),
    }
}

#[tokio::test]
async fn test_open_change_save_close() {
    let store = DocumentStore::new();
    let uri = create_test_uri("/pipeline.sql");

    store
        .open_document(
            uri.clone(),
            SqlFixtures::simple_alias().to_string(),
            1,
            "flinksql".to_string(),
        )
        .await;

    let identifier = VersionedTextDocumentIdentifier::new(uri.clone(), 2);
    store
        .update_document(&identifier, &[ranged_change((0, 21), (0, 22), "src")])
        .await
        .unwrap();

    let document = store.get_document(&uri).await.unwrap();
    assert_eq!(document.get_content(), "SELECT a.x FROM t AS src");
    assert_eq!(document.version(), 2);

    store
        .replace_content(&uri, "SELECT 1".to_string())
        .await
        .unwrap();
    let document = store.get_document(&uri).await.unwrap();
    assert_eq!(document.get_content(), "SELECT 1");
    assert_eq!(document.version(), 2);

    assert!(store.close_document(&uri).await);
    assert!(!store.has_document(&uri).await);
    assert!(!store.close_document(&uri).await);
}

#[tokio::test]
async fn test_multiline_edit_updates_line_count() {
    let store = DocumentStore::new();
    let uri = create_test_uri("/window.sql");
    store
        .open_document(
            uri.clone(),
            SqlFixtures::window_tvf().to_string(),
            1,
            "flinksql".to_string(),
        )
        .await;
    assert_eq!(store.get_document(&uri).await.unwrap().line_count(), 4);

    // Collapse the TVF call onto the FROM line
    let identifier = VersionedTextDocumentIdentifier::new(uri.clone(), 2);
    store
        .update_document(&identifier, &[ranged_change((1, 11), (2, 2), "")])
        .await
        .unwrap();

    let document = store.get_document(&uri).await.unwrap();
    assert_eq!(document.line_count(), 3);
    assert_eq!(
        document.get_line(1).unwrap(),
        "FROM TABLE(TUMBLE(TABLE bids, DESCRIPTOR(bidtime), INTERVAL '10' MINUTE))"
    );
}

#[tokio::test]
async fn test_invalid_change_is_rejected() {
    let store = DocumentStore::new();
    let uri = create_test_uri("/invalid.sql");
    store
        .open_document(uri.clone(), "SELECT 1".to_string(), 1, "flinksql".to_string())
        .await;

    let identifier = VersionedTextDocumentIdentifier::new(uri.clone(), 2);
    let result = store
        .update_document(&identifier, &[ranged_change((3, 0), (3, 1), "x")])
        .await;
    assert!(matches!(result, Err(DocumentError::InvalidRange { .. })));

    let missing = VersionedTextDocumentIdentifier::new(create_test_uri("/missing.sql"), 1);
    let result = store.update_document(&missing, &[]).await;
    assert!(matches!(result, Err(DocumentError::DocumentNotFound(_))));
}

#[tokio::test]
async fn test_concurrent_documents() {
    let store = Arc::new(DocumentStore::new());
    let mut handles = Vec::new();

    for i in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let uri = create_test_uri(&format!("/doc_{}.sql", i));
            store
                .open_document(
                    uri.clone(),
                    format!("SELECT a.x FROM t_{} AS a", i),
                    1,
                    "flinksql".to_string(),
                )
                .await;
            store.get_document(&uri).await.unwrap().get_content()
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let content = handle.await.unwrap();
        assert_eq!(content, format!("SELECT a.x FROM t_{} AS a", i));
    }
    assert_eq!(store.document_count().await, 8);
}
