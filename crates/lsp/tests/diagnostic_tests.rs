// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Integration tests for diagnostics
//!
//! These tests verify that:
//! - Clean Flink SQL documents produce no diagnostics
//! - Each problem kind maps to its code and severity
//! - Ranges are reported in UTF-16 units
//! - The problem cap is honored

use flink_sql_lsp::{DiagnosticCode, DiagnosticsConfig, DiagnosticsFeature, Document, SqlDiagnostic};
use flink_sql_lsp_test_utils::SqlFixtures;
use tower_lsp::lsp_types::*;

fn create_test_document(content: &str) -> Document {
    let uri = Url::parse("file:///test.sql").unwrap();
    Document::new(uri, content.to_string(), 1, "flinksql".to_string())
}

fn collect(content: &str) -> Vec<SqlDiagnostic> {
    DiagnosticsFeature::new(&DiagnosticsConfig::default()).collect(&create_test_document(content))
}

fn codes(diagnostics: &[SqlDiagnostic]) -> Vec<String> {
    diagnostics
        .iter()
        .filter_map(|d| d.code.as_ref().map(|c| c.as_str()))
        .collect()
}

#[test]
fn test_clean_fixtures_have_no_diagnostics() {
    let documents = [
        SqlFixtures::simple_alias(),
        SqlFixtures::select_with_clauses(),
        SqlFixtures::inner_join(),
        SqlFixtures::nested_derived(),
        SqlFixtures::with_cte(),
        SqlFixtures::create_table_with_watermark(),
        SqlFixtures::create_view(),
        SqlFixtures::window_tvf(),
        SqlFixtures::temporal_join(),
        SqlFixtures::insert_pipeline(),
    ];

    for document in documents {
        let diagnostics = collect(document);
        assert!(diagnostics.is_empty(), "{}: {:?}", document, diagnostics);
    }
}

#[test]
fn test_problem_fixtures() {
    let unknown = collect(SqlFixtures::unknown_qualifier());
    assert_eq!(codes(&unknown), vec!["SEMANTIC-002"]);
    assert_eq!(unknown[0].severity, DiagnosticSeverity::ERROR);

    let dangling = collect(SqlFixtures::dangling_as());
    assert!(codes(&dangling).contains(&"SYNTAX-002".to_string()));
    assert!(
        dangling
            .iter()
            .filter(|d| d.code == Some(DiagnosticCode::MalformedConstruct))
            .all(|d| d.severity == DiagnosticSeverity::WARNING)
    );

    let duplicate = collect(SqlFixtures::duplicate_alias());
    assert_eq!(codes(&duplicate), vec!["SEMANTIC-001"]);
}

#[test]
fn test_unterminated_paren_reports_syntax_error() {
    let diagnostics = collect("SELECT a FROM (SELECT b FROM t");
    assert!(
        diagnostics
            .iter()
            .any(|d| d.code == Some(DiagnosticCode::SyntaxError)
                && d.severity == DiagnosticSeverity::ERROR)
    );

    let starts: Vec<Position> = diagnostics.iter().map(|d| d.range.start).collect();
    let mut sorted = starts.clone();
    sorted.sort_by_key(|p| (p.line, p.character));
    assert_eq!(starts, sorted);
}

#[test]
fn test_ranges_use_utf16_columns() {
    let diagnostics = collect("SELECT '😀', b.x FROM t AS a");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].range,
        Range::new(Position::new(0, 13), Position::new(0, 14))
    );
}

#[test]
fn test_lsp_conversion() {
    let diagnostics = collect(SqlFixtures::unknown_qualifier());
    let lsp = diagnostics[0].clone().to_lsp();

    assert_eq!(lsp.source.as_deref(), Some("flink-sql-lsp"));
    assert_eq!(lsp.code, Some(NumberOrString::String("SEMANTIC-002".to_string())));
    assert!(lsp.message.contains("'b'"));
}

#[test]
fn test_max_problems() {
    let feature = DiagnosticsFeature::new(&DiagnosticsConfig {
        max_problems: 1,
        ..Default::default()
    });
    let document = create_test_document("SELECT b.x, c.y FROM t AS a");

    let diagnostics = feature.collect(&document);
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(diagnostics[0].code, Some(DiagnosticCode::UnresolvedReference));
    assert_eq!(diagnostics[1].severity, DiagnosticSeverity::INFORMATION);
}
