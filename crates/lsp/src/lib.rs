// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Flink SQL LSP - Language Server Protocol
//!
//! This crate provides the LSP server for Flink SQL scripts.
//!
//! ## Overview
//!
//! The LSP server provides:
//! - Diagnostics for syntax errors, duplicate declarations and unresolved or
//!   ambiguous references
//! - Find references for aliases, CTEs, declared tables, views and columns
//! - Scope-aware rename with conflict detection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Client (VS Code, etc.)          │
//! └──────────────┬──────────────────────────┘
//!                │ LSP Protocol
//!                ↓
//! ┌─────────────────────────────────────────┐
//! │         LSP Backend (tower-lsp)         │
//! ├─────────────────────────────────────────┤
//! │  • did_open / did_change / did_save     │
//! │  • references / prepareRename / rename  │
//! └──────────────┬──────────────────────────┘
//!                │
//!         ┌──────┴──────┬────────────────┐
//!         ↓             ↓                ↓
//! ┌────────────┐ ┌──────────┐  ┌──────────────────┐
//! │   Config   │ │ Document │  │ flink-sql-lsp-   │
//! │   Engine   │ │   Store  │  │ semantic (core)  │
//! └────────────┘ └──────────┘  └──────────────────┘
//! ```
//!
//! Every request analyzes a snapshot of the document text; the server keeps
//! no symbol tables between requests.
//!
//! ## Usage
//!
//! ### Starting the Server
//!
//! ```rust,no_run
//! use flink_sql_lsp::LspBackend;
//! use tower_lsp::{LspService, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let stdin = tokio::io::stdin();
//!     let stdout = tokio::io::stdout();
//!
//!     let (service, socket) = LspService::new(LspBackend::new);
//!     Server::new(stdin, stdout, socket).serve(service).await;
//! }
//! ```
//!
//! ### Configuration
//!
//! The server can be configured through:
//!
//! 1. **Client Settings**
//! ```json
//! {
//!   "flinkSqlLsp": {
//!     "diagnostics": { "enabled": true, "onChange": true, "maxProblems": 50 },
//!     "logLevel": "info"
//!   }
//! }
//! ```
//!
//! 2. **Configuration File** (`flink-sql-lsp.yaml` in the workspace root)
//! ```yaml
//! diagnostics:
//!   onChange: true
//! logLevel: flink_sql_lsp=debug
//! ```
//!
//! ### Document Lifecycle
//!
//! ```rust
//! use flink_sql_lsp::DocumentStore;
//! use tower_lsp::lsp_types::Url;
//!
//! tokio_test::block_on(async {
//!     let store = DocumentStore::new();
//!     let uri = Url::parse("file:///query.sql").unwrap();
//!
//!     store
//!         .open_document(uri.clone(), "SELECT 1".to_string(), 1, "flinksql".to_string())
//!         .await;
//!     assert!(store.has_document(&uri).await);
//! });
//! ```
//!
//! ## Modules
//!
//! - [`backend`]: Main LSP server implementation
//! - [`document`]: Document management and position conversion
//! - [`config`]: Engine configuration and validation
//! - [`diagnostic`]: Diagnostic conversion and publishing
//! - [`references`], [`rename`]: Request handlers
//!
//! ## Error Handling
//!
//! The LSP server uses graceful degradation:
//! - Invalid configuration → keep the previous one, log an error
//! - Parse errors → analyze what parsed, report the errors as diagnostics
//! - Failed references → no result, log the reason
//! - Failed rename → `InvalidParams` error, no edits applied

pub mod backend;
pub mod config;
pub mod diagnostic;
pub mod document;
pub mod references;
pub mod rename;

// Re-exports for convenience
pub use backend::{LogLevelHook, LspBackend, LspError};
pub use config::{ConfigError, DiagnosticsConfig, EngineConfig};
pub use diagnostic::{DiagnosticCode, DiagnosticsFeature, SqlDiagnostic};
pub use document::{Document, DocumentError, DocumentMetadata, DocumentStore};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name
pub const SERVER_NAME: &str = "flink-sql-lsp";
