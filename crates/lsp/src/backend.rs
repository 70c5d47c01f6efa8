// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # LSP Backend Implementation
//!
//! This module provides the main LSP server backend using tower-lsp.
//!
//! ## Overview
//!
//! The backend handles:
//! - LSP protocol communication via tower-lsp
//! - Document lifecycle (open, change, save, close)
//! - Engine configuration from initialization options, the workspace file and
//!   `workspace/didChangeConfiguration`
//!
//! ## Architecture
//!
//! ```text
//! Client → LSP Backend → Document Store
//!                ↓
//!           Engine Config → DiagnosticsFeature
//!                ↓
//!           references / rename (per-request analysis)
//! ```
//!
//! ## Supported LSP Features
//!
//! - textDocument/didOpen, didChange, didSave, didClose
//! - textDocument/publishDiagnostics
//! - textDocument/references
//! - textDocument/prepareRename, textDocument/rename
//! - workspace/didChangeConfiguration

use crate::config::{ConfigError, EngineConfig};
use crate::diagnostic::DiagnosticsFeature;
use crate::document::{Document, DocumentError, DocumentStore};
use crate::{references, rename};
use flink_sql_lsp_semantic::QueryError;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, error, info, warn};

/// Callback that applies a log filter directive at runtime
pub type LogLevelHook = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// LSP backend implementation
///
/// Main entry point for all LSP protocol operations.
/// Uses tower-lsp framework for protocol handling.
pub struct LspBackend {
    /// LSP client for sending notifications and requests
    client: Client,

    /// Document store for managing open documents
    documents: Arc<DocumentStore>,

    /// Engine configuration
    config: Arc<RwLock<EngineConfig>>,

    /// Present while diagnostics are enabled
    diagnostics: Arc<RwLock<Option<DiagnosticsFeature>>>,

    /// Applies `logLevel` to the installed subscriber
    log_level_hook: Option<LogLevelHook>,
}

impl LspBackend {
    /// Create a new LSP backend
    ///
    /// # Arguments
    ///
    /// - `client`: LSP client handle
    pub fn new(client: Client) -> Self {
        let config = EngineConfig::default();
        let diagnostics = DiagnosticsFeature::new(&config.diagnostics);

        Self {
            client,
            documents: Arc::new(DocumentStore::new()),
            config: Arc::new(RwLock::new(config)),
            diagnostics: Arc::new(RwLock::new(Some(diagnostics))),
            log_level_hook: None,
        }
    }

    /// Install the callback used to apply `logLevel`
    pub fn with_log_level_hook(mut self, hook: LogLevelHook) -> Self {
        self.log_level_hook = Some(hook);
        self
    }

    /// Get the document store
    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// Get the engine configuration
    pub async fn get_config(&self) -> EngineConfig {
        self.config.read().await.clone()
    }

    /// Apply a new engine configuration
    ///
    /// Enabling diagnostics creates the diagnostics feature and publishes for
    /// every open document; disabling tears it down, clearing everything it
    /// published.
    pub async fn set_config(&self, config: EngineConfig) {
        info!(
            "Engine configuration updated: diagnostics={}, onChange={}, maxProblems={}",
            config.diagnostics.enabled, config.diagnostics.on_change, config.diagnostics.max_problems
        );

        if let Some(level) = &config.log_level {
            self.apply_log_level(level).await;
        }

        let enable = config.diagnostics.enabled;
        let created = {
            let mut feature = self.diagnostics.write().await;
            match (feature.is_some(), enable) {
                (true, true) => {
                    if let Some(feature) = feature.as_mut() {
                        feature.set_max_problems(config.diagnostics.max_problems);
                    }
                    false
                }
                (false, true) => {
                    *feature = Some(DiagnosticsFeature::new(&config.diagnostics));
                    true
                }
                (true, false) => {
                    if let Some(old) = feature.take() {
                        old.teardown(&self.client).await;
                    }
                    false
                }
                (false, false) => false,
            }
        };

        *self.config.write().await = config;

        if created {
            for uri in self.documents.list_uris().await {
                self.publish_diagnostics(&uri).await;
            }
        }
    }

    async fn apply_log_level(&self, level: &str) {
        let Some(hook) = &self.log_level_hook else {
            debug!("No log level hook installed, ignoring logLevel={}", level);
            return;
        };

        match hook(level) {
            Ok(()) => info!("Log level set to {}", level),
            Err(e) => {
                warn!("Failed to apply log level {}: {}", level, e);
                self.log_message(
                    &format!("Failed to apply log level '{}': {}", level, e),
                    MessageType::WARNING,
                )
                .await;
            }
        }
    }

    /// Load the workspace configuration file, then let initialization
    /// options override it
    fn initial_config(&self, params: &InitializeParams) -> Result<Option<EngineConfig>, LspError> {
        let mut config = None;

        #[allow(deprecated)]
        let root_uri = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .map(|folder| &folder.uri)
            .or(params.root_uri.as_ref());
        if let Some(root) = root_uri.and_then(|uri| uri.to_file_path().ok()) {
            config = EngineConfig::discover(&root)?;
        }

        if let Some(options) = &params.initialization_options {
            if let Some(from_client) = EngineConfig::from_lsp_settings(options)? {
                config = Some(from_client);
            }
        }

        Ok(config)
    }

    /// Snapshot of an open document
    async fn document(&self, uri: &Url) -> Result<Document, LspError> {
        self.documents
            .get_document(uri)
            .await
            .ok_or_else(|| LspError::DocumentNotOpen(uri.clone()))
    }

    /// Analyze a document and publish its diagnostics, if enabled
    async fn publish_diagnostics(&self, uri: &Url) {
        let Some(document) = self.documents.get_document(uri).await else {
            warn!("Document not found for diagnostics: {}", uri);
            return;
        };

        let feature = self.diagnostics.read().await;
        if let Some(feature) = feature.as_ref() {
            feature.publish(&self.client, &document).await;
        }
    }

    /// Log a message to the client
    async fn log_message(&self, message: &str, message_type: MessageType) {
        self.client.log_message(message_type, message).await;
    }

    /// Show a message to the user
    async fn show_message(&self, message: &str, message_type: MessageType) {
        self.client.show_message(message_type, message).await;
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for LspBackend {
    /// Initialize the LSP server
    ///
    /// Called when the client starts the server.
    /// Returns server capabilities and configuration.
    async fn initialize(&self, params: InitializeParams) -> jsonrpc::Result<InitializeResult> {
        info!("Initializing LSP server");
        info!("Client info: {:?}", params.client_info);

        match self.initial_config(&params) {
            Ok(Some(config)) => self.set_config(config).await,
            Ok(None) => debug!("No configuration supplied, using defaults"),
            Err(e) => {
                error!("Ignoring invalid configuration: {}", e);
                self.log_message(
                    &format!("Ignoring invalid configuration: {}", e),
                    MessageType::ERROR,
                )
                .await;
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(true),
                        })),
                        ..Default::default()
                    },
                )),

                references_provider: Some(OneOf::Left(true)),

                rename_provider: Some(OneOf::Right(RenameOptions {
                    prepare_provider: Some(true),
                    work_done_progress_options: WorkDoneProgressOptions {
                        work_done_progress: Some(false),
                    },
                })),

                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: crate::SERVER_NAME.to_string(),
                version: Some(crate::VERSION.to_string()),
            }),
        })
    }

    /// Initialized notification
    ///
    /// Called after `initialize` completes successfully.
    async fn initialized(&self, _params: InitializedParams) {
        info!("LSP server initialized successfully");
        self.log_message("Flink SQL LSP server initialized", MessageType::INFO)
            .await;
    }

    /// Shutdown the LSP server
    async fn shutdown(&self) -> jsonrpc::Result<()> {
        info!("Shutting down LSP server");
        Ok(())
    }

    /// Document opened notification
    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        let uri = doc.uri.clone();

        info!(
            "Document opened: uri={}, language={}, version={}",
            uri, doc.language_id, doc.version
        );

        self.documents
            .open_document(doc.uri, doc.text, doc.version, doc.language_id)
            .await;
        self.publish_diagnostics(&uri).await;
    }

    /// Document changed notification
    ///
    /// Diagnostics are refreshed only with `diagnostics.onChange`.
    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let identifier = params.text_document;
        let uri = identifier.uri.clone();

        debug!(
            "Document changed: uri={}, version={}, changes={}",
            uri,
            identifier.version,
            params.content_changes.len()
        );

        match self
            .documents
            .update_document(&identifier, &params.content_changes)
            .await
        {
            Ok(()) => {
                if self.config.read().await.diagnostics.on_change {
                    self.publish_diagnostics(&uri).await;
                }
            }
            Err(DocumentError::DocumentNotFound(uri)) => {
                warn!("Document not found for change: {}", uri);
            }
            Err(e) => {
                error!("Failed to update document: {}", e);
                self.show_message(
                    &format!("Failed to update document: {}", e),
                    MessageType::ERROR,
                )
                .await;
            }
        }
    }

    /// Document saved notification
    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        info!("Document saved: uri={}", uri);

        if let Some(text) = params.text {
            if let Err(e) = self.documents.replace_content(&uri, text).await {
                warn!("Failed to apply saved content: {}", e);
                return;
            }
        }

        self.publish_diagnostics(&uri).await;
    }

    /// Document closed notification
    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        info!("Document closed: uri={}", uri);

        if !self.documents.close_document(&uri).await {
            warn!("Document not found for close: {}", uri);
        }

        let feature = self.diagnostics.read().await;
        if let Some(feature) = feature.as_ref() {
            feature.clear(&self.client, &uri).await;
        }
    }

    /// Find references request
    ///
    /// Query failures answer with no locations and a log message naming the
    /// reason.
    async fn references(&self, params: ReferenceParams) -> jsonrpc::Result<Option<Vec<Location>>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        info!(
            "References requested: uri={}, line={}, col={}",
            uri, position.line, position.character
        );

        let result = match self.document(&uri).await {
            Ok(document) => references::find_references(
                &document,
                position,
                params.context.include_declaration,
            ),
            Err(e) => Err(e),
        };

        match result {
            Ok(locations) => Ok(Some(locations)),
            Err(e) => {
                debug!("Find references failed: {}", e);
                self.log_message(
                    &format!("Find references failed ({}): {}", e.reason(), e),
                    MessageType::INFO,
                )
                .await;
                Ok(None)
            }
        }
    }

    /// Prepare rename request
    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> jsonrpc::Result<Option<PrepareRenameResponse>> {
        let document = self
            .document(&params.text_document.uri)
            .await
            .map_err(|e| e.to_jsonrpc())?;

        rename::prepare_rename(&document, params.position)
            .map(Some)
            .map_err(|e| {
                debug!("Prepare rename rejected: {}", e);
                e.to_jsonrpc()
            })
    }

    /// Rename request
    ///
    /// Any failure is returned as an `InvalidParams` error so the editor
    /// applies nothing.
    async fn rename(&self, params: RenameParams) -> jsonrpc::Result<Option<WorkspaceEdit>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        info!(
            "Rename requested: uri={}, line={}, col={}, new_name={}",
            uri, position.line, position.character, params.new_name
        );

        let document = self.document(&uri).await.map_err(|e| e.to_jsonrpc())?;
        rename::rename(&document, position, &params.new_name)
            .map(Some)
            .map_err(|e| {
                warn!("Rename failed: {}", e);
                e.to_jsonrpc()
            })
    }

    /// Configuration change notification
    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        debug!("Configuration changed: {:?}", params.settings);

        match EngineConfig::from_lsp_settings(&params.settings) {
            Ok(Some(config)) => self.set_config(config).await,
            Ok(None) => debug!("No flinkSqlLsp section in settings"),
            Err(e) => {
                error!("Rejected configuration: {}", e);
                self.log_message(
                    &format!("Invalid flinkSqlLsp settings, keeping previous configuration: {}", e),
                    MessageType::ERROR,
                )
                .await;
            }
        }
    }
}

/// LSP backend errors
///
/// Errors that can occur during LSP operations.
#[derive(Debug, thiserror::Error)]
pub enum LspError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Document error
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Reference or rename query failure
    #[error("{0}")]
    Query(#[from] QueryError),

    /// The request names a document that is not open
    #[error("Document not open: {0}")]
    DocumentNotOpen(Url),

    /// The request position lies outside the document
    #[error("Position {}:{} is outside the document", .0.line, .0.character)]
    InvalidPosition(Position),
}

impl LspError {
    /// Short machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            LspError::Config(_) => "config",
            LspError::Document(_) => "document",
            LspError::Query(e) => e.reason(),
            LspError::DocumentNotOpen(_) => "document-not-open",
            LspError::InvalidPosition(_) => "invalid-position",
        }
    }

    /// JSON-RPC `InvalidParams` error carrying the reason
    pub fn to_jsonrpc(&self) -> jsonrpc::Error {
        let mut error = jsonrpc::Error::invalid_params(self.to_string());
        error.data = Some(json!({ "reason": self.reason() }));
        error
    }
}
