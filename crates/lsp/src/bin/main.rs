// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

use flink_sql_lsp::{LogLevelHook, LspBackend};
use std::sync::Arc;
use tower_lsp::{LspService, Server};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Stdout carries the protocol, so logs go to stderr
    let builder = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_filter_reloading();
    let reload = builder.reload_handle();
    tracing::subscriber::set_global_default(builder.finish())?;

    let log_level_hook: LogLevelHook = Arc::new(move |level: &str| {
        let filter = EnvFilter::try_new(level).map_err(|e| e.to_string())?;
        reload.reload(filter).map_err(|e| e.to_string())
    });

    tracing::info!("Starting Flink SQL LSP server {}", flink_sql_lsp::VERSION);

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) =
        LspService::new(move |client| LspBackend::new(client).with_log_level_hook(log_level_hook));

    Server::new(stdin, stdout, socket).serve(service).await;
    Ok(())
}
