// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Rename
//!
//! Answers `textDocument/prepareRename` and `textDocument/rename` for one
//! open document.
//!
//! A rename either produces an edit for every occurrence of the symbol or
//! fails as a whole; a failed rename never yields a partial [`WorkspaceEdit`].

use crate::backend::LspError;
use crate::document::Document;
use flink_sql_lsp_semantic::{RenameEngine, analyze};
use std::collections::HashMap;
use tower_lsp::lsp_types::{Position, PrepareRenameResponse, TextEdit, WorkspaceEdit};
use tracing::debug;

/// Range and current name of the identifier a rename at `position` changes
pub fn prepare_rename(
    document: &Document,
    position: Position,
) -> Result<PrepareRenameResponse, LspError> {
    let text_position = document
        .to_text_position(position)
        .ok_or(LspError::InvalidPosition(position))?;

    let analysis = analyze(&document.get_content());
    let (range, placeholder) = RenameEngine::new(&analysis.table).prepare_rename(text_position)?;

    Ok(PrepareRenameResponse::RangeWithPlaceholder {
        range: document.to_lsp_range(range),
        placeholder,
    })
}

/// Rename the symbol under `position` to `new_name`
///
/// # Returns
///
/// A workspace edit touching only this document, with one text edit per
/// occurrence.
pub fn rename(
    document: &Document,
    position: Position,
    new_name: &str,
) -> Result<WorkspaceEdit, LspError> {
    let text_position = document
        .to_text_position(position)
        .ok_or(LspError::InvalidPosition(position))?;

    let analysis = analyze(&document.get_content());
    let edits: Vec<TextEdit> = RenameEngine::new(&analysis.table)
        .rename(text_position, new_name)?
        .into_iter()
        .map(|edit| TextEdit::new(document.to_lsp_range(edit.range), edit.new_text))
        .collect();

    debug!("Rename to '{}' produced {} edits", new_name, edits.len());

    let mut changes = HashMap::new();
    changes.insert(document.uri().clone(), edits);
    Ok(WorkspaceEdit::new(changes))
}
