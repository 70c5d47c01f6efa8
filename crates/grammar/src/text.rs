// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Source positions
//!
//! Positions are zero-based `(line, character)` pairs where `character` counts
//! Unicode scalar values from the start of the line. The same convention is
//! used by the parser, the semantic layer and the LSP adapter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in document text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Zero-based line number
    pub line: u32,
    /// Zero-based character offset within the line
    pub character: u32,
}

impl Position {
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.character)
    }
}

/// A half-open span of document text (`start <= end`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// Create a range, swapping the endpoints if they are reversed
    pub fn new(start: Position, end: Position) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Whether a cursor at `position` touches this range.
    ///
    /// The end is inclusive so a cursor placed right after an identifier
    /// still hits it.
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }

    /// Whether `other` lies entirely within this range
    pub fn encloses(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether the two ranges share at least one character
    pub fn overlaps(&self, other: &Range) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Smallest range covering both
    pub fn cover(&self, other: &Range) -> Range {
        Range {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Length in characters when the range sits on a single line.
    ///
    /// Multi-line ranges report `u32::MAX` so they lose every
    /// "smallest enclosing range" comparison.
    pub fn single_line_len(&self) -> u32 {
        if self.start.line == self.end.line {
            self.end.character - self.start.character
        } else {
            u32::MAX
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Byte offset to [`Position`] mapping for one document snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    /// Byte offset at which every line starts
    line_starts: Vec<usize>,
    text: String,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (offset, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }

        Self {
            line_starts,
            text: text.to_string(),
        }
    }

    /// Number of lines (a trailing newline opens an empty last line)
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// The text this index was built from
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Convert a byte offset into a position.
    ///
    /// Offsets past the end clamp to the end of the document, offsets in the
    /// middle of a multi-byte character round down to its start.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let mut end = offset;
        while !self.text.is_char_boundary(end) {
            end -= 1;
        }
        let character = self.text[line_start..end].chars().count();

        Position::new(line as u32, character as u32)
    }

    /// Convert a position back into a byte offset.
    ///
    /// Returns `None` for lines past the end; characters past the end of a
    /// line clamp to the line end (before its newline).
    pub fn offset(&self, position: Position) -> Option<usize> {
        let line = position.line as usize;
        let line_start = *self.line_starts.get(line)?;
        let line_end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        let line_text = &self.text[line_start..line_end];

        let column = line_text
            .char_indices()
            .nth(position.character as usize)
            .map(|(idx, _)| idx)
            .unwrap_or_else(|| line_text.trim_end_matches('\r').len());

        Some(line_start + column)
    }

    /// Convert a byte span into a range
    pub fn range(&self, span: std::ops::Range<usize>) -> Range {
        Range::new(self.position(span.start), self.position(span.end))
    }

    /// Text covered by a range, if the range lies within the document
    pub fn slice(&self, range: Range) -> Option<&str> {
        let start = self.offset(range.start)?;
        let end = self.offset(range.end)?;
        self.text.get(start..end)
    }
}
