// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Text-based test case format parser
//!
//! Test cases are separated by `---` and use a YAML-like field syntax. The
//! input marks the queried position with the cursor marker `|`:
//!
//! ```text
//! ---
//! description: Alias and its qualifier
//! action: references
//! input: |
//!   SELECT |a.x FROM t AS a
//! expected: |
//!   0:7-0:8
//!   0:21-0:22
//!
//! ---
//! description: Rename alias
//! action: rename
//! new_name: o
//! input: |
//!   SELECT |a.x FROM t AS a
//! output: |
//!   SELECT o.x FROM t AS o
//!
//! ---
//! description: Conflicting alias
//! action: rename
//! new_name: t
//! input: |
//!   SELECT |a.x FROM t AS a, s AS t
//! error: conflict
//! ```

use flink_sql_grammar::{Position, Range};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// A single test case definition
#[derive(Debug, Clone)]
pub struct TestCase {
    pub description: String,
    pub action: Action,
    /// Document text, cursor marker included
    pub input: String,
    pub expected: Expected,
}

/// Query exercised by a test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    References,
    Rename { new_name: String },
}

/// Expected outcome of a test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    /// Every returned range, in order
    Ranges(Vec<Range>),
    /// Document text after applying the rename edits
    Output(String),
    /// Failure reason (`not-found`, `unresolved`, `conflict`, ...)
    Error(String),
}

/// Parse errors
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid action value: {0}")]
    InvalidAction(String),

    #[error("Invalid syntax at line {line}: {message}")]
    InvalidSyntax { line: usize, message: String },

    #[error("Empty test case file")]
    EmptyFile,

    #[error("Invalid range format: {0}")]
    InvalidRange(String),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::References => write!(f, "references"),
            Action::Rename { new_name } => write!(f, "rename to {}", new_name),
        }
    }
}

/// Parse a test case file
pub fn parse_test_file(path: &Path) -> Result<Vec<TestCase>, ParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_test_content(&content)
}

/// Parse test case content from a string
pub fn parse_test_content(content: &str) -> Result<Vec<TestCase>, ParseError> {
    let mut cases = Vec::new();
    let mut current_case = TestCaseBuilder::default();
    let mut current_field: Option<String> = None;
    let mut current_value = Vec::new();
    let mut line_num = 0;

    for line in content.lines() {
        line_num += 1;
        let trimmed = line.trim();

        if trimmed.is_empty() && current_field.is_none() {
            continue;
        }

        // Separator
        if trimmed == "---" {
            if let Some(field) = &current_field {
                current_case.set_field(field, &current_value);
            }
            if current_case.has_fields() {
                cases.push(current_case.build(line_num)?);
                current_case = TestCaseBuilder::default();
            }
            current_field = None;
            current_value.clear();
            continue;
        }

        // Field declaration: only unindented lines start a field, so SQL
        // containing ':' inside a block value is left alone
        if !line.starts_with(char::is_whitespace) {
            if let Some((key, value)) = trimmed.split_once(':') {
                if let Some(field) = &current_field {
                    current_case.set_field(field, &current_value);
                }

                current_field = Some(key.trim().to_string());
                current_value.clear();

                let value = value.trim();
                if !value.is_empty() && value != "|" {
                    current_value.push(value.to_string());
                }
                continue;
            }
        }

        if current_field.is_some() {
            current_value.push(line.to_string());
        }
    }

    if let Some(field) = &current_field {
        current_case.set_field(field, &current_value);
    }
    if current_case.has_fields() {
        cases.push(current_case.build(line_num)?);
    }

    if cases.is_empty() {
        return Err(ParseError::EmptyFile);
    }

    Ok(cases)
}

/// Builder for constructing test cases incrementally
#[derive(Default)]
struct TestCaseBuilder {
    description: Option<String>,
    action: Option<String>,
    new_name: Option<String>,
    input: Option<String>,
    expected: Option<Vec<String>>,
    output: Option<String>,
    error: Option<String>,
}

impl TestCaseBuilder {
    fn has_fields(&self) -> bool {
        self.description.is_some() || self.input.is_some()
    }

    fn set_field(&mut self, field: &str, value: &[String]) {
        match field {
            "description" => self.description = Some(value.join("\n").trim().to_string()),
            "action" => self.action = Some(value.join("").trim().to_string()),
            "new_name" => self.new_name = Some(value.join("").trim().to_string()),
            "input" => self.input = Some(dedent(value)),
            "output" => self.output = Some(dedent(value)),
            "error" => self.error = Some(value.join("").trim().to_string()),
            "expected" => {
                let items: Vec<String> = value
                    .iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                self.expected = Some(items);
            }
            _ => {}
        }
    }

    fn build(self, line_num: usize) -> Result<TestCase, ParseError> {
        let description = self.description.ok_or(ParseError::InvalidSyntax {
            line: line_num,
            message: "missing description field".to_string(),
        })?;

        let input = self.input.ok_or(ParseError::InvalidSyntax {
            line: line_num,
            message: "missing input field".to_string(),
        })?;

        let action = match self.action.as_deref().unwrap_or("references") {
            "references" => Action::References,
            "rename" => Action::Rename {
                new_name: self.new_name.ok_or(ParseError::MissingField("new_name"))?,
            },
            other => return Err(ParseError::InvalidAction(other.to_string())),
        };

        let expected = if let Some(reason) = self.error {
            Expected::Error(reason)
        } else if let Some(output) = self.output {
            Expected::Output(output)
        } else if let Some(items) = self.expected {
            let ranges = items
                .iter()
                .map(|s| parse_range(s))
                .collect::<Result<Vec<_>, _>>()?;
            Expected::Ranges(ranges)
        } else {
            return Err(ParseError::MissingField("expected, output or error"));
        };

        Ok(TestCase {
            description,
            action,
            input,
            expected,
        })
    }
}

/// Remove common leading whitespace from multi-line text
fn dedent(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }

    let min_indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let result: Vec<String> = lines
        .iter()
        .map(|line| {
            if line.len() >= min_indent {
                &line[min_indent..]
            } else {
                line.as_str()
            }
            .to_string()
        })
        .collect();

    result.join("\n").trim().to_string()
}

fn parse_position(s: &str) -> Option<Position> {
    let (line, character) = s.trim().split_once(':')?;
    Some(Position::new(line.parse().ok()?, character.parse().ok()?))
}

/// Parse `line:col-line:col`
pub fn parse_range(s: &str) -> Result<Range, ParseError> {
    let invalid = || ParseError::InvalidRange(s.to_string());
    let (start, end) = s.split_once('-').ok_or_else(invalid)?;
    let start = parse_position(start).ok_or_else(invalid)?;
    let end = parse_position(end).ok_or_else(invalid)?;
    Ok(Range::new(start, end))
}
