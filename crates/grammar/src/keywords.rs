// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Flink SQL keywords
//!
//! Keywords are matched case-insensitively. Reserved keywords can only be
//! used as identifiers when quoted with backticks (`` `timestamp` ``).

/// Reserved words, upper-cased and sorted for binary search
const RESERVED_KEYWORDS: &[&str] = &[
    "ALL",
    "ALTER",
    "AND",
    "ANY",
    "ARRAY",
    "AS",
    "BETWEEN",
    "BOTH",
    "BY",
    "CASE",
    "CAST",
    "CREATE",
    "CROSS",
    "CURRENT",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "DATE",
    "DELETE",
    "DESCRIBE",
    "DISTINCT",
    "DROP",
    "ELSE",
    "END",
    "EXCEPT",
    "EXISTS",
    "EXPLAIN",
    "FALSE",
    "FETCH",
    "FOR",
    "FROM",
    "FULL",
    "GROUP",
    "HAVING",
    "IN",
    "INNER",
    "INSERT",
    "INTERSECT",
    "INTERVAL",
    "INTO",
    "IS",
    "JOIN",
    "LATERAL",
    "LEADING",
    "LEFT",
    "LIKE",
    "LIMIT",
    "LOCALTIME",
    "LOCALTIMESTAMP",
    "MAP",
    "MATCH_RECOGNIZE",
    "NATURAL",
    "NOT",
    "NULL",
    "OFFSET",
    "ON",
    "OR",
    "ORDER",
    "OUTER",
    "OVER",
    "PARTITION",
    "RIGHT",
    "ROW",
    "SELECT",
    "SET",
    "SOME",
    "SYSTEM_TIME",
    "TABLE",
    "THEN",
    "TIME",
    "TIMESTAMP",
    "TO",
    "TRAILING",
    "TRUE",
    "UNION",
    "UNKNOWN",
    "UPDATE",
    "USING",
    "VALUES",
    "WHEN",
    "WHERE",
    "WINDOW",
    "WITH",
];

/// Units accepted after `INTERVAL '..'` and as the first argument of the
/// time arithmetic functions
const TIME_UNITS: &[&str] = &[
    "CENTURY",
    "DAY",
    "DAYS",
    "DECADE",
    "DOW",
    "DOY",
    "EPOCH",
    "HOUR",
    "HOURS",
    "MICROSECOND",
    "MILLENNIUM",
    "MILLISECOND",
    "MINUTE",
    "MINUTES",
    "MONTH",
    "MONTHS",
    "NANOSECOND",
    "QUARTER",
    "SECOND",
    "SECONDS",
    "WEEK",
    "YEAR",
    "YEARS",
];

/// Functions that may be written without parentheses
const NILADIC_FUNCTIONS: &[&str] = &[
    "CURRENT_DATE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "LOCALTIME",
    "LOCALTIMESTAMP",
];

/// Check whether `word` is a reserved Flink SQL keyword
///
/// # Examples
///
/// ```
/// use flink_sql_grammar::is_reserved_keyword;
///
/// assert!(is_reserved_keyword("select"));
/// assert!(is_reserved_keyword("Timestamp"));
/// assert!(!is_reserved_keyword("user_id"));
/// ```
pub fn is_reserved_keyword(word: &str) -> bool {
    contains_upper(RESERVED_KEYWORDS, word)
}

/// Check whether `word` names a time unit (`DAY`, `MINUTES`, ...)
pub fn is_time_unit(word: &str) -> bool {
    TIME_UNITS.iter().any(|unit| unit.eq_ignore_ascii_case(word))
}

/// Check whether `word` is a function callable without parentheses
pub fn is_niladic_function(word: &str) -> bool {
    NILADIC_FUNCTIONS.iter().any(|f| f.eq_ignore_ascii_case(word))
}

/// Check whether `name` can be written in a document as an identifier.
///
/// Accepts plain identifiers (`[A-Za-z_][A-Za-z0-9_$]*`) that are not
/// reserved keywords, and backtick-quoted identifiers whose inner backticks
/// are doubled.
///
/// # Examples
///
/// ```
/// use flink_sql_grammar::is_valid_identifier;
///
/// assert!(is_valid_identifier("orders_v2"));
/// assert!(is_valid_identifier("`order date`"));
/// assert!(!is_valid_identifier("select"));
/// assert!(!is_valid_identifier("2fast"));
/// assert!(!is_valid_identifier("``"));
/// ```
pub fn is_valid_identifier(name: &str) -> bool {
    if let Some(inner) = name
        .strip_prefix('`')
        .and_then(|rest| rest.strip_suffix('`'))
    {
        return !inner.is_empty() && inner.replace("``", "").find('`').is_none();
    }

    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');

    starts_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !is_reserved_keyword(name)
}

/// Strip backtick quoting from an identifier, unescaping doubled backticks
pub fn unquote_identifier(raw: &str) -> String {
    match raw.strip_prefix('`').and_then(|rest| rest.strip_suffix('`')) {
        Some(inner) => inner.replace("``", "`"),
        None => raw.to_string(),
    }
}

fn contains_upper(sorted: &[&str], word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    sorted.binary_search(&upper.as_str()).is_ok()
}
