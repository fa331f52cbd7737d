//! Search query parser.
//!
//! Parses Gmail-style query strings into a structured [`SearchQuery`].
//!
//! # Supported syntax
//!
//! **Free text**: `invoice` searches subject, from and to.
//!
//! **Field-specific**:
//! - `from:user@example.com`
//! - `to:dest@example.com`
//! - `subject:invoice`
//! - `label:inbox`
//! - `has:attachment` / `has:no-attachment`
//!
//! **Size filters**: `larger:5M`, `smaller:100K`, `size:2M` (same as `larger:`).
//!
//! **Date filters**: `before:2024`, `after:2023-06`, `before:2024/01/31`.
//!
//! **Operators**:
//! - `term1 term2` implicit AND
//! - `-term` NOT
//! - `"exact phrase"` quoted phrase

use chrono::NaiveDate;

/// Which field to search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchField {
    /// Search in subject + from + to (default).
    All,
    From,
    To,
    Subject,
    Label,
}

/// How to match text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOperator {
    /// Case-insensitive substring match.
    Contains(String),
    /// Quoted phrase, matched as a case-insensitive substring.
    Phrase(String),
}

/// A single search term.
#[derive(Debug, Clone)]
pub struct SearchTerm {
    pub field: SearchField,
    pub operator: SearchOperator,
    pub negated: bool,
}

/// A fully parsed search query. Every present filter must match.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub terms: Vec<SearchTerm>,
    /// Messages strictly larger than this many bytes.
    pub larger_than: Option<u64>,
    /// Messages strictly smaller than this many bytes.
    pub smaller_than: Option<u64>,
    /// Messages dated before this day (exclusive).
    pub before: Option<NaiveDate>,
    /// Messages dated after this day (exclusive).
    pub after: Option<NaiveDate>,
    /// `Some(true)` for has:attachment, `Some(false)` for has:no-attachment.
    pub has_attachment: Option<bool>,
}

impl SearchQuery {
    /// `true` when the query matches every message.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
            && self.larger_than.is_none()
            && self.smaller_than.is_none()
            && self.before.is_none()
            && self.after.is_none()
            && self.has_attachment.is_none()
    }
}

/// Parse a query string into a structured [`SearchQuery`].
///
/// Never fails. Unrecognized `key:value` tokens are treated as free text.
pub fn parse_query(input: &str) -> SearchQuery {
    let mut query = SearchQuery::default();

    for token in tokenize(input.trim()) {
        let (negated, token) = match token.strip_prefix('-') {
            Some(stripped) if !stripped.is_empty() => (true, stripped),
            _ => (false, token.as_str()),
        };

        let field_term = |field: SearchField, value: &str| SearchTerm {
            field,
            operator: make_operator(value),
            negated,
        };

        if let Some(value) = token.strip_prefix("from:") {
            query.terms.push(field_term(SearchField::From, value));
        } else if let Some(value) = token.strip_prefix("to:") {
            query.terms.push(field_term(SearchField::To, value));
        } else if let Some(value) = token.strip_prefix("subject:") {
            query.terms.push(field_term(SearchField::Subject, value));
        } else if let Some(value) = token.strip_prefix("label:") {
            query.terms.push(field_term(SearchField::Label, value));
        } else if let Some(value) = token.strip_prefix("has:") {
            match value {
                "attachment" | "attachments" => query.has_attachment = Some(!negated),
                "no-attachment" | "no-attachments" => query.has_attachment = Some(negated),
                _ => query.terms.push(field_term(SearchField::All, token)),
            }
        } else if let Some(bytes) = prefixed_size(token, &["larger:", "size:"]) {
            query.larger_than = Some(bytes);
        } else if let Some(bytes) = prefixed_size(token, &["smaller:"]) {
            query.smaller_than = Some(bytes);
        } else if let Some(d) = token.strip_prefix("before:").and_then(period_start) {
            query.before = Some(d);
        } else if let Some(d) = token.strip_prefix("after:").and_then(period_end) {
            query.after = Some(d);
        } else {
            query.terms.push(field_term(SearchField::All, token));
        }
    }

    query
}

/// Build an operator from a value string (quoted → Phrase, otherwise → Contains).
fn make_operator(value: &str) -> SearchOperator {
    match value.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(phrase) => SearchOperator::Phrase(phrase.to_lowercase()),
        None => SearchOperator::Contains(value.to_lowercase()),
    }
}

/// Tokenize input respecting quoted strings.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            current.push(ch);
        } else if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn prefixed_size(token: &str, prefixes: &[&str]) -> Option<u64> {
    prefixes
        .iter()
        .find_map(|p| token.strip_prefix(p))
        .and_then(parse_size)
}

/// Parse a size like `5M`, `100kb`, `2G` or `1500` into bytes.
pub fn parse_size(value: &str) -> Option<u64> {
    let lower = value.trim().to_lowercase();
    let digits = lower.strip_suffix('b').unwrap_or(&lower);
    let (num_str, multiplier) = if let Some(n) = digits.strip_suffix('g') {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = digits.strip_suffix('m') {
        (n, 1024 * 1024)
    } else if let Some(n) = digits.strip_suffix('k') {
        (n, 1024)
    } else {
        (digits, 1u64)
    };

    let num: u64 = num_str.parse().ok()?;
    num.checked_mul(multiplier)
}

/// Split `YYYY`, `YYYY-MM`, `YYYY-MM-DD` (or `/` separated) into parts.
fn date_parts(s: &str) -> Option<(i32, Option<u32>, Option<u32>)> {
    let mut parts = s.split(['-', '/']);
    let year: i32 = parts.next()?.parse().ok()?;
    let month = match parts.next() {
        Some(m) => Some(m.parse::<u32>().ok()?),
        None => None,
    };
    let day = match parts.next() {
        Some(d) => Some(d.parse::<u32>().ok()?),
        None => None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((year, month, day))
}

/// First day of the period a partial date names.
fn period_start(s: &str) -> Option<NaiveDate> {
    match date_parts(s)? {
        (year, None, _) => NaiveDate::from_ymd_opt(year, 1, 1),
        (year, Some(month), None) => NaiveDate::from_ymd_opt(year, month, 1),
        (year, Some(month), Some(day)) => NaiveDate::from_ymd_opt(year, month, day),
    }
}

/// Last day of the period a partial date names.
fn period_end(s: &str) -> Option<NaiveDate> {
    match date_parts(s)? {
        (year, None, _) => NaiveDate::from_ymd_opt(year, 12, 31),
        (year, Some(month), None) => {
            // Last day of month: go to first of next month, subtract 1 day
            let (ny, nm) = if month == 12 {
                (year + 1, 1)
            } else {
                (year, month + 1)
            };
            NaiveDate::from_ymd_opt(year, month, 1)?;
            NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()
        }
        (year, Some(month), Some(day)) => NaiveDate::from_ymd_opt(year, month, day),
    }
}
