//! Boundary-plus-content-type pattern matching.
//!
//! A part header is recognised as a boundary line (`--token` right after a
//! line ending), an optional `Content-Transfer-Encoding` line, an optional
//! `Content-Disposition` / `filename=` declaration and finally a
//! `Content-Type` of the wanted category. Matching is case-insensitive and the
//! content type may end in `;` or a line ending, since producers disagree on
//! both.

use regex::bytes::{Regex, RegexBuilder};

use crate::error::{Result, StripError};

/// Boundary line: one line-ending byte, then `--` and the token characters.
const BOUNDARY_LINE: &str = r"([\r\n])(--[\w=.+-]+)[\r\n]*";

/// Some producers put the transfer encoding between the boundary and the type.
const TRANSFER_ENCODING: &str =
    r"(?:Content-Transfer-Encoding: (?:7bit|8bit|quoted-printable|base64)[\r\n; ]*)?";

/// Attachment sections may also carry a disposition and a filename.
const DISPOSITION: &str = r#"(?:Content-Disposition: (?:inline|attachment)[\r\n;\t ]*)?(?:filename="?[^\r\n;"]*"?[\r\n;\t ]*)?"#;

/// Content category of a matched part header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartCategory {
    /// `text/html`
    Html,
    /// `text/plain`
    Plain,
    /// One of the configured attachment types (lowercased, e.g. `image/jpeg`).
    Attachment(String),
}

/// A located part header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartHeaderMatch {
    /// Offset of the line-ending byte that precedes the boundary line.
    pub start: usize,
    /// Offset just past the content-type terminator.
    pub end: usize,
    /// Length of the line-ending prefix captured before the boundary.
    pub prefix_len: usize,
    /// Boundary token including its leading `--` (e.g. `--=_715b.68`).
    pub token: String,
    /// Declared content category.
    pub category: PartCategory,
}

impl PartHeaderMatch {
    /// Offset at which the boundary token itself starts.
    pub fn token_start(&self) -> usize {
        self.start + self.prefix_len
    }

    /// The full matched span.
    pub fn span<'a>(&self, text: &'a [u8]) -> &'a [u8] {
        &text[self.start..self.end]
    }
}

/// The three compiled part-header patterns.
#[derive(Debug, Clone)]
pub struct PartPatterns {
    html: Regex,
    plain: Regex,
    attachment: Regex,
}

impl PartPatterns {
    /// Compile the patterns for the given attachment allow-list.
    pub fn new(attachment_types: &[String]) -> Result<Self> {
        if attachment_types.is_empty() {
            return Err(StripError::InvalidPattern(
                "attachment type allow-list is empty".into(),
            ));
        }
        let kinds = attachment_types
            .iter()
            .map(|t| regex::escape(t.trim()))
            .collect::<Vec<_>>()
            .join("|");

        Ok(Self {
            html: compile(&format!(
                "{BOUNDARY_LINE}{TRANSFER_ENCODING}Content-Type: (text/html)[;\\r\\n]"
            ))?,
            plain: compile(&format!(
                "{BOUNDARY_LINE}{TRANSFER_ENCODING}Content-Type: (text/plain)[;\\r\\n]"
            ))?,
            attachment: compile(&format!(
                "{BOUNDARY_LINE}{TRANSFER_ENCODING}{DISPOSITION}Content-Type: ({kinds})[;\\r\\n]"
            ))?,
        })
    }

    /// Earliest `text/html` part header.
    pub fn find_html(&self, text: &[u8]) -> Option<PartHeaderMatch> {
        find(&self.html, text, |_| PartCategory::Html)
    }

    /// Earliest `text/plain` part header.
    pub fn find_plain(&self, text: &[u8]) -> Option<PartHeaderMatch> {
        find(&self.plain, text, |_| PartCategory::Plain)
    }

    /// Earliest attachment part header of an allowed type.
    pub fn find_attachment(&self, text: &[u8]) -> Option<PartHeaderMatch> {
        find(&self.attachment, text, |kind| {
            PartCategory::Attachment(String::from_utf8_lossy(kind).to_lowercase())
        })
    }

    /// Whether `text` holds an HTML or plain-text part header delimited by
    /// exactly `token`.
    pub fn has_text_part(&self, text: &[u8], token: &str) -> bool {
        [&self.html, &self.plain].into_iter().any(|re| {
            re.captures_iter(text)
                .any(|caps| caps.get(2).is_some_and(|t| t.as_bytes() == token.as_bytes()))
        })
    }

    /// The body part to keep: HTML when present, plain text otherwise.
    pub fn find_body(&self, text: &[u8]) -> Option<PartHeaderMatch> {
        self.find_html(text).or_else(|| self.find_plain(text))
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| StripError::InvalidPattern(e.to_string()))
}

fn find(
    re: &Regex,
    text: &[u8],
    category: impl Fn(&[u8]) -> PartCategory,
) -> Option<PartHeaderMatch> {
    let caps = re.captures(text)?;
    let whole = caps.get(0)?;
    let prefix = caps.get(1)?;
    let token = caps.get(2)?;
    let kind = caps.get(3)?;
    Some(PartHeaderMatch {
        start: whole.start(),
        end: whole.end(),
        prefix_len: prefix.len(),
        token: String::from_utf8_lossy(token.as_bytes()).into_owned(),
        category: category(kind.as_bytes()),
    })
}
