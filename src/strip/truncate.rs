//! Primary truncation: cut the message where the kept part's boundary recurs.

use tracing::debug;

use super::pattern::PartHeaderMatch;

/// How the primary cut was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CutKind {
    /// At the terminal boundary (`--token--`).
    Terminal,
    /// At a non-terminal recurrence of the token (a following part reuses it).
    Delimiter,
    /// At the terminal boundary, keeping later text parts that share the
    /// token and dropping the attachment sections between them.
    Interleaved,
    /// No recurrence, but the marker is already there: nothing to cut.
    AlreadyStripped,
}

/// A located cut point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cut {
    /// Everything from this offset on is dropped.
    pub offset: usize,
    pub kind: CutKind,
}

/// Find the first line-anchored recurrence of the matched token after the
/// match and return the cut point in front of it.
///
/// The line ending preceding the delimiter line belongs to the delimiter and
/// is dropped with it. Returns `None` when the token never recurs.
pub fn find_cut(text: &[u8], part: &PartHeaderMatch) -> Option<Cut> {
    let token = part.token.as_bytes();
    let at = find_delimiter(text, token, part.end)?;

    let after = at + token.len();
    let kind = if text[after..].starts_with(b"--") {
        CutKind::Terminal
    } else {
        CutKind::Delimiter
    };

    let offset = line_start_before(text, at);
    debug!(token = %part.token, offset, ?kind, "Located primary cut");
    Some(Cut { offset, kind })
}

/// Offset of the terminal boundary (`token--`) after the match, pointing at
/// the token itself.
pub fn find_terminal(text: &[u8], part: &PartHeaderMatch) -> Option<usize> {
    let token = part.token.as_bytes();
    let mut pos = part.end;
    while let Some(at) = find_delimiter(text, token, pos) {
        if text[at + token.len()..].starts_with(b"--") {
            return Some(at);
        }
        pos = at + 1;
    }
    None
}

/// Find `token` at or after `from`, only where it starts a line.
pub(crate) fn find_delimiter(text: &[u8], token: &[u8], from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(found) = find_bytes(text, token, pos) {
        if found > 0 && matches!(text[found - 1], b'\r' | b'\n') {
            return Some(found);
        }
        pos = found + 1;
    }
    None
}

/// Plain substring search starting at `from`.
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Offset of the line ending (`\r\n`, `\n` or `\r`) right before `at`.
pub(crate) fn line_start_before(text: &[u8], at: usize) -> usize {
    match at {
        0 | 1 => 0,
        _ if text[at - 1] == b'\n' && text[at - 2] == b'\r' => at - 2,
        _ => at - 1,
    }
}
