//! Boundary-aware attachment stripping.
//!
//! [`strip_attachments`] takes a raw RFC 2822 message and returns a copy that
//! keeps the headers and the text body but drops the attachment parts:
//!
//! 1. locate the body part to keep (HTML preferred, plain text otherwise),
//! 2. cut the message where that part's boundary token recurs, or at its
//!    terminal boundary when later text parts share the token,
//! 3. if the result is still larger than the threshold, excise attachment
//!    sections that share the token (see [`excise`]),
//! 4. append the marker text unless it is already there.
//!
//! This is pattern matching over a loosely followed format, not a MIME
//! parser. Messages whose layout falls outside the patterns fail with
//! [`StripError::NoBodyBoundaryFound`] or [`StripError::NoEndBoundaryFound`]
//! instead of being silently mangled.

pub mod excise;
pub mod pattern;
pub mod truncate;

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{Result, StripError};

use self::excise::{excise_attachments, ExcisionReport};
use self::pattern::{PartCategory, PartPatterns};
use self::truncate::{find_bytes, find_cut, find_terminal, line_start_before, CutKind};

/// Default size above which the secondary pass runs (1 MiB).
pub const DEFAULT_SIZE_THRESHOLD: usize = 1024 * 1024;

/// Default text appended to stripped messages.
pub const DEFAULT_MARKER: &str = "[Attachments stripped and downloaded]";

/// Attachment types removed by the secondary pass by default.
pub const DEFAULT_ATTACHMENT_TYPES: &[&str] = &["image/jpeg", "application/pdf"];

/// Chunk size used when dumping body candidates for diagnostics.
const DIAGNOSTIC_CHUNK: usize = 2000;

/// Immutable stripping configuration: compiled patterns, threshold, marker.
#[derive(Debug, Clone)]
pub struct StripConfig {
    patterns: PartPatterns,
    size_threshold: usize,
    marker: String,
}

impl StripConfig {
    /// Build a configuration, compiling the part-header patterns.
    pub fn new(
        attachment_types: &[String],
        size_threshold: usize,
        marker: impl Into<String>,
    ) -> Result<Self> {
        let marker = marker.into();
        if marker.is_empty() {
            return Err(StripError::InvalidPattern("marker text is empty".into()));
        }
        Ok(Self {
            patterns: PartPatterns::new(attachment_types)?,
            size_threshold,
            marker,
        })
    }

    /// Build from the `[strip]` section of the configuration file.
    pub fn from_settings(settings: &crate::config::StripSettings) -> Result<Self> {
        Self::new(
            &settings.attachment_types,
            settings.size_threshold,
            settings.marker.clone(),
        )
    }

    pub fn patterns(&self) -> &PartPatterns {
        &self.patterns
    }

    pub fn size_threshold(&self) -> usize {
        self.size_threshold
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }
}

impl Default for StripConfig {
    fn default() -> Self {
        let types: Vec<String> = DEFAULT_ATTACHMENT_TYPES
            .iter()
            .map(|t| t.to_string())
            .collect();
        Self::new(&types, DEFAULT_SIZE_THRESHOLD, DEFAULT_MARKER)
            .expect("built-in patterns are valid")
    }
}

/// Which body part was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    Html,
    Plain,
}

/// Recoverable conditions met while stripping. The result is still usable.
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StripWarning {
    /// Only a plain-text body was found; the patterns are tuned for HTML.
    #[error("Non-HTML message, check the result by hand")]
    NonHtmlBody,

    /// An attachment section had no closing boundary during the secondary pass.
    #[error("No end boundary for attachment section '{token}' at offset {offset}")]
    AttachmentEndBoundaryMissing { token: String, offset: usize },

    /// Text parts after the kept one share its token, but the token is never
    /// terminated, so they were cut off with the attachments.
    #[error("Text parts after the first '{token}' delimiter were dropped, no terminal boundary found")]
    TrailingTextDropped { token: String },

    /// Still above the threshold after both passes.
    #[error("Message still {size} bytes after attachment removal (threshold {threshold}), re-verify it")]
    OversizedAfterBothPasses { size: usize, threshold: usize },
}

/// Result of a successful strip.
#[derive(Debug, Clone)]
pub struct StrippedMessage {
    /// The rebuilt raw message, marker included.
    pub raw: Vec<u8>,
    pub body: BodyKind,
    /// Boundary token of the kept part (with its leading `--`).
    pub boundary: String,
    pub cut: CutKind,
    /// Present when the secondary pass ran.
    pub excision: Option<ExcisionReport>,
    pub warnings: Vec<StripWarning>,
    /// Size of the input.
    pub original_len: usize,
}

impl StrippedMessage {
    /// `true` when the message came in already stripped and is returned as-is.
    pub fn is_unchanged(&self) -> bool {
        self.cut == CutKind::AlreadyStripped
    }

    /// Bytes removed, net of the appended marker.
    pub fn bytes_removed(&self) -> usize {
        self.original_len.saturating_sub(self.raw.len())
    }
}

/// Strip the attachment parts from a raw message.
pub fn strip_attachments(raw: &[u8], config: &StripConfig) -> Result<StrippedMessage> {
    let patterns = config.patterns();
    let marker = config.marker.as_bytes();
    let mut warnings = Vec::new();

    let Some(part) = patterns.find_body(raw) else {
        dump_body_candidates(raw);
        return Err(StripError::NoBodyBoundaryFound);
    };

    let body = match part.category {
        PartCategory::Html => BodyKind::Html,
        _ => BodyKind::Plain,
    };
    if body == BodyKind::Plain {
        warn!("Non-HTML message, the plain-text path is less reliable; check it worked");
        warnings.push(StripWarning::NonHtmlBody);
    }

    let Some(cut) = find_cut(raw, &part) else {
        if find_bytes(raw, marker, part.end).is_some() {
            return Ok(already_stripped(raw, body, part.token, warnings));
        }
        return Err(StripError::NoEndBoundaryFound { token: part.token });
    };

    let mut text = raw[..cut.offset].to_vec();
    let mut cut_kind = cut.kind;

    if cut.kind == CutKind::Delimiter {
        let terminal = find_terminal(raw, &part);
        let span_end = terminal.unwrap_or(raw.len());
        if patterns.has_text_part(&raw[cut.offset..span_end], &part.token) {
            match terminal {
                Some(at) => {
                    let span = &raw[cut.offset..at + part.token.len()];
                    keep_shared_text_parts(&mut text, span, &part.token, patterns, &mut warnings);
                    cut_kind = CutKind::Interleaved;
                }
                None if find_bytes(raw, marker, part.end).is_some() => {
                    return Ok(already_stripped(raw, body, part.token, warnings));
                }
                None => {
                    warn!(
                        token = %part.token,
                        "Later text parts share the body's boundary, which is never terminated; dropping them"
                    );
                    warnings.push(StripWarning::TrailingTextDropped {
                        token: part.token.clone(),
                    });
                }
            }
        }
    }

    let mut excision = None;
    if text.len() > config.size_threshold {
        warn!(
            size = text.len(),
            threshold = config.size_threshold,
            "Message still above threshold after attachment removal, trying harder"
        );
        let (report, warning) = excise_attachments(&mut text, patterns);
        warnings.extend(warning);
        debug!(size = report.after, "Size after in-place excision");
        excision = Some(report);

        if text.len() > config.size_threshold {
            warn!(
                size = text.len(),
                threshold = config.size_threshold,
                "Message still oversized after both passes; re-verify it manually"
            );
            warnings.push(StripWarning::OversizedAfterBothPasses {
                size: text.len(),
                threshold: config.size_threshold,
            });
        }
    }

    append_marker(&mut text, body, marker);

    Ok(StrippedMessage {
        raw: text,
        body,
        boundary: part.token,
        cut: cut_kind,
        excision,
        warnings,
        original_len: raw.len(),
    })
}

fn already_stripped(
    raw: &[u8],
    body: BodyKind,
    token: String,
    warnings: Vec<StripWarning>,
) -> StrippedMessage {
    debug!(%token, "Message already stripped, leaving it as is");
    StrippedMessage {
        raw: raw.to_vec(),
        body,
        boundary: token,
        cut: CutKind::AlreadyStripped,
        excision: None,
        warnings,
        original_len: raw.len(),
    }
}

/// Append the parts between the first delimiter and the terminal boundary
/// to `text`, without their attachment sections.
///
/// `span` starts at the line ending before the first delimiter and ends with
/// the terminal token, so the last attachment section is still delimited.
/// The terminal line itself is not kept.
fn keep_shared_text_parts(
    text: &mut Vec<u8>,
    span: &[u8],
    token: &str,
    patterns: &PartPatterns,
    warnings: &mut Vec<StripWarning>,
) {
    let mut tail = span.to_vec();
    let (report, warning) = excise_attachments(&mut tail, patterns);
    warnings.extend(warning);

    let terminal = tail.len() - token.len();
    tail.truncate(line_start_before(&tail, terminal));
    debug!(
        sections = report.sections,
        kept = tail.len(),
        "Kept text parts sharing the body's boundary"
    );
    text.extend_from_slice(&tail);
}

/// Append the separator and marker unless the marker is already present.
fn append_marker(text: &mut Vec<u8>, body: BodyKind, marker: &[u8]) {
    if find_bytes(text, marker, 0).is_some() {
        debug!("Marker already present, not appending another one");
        return;
    }
    let separator: &[u8] = match body {
        BodyKind::Html => b"<br><br>",
        BodyKind::Plain => b"\r\n\r\n",
    };
    text.extend_from_slice(separator);
    text.extend_from_slice(marker);
}

/// Offsets of the diagnostic chunks that mention a text content type.
pub fn body_candidate_chunks(raw: &[u8]) -> Vec<usize> {
    raw.chunks(DIAGNOSTIC_CHUNK)
        .enumerate()
        .filter(|(_, chunk)| {
            find_bytes(chunk, b"text/plain", 0).is_some()
                || find_bytes(chunk, b"text/html", 0).is_some()
        })
        .map(|(i, _)| i * DIAGNOSTIC_CHUNK)
        .collect()
}

/// Log every chunk that could hold the body, to help extend the patterns.
fn dump_body_candidates(raw: &[u8]) {
    let offsets = body_candidate_chunks(raw);
    warn!(
        chunks = offsets.len(),
        size = raw.len(),
        "No body boundary matched; dumping candidate chunks"
    );
    for offset in offsets {
        let end = (offset + DIAGNOSTIC_CHUNK).min(raw.len());
        warn!(
            offset,
            chunk = %String::from_utf8_lossy(&raw[offset..end]),
            "Body candidate chunk"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: &str = "From: a@example.com\r\nSubject: hi\r\nContent-Type: multipart/mixed; boundary=\"B\"\r\n\r\n";

    fn message(body: &str) -> Vec<u8> {
        format!("{HEADERS}{body}").into_bytes()
    }

    #[test]
    fn test_marker_appended_once() {
        let mut text = b"<p>hi</p>".to_vec();
        append_marker(&mut text, BodyKind::Html, DEFAULT_MARKER.as_bytes());
        append_marker(&mut text, BodyKind::Html, DEFAULT_MARKER.as_bytes());
        assert_eq!(
            text,
            b"<p>hi</p><br><br>[Attachments stripped and downloaded]".to_vec()
        );
    }

    #[test]
    fn test_plain_marker_separator() {
        let mut text = b"hello".to_vec();
        append_marker(&mut text, BodyKind::Plain, DEFAULT_MARKER.as_bytes());
        assert_eq!(
            text,
            b"hello\r\n\r\n[Attachments stripped and downloaded]".to_vec()
        );
    }

    #[test]
    fn test_plain_body_warns() {
        let raw = message("--B\r\nContent-Type: text/plain\r\n\r\nhello\r\n--B\r\nContent-Type: application/pdf;\r\n\r\nPDF\r\n--B--\r\n");
        let out = strip_attachments(&raw, &StripConfig::default()).expect("strip");
        assert_eq!(out.body, BodyKind::Plain);
        assert_eq!(out.warnings, vec![StripWarning::NonHtmlBody]);
        assert!(out.raw.ends_with(b"hello\r\n\r\n[Attachments stripped and downloaded]"));
    }

    #[test]
    fn test_no_body_boundary() {
        let raw = message("just some text, no parts\r\n");
        let err = strip_attachments(&raw, &StripConfig::default()).unwrap_err();
        assert!(matches!(err, StripError::NoBodyBoundaryFound));
    }

    #[test]
    fn test_no_end_boundary() {
        let raw = message("--B\r\nContent-Type: text/html;\r\n\r\n<p>never closed</p>\r\n");
        let err = strip_attachments(&raw, &StripConfig::default()).unwrap_err();
        assert!(matches!(err, StripError::NoEndBoundaryFound { ref token } if token == "--B"));
    }

    #[test]
    fn test_interleaved_attachment_before_terminal() {
        let raw = message("--B\r\nContent-Type: text/html;\r\n\r\n<p>one</p>\r\n--B\r\nContent-Type: text/html;\r\n\r\n<p>two</p>\r\n--B\r\nContent-Type: application/pdf;\r\n\r\nPDF\r\n--B--\r\n");
        let out = strip_attachments(&raw, &StripConfig::default()).expect("strip");
        assert_eq!(out.cut, CutKind::Interleaved);
        assert!(out.warnings.is_empty());
        assert_eq!(
            out.raw,
            message("--B\r\nContent-Type: text/html;\r\n\r\n<p>one</p>\r\n--B\r\nContent-Type: text/html;\r\n\r\n<p>two</p><br><br>[Attachments stripped and downloaded]")
        );
    }

    #[test]
    fn test_unterminated_shared_token_warns() {
        let raw = message("--B\r\nContent-Type: text/html;\r\n\r\n<p>one</p>\r\n--B\r\nContent-Type: image/jpeg;\r\n\r\nJPEG\r\n--B\r\nContent-Type: text/html;\r\n\r\n<p>two</p>\r\n");
        let out = strip_attachments(&raw, &StripConfig::default()).expect("strip");
        assert_eq!(out.cut, CutKind::Delimiter);
        assert_eq!(
            out.warnings,
            vec![StripWarning::TrailingTextDropped { token: "--B".into() }]
        );
        assert!(out.raw.ends_with(b"<p>one</p><br><br>[Attachments stripped and downloaded]"));
    }

    #[test]
    fn test_body_candidate_chunks() {
        let mut raw = vec![b'x'; 4500];
        raw[2100..2109].copy_from_slice(b"text/html");
        assert_eq!(body_candidate_chunks(&raw), vec![2000]);
        assert!(body_candidate_chunks(b"nothing here").is_empty());
    }

    #[test]
    fn test_custom_threshold_triggers_secondary_pass() {
        let raw = message(
            "--A\r\nContent-Type: image/jpeg;\r\n\r\nJPEGJPEGJPEG\r\n--A\r\nContent-Type: text/html;\r\n\r\n<p>hi</p>\r\n--A--\r\n",
        );
        let config = StripConfig::new(&["image/jpeg".to_string()], 16, DEFAULT_MARKER).expect("config");
        let out = strip_attachments(&raw, &config).expect("strip");
        let report = out.excision.expect("secondary pass ran");
        assert_eq!(report.sections, 1);
        assert!(find_bytes(&out.raw, b"image/jpeg", 0).is_none());
        // Headers alone exceed the tiny threshold.
        assert!(matches!(
            out.warnings.last(),
            Some(StripWarning::OversizedAfterBothPasses { .. })
        ));
    }

    #[test]
    fn test_empty_marker_rejected() {
        assert!(StripConfig::new(&["image/jpeg".to_string()], 10, "").is_err());
    }
}
