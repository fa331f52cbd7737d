//! Integration tests for attachment stripping.

use std::path::{Path, PathBuf};

use mailstrip::error::StripError;
use mailstrip::strip::truncate::CutKind;
use mailstrip::strip::{
    body_candidate_chunks, strip_attachments, BodyKind, StripConfig, StripWarning,
    DEFAULT_MARKER, DEFAULT_SIZE_THRESHOLD,
};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

const HEADERS: &str = "From: ana@example.com\r\n\
To: bo@example.com\r\n\
Subject: photos\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"B\"\r\n\
\r\n";

// ─── Single HTML part followed by an attachment ─────────────────────

#[test]
fn test_html_then_attachment_exact_output() {
    let raw = format!(
        "{HEADERS}--B\r\nContent-Type: text/html;\r\n\r\n<p>hi</p>\r\n--B\r\nContent-Type: image/jpeg;\r\n\r\n\u{1}\u{2}binary\u{3}\r\n--B--"
    );
    let out = strip_attachments(raw.as_bytes(), &StripConfig::default()).unwrap();

    let expected = format!(
        "{HEADERS}--B\r\nContent-Type: text/html;\r\n\r\n<p>hi</p><br><br>[Attachments stripped and downloaded]"
    );
    assert_eq!(String::from_utf8_lossy(&out.raw), expected);
    assert_eq!(out.body, BodyKind::Html);
    assert_eq!(out.boundary, "--B");
    assert_eq!(out.cut, CutKind::Delimiter);
    assert!(out.excision.is_none());
    assert!(out.warnings.is_empty());
}

#[test]
fn test_second_run_is_identical() {
    let raw = format!(
        "{HEADERS}--B\r\nContent-Type: text/html;\r\n\r\n<p>hi</p>\r\n--B\r\nContent-Type: image/jpeg;\r\n\r\nJPEG\r\n--B--"
    );
    let config = StripConfig::default();
    let once = strip_attachments(raw.as_bytes(), &config).unwrap();
    let twice = strip_attachments(&once.raw, &config).unwrap();

    assert_eq!(twice.raw, once.raw);
    assert!(twice.is_unchanged());
    assert_eq!(twice.cut, CutKind::AlreadyStripped);
    assert_eq!(twice.bytes_removed(), 0);
}

#[test]
fn test_fixture_html_message() {
    let raw = std::fs::read(fixture("html_with_attachment.eml")).unwrap();
    let out = strip_attachments(&raw, &StripConfig::default()).unwrap();

    assert_eq!(out.boundary, "----=_715b.68");
    assert!(out.raw.len() < raw.len());
    assert!(!contains(&out.raw, b"application/pdf"));
    assert!(contains(&out.raw, b"<p>Scans attached.</p>"));
    assert!(out
        .raw
        .ends_with(b"<p>Scans attached.</p><br><br>[Attachments stripped and downloaded]"));

    // Everything before the kept part header is untouched
    let header_end = raw.windows(13).position(|w| w == b"----=_715b.68").unwrap();
    assert_eq!(&out.raw[..header_end], &raw[..header_end]);
}

#[test]
fn test_fixture_plain_message() {
    let raw = std::fs::read(fixture("plain_with_attachment.eml")).unwrap();
    let out = strip_attachments(&raw, &StripConfig::default()).unwrap();

    assert_eq!(out.body, BodyKind::Plain);
    assert_eq!(out.warnings, vec![StripWarning::NonHtmlBody]);
    assert!(!contains(&out.raw, b"application/pdf"));
    assert!(out
        .raw
        .ends_with(b"Signed copy attached.\r\n\r\n[Attachments stripped and downloaded]"));
}

#[test]
fn test_fixture_malformed_message() {
    let raw = std::fs::read(fixture("malformed.eml")).unwrap();
    let err = strip_attachments(&raw, &StripConfig::default()).unwrap_err();
    assert!(matches!(err, StripError::NoBodyBoundaryFound));
    assert!(err.is_unexpected_structure());
    assert_eq!(body_candidate_chunks(&raw), vec![0]);
}

// ─── Reused boundary tokens ─────────────────────────────────────────

fn reused_token_message(attachment_size: usize) -> Vec<u8> {
    let blob = "QUJD".repeat(attachment_size / 4);
    format!(
        "{HEADERS}--A\r\nContent-Type: image/jpeg;\r\n\r\n{blob}\r\n\
--A\r\nContent-Disposition: attachment;\r\nfilename=\"doc.pdf\"\r\nContent-Type: application/pdf;\r\n\r\n{blob}\r\n\
--A\r\nContent-Type: text/html;\r\n\r\n<p>see attached</p>\r\n--A--\r\n"
    )
    .into_bytes()
}

#[test]
fn test_reused_token_oversized_message() {
    let raw = reused_token_message(700 * 1024);
    assert!(raw.len() > DEFAULT_SIZE_THRESHOLD);

    let out = strip_attachments(&raw, &StripConfig::default()).unwrap();
    let report = out.excision.clone().expect("secondary pass ran");

    assert_eq!(report.sections, 2);
    assert!(report.after < report.before);
    assert!(out.raw.len() < DEFAULT_SIZE_THRESHOLD);
    assert!(!contains(&out.raw, b"image/jpeg"));
    assert!(!contains(&out.raw, b"application/pdf"));
    assert!(contains(&out.raw, b"<p>see attached</p>"));
    assert!(out.warnings.is_empty());
    assert!(out.raw.ends_with(DEFAULT_MARKER.as_bytes()));
}

#[test]
fn test_reused_token_below_threshold_keeps_attachments() {
    let raw = reused_token_message(64);
    let out = strip_attachments(&raw, &StripConfig::default()).unwrap();

    // Under the threshold the secondary pass does not run
    assert!(out.excision.is_none());
    assert!(contains(&out.raw, b"image/jpeg"));
    assert_eq!(out.cut, CutKind::Terminal);
}

fn related_message(blob: &str) -> Vec<u8> {
    format!(
        "From: ana@example.com\r\n\
Subject: trip\r\n\
Content-Type: multipart/mixed; boundary=\"X\"\r\n\
\r\n\
--X\r\nContent-Type: multipart/related; boundary=\"Y\"\r\n\r\n\
--Y\r\nContent-Type: text/html;\r\n\r\n<p>before</p>\r\n\
--Y\r\nContent-Disposition: inline;\r\nfilename=\"view.jpg\"\r\nContent-Type: image/jpeg;\r\n\r\n{blob}\r\n\
--Y\r\nContent-Type: text/html;\r\n\r\n<p>after image</p>\r\n\
--Y--\r\n\
--X--\r\n"
    )
    .into_bytes()
}

#[test]
fn test_text_after_shared_token_attachment_is_kept() {
    let raw = related_message("JPEG");
    let out = strip_attachments(&raw, &StripConfig::default()).unwrap();

    assert_eq!(out.cut, CutKind::Interleaved);
    assert!(out.warnings.is_empty());
    assert!(!contains(&out.raw, b"image/jpeg"));
    assert!(contains(&out.raw, b"<p>before</p>\r\n--Y\r\nContent-Type: text/html;"));
    assert!(out
        .raw
        .ends_with(b"<p>after image</p><br><br>[Attachments stripped and downloaded]"));

    let again = strip_attachments(&out.raw, &StripConfig::default()).unwrap();
    assert!(again.is_unchanged());
    assert_eq!(again.raw, out.raw);
}

#[test]
fn test_oversized_attachments_between_text_parts() {
    let blob = "QUJD".repeat(175 * 1024);
    let raw = format!(
        "{HEADERS}--A\r\nContent-Type: text/html;\r\n\r\n<p>first</p>\r\n\
--A\r\nContent-Type: image/jpeg;\r\n\r\n{blob}\r\n\
--A\r\nContent-Disposition: attachment;\r\nfilename=\"doc.pdf\"\r\nContent-Type: application/pdf;\r\n\r\n{blob}\r\n\
--A\r\nContent-Type: text/html;\r\n\r\n<p>second</p>\r\n--A--\r\n"
    )
    .into_bytes();
    assert!(raw.len() > DEFAULT_SIZE_THRESHOLD);

    let out = strip_attachments(&raw, &StripConfig::default()).unwrap();

    assert!(out.raw.len() < DEFAULT_SIZE_THRESHOLD);
    assert!(!contains(&out.raw, b"image/jpeg"));
    assert!(!contains(&out.raw, b"application/pdf"));
    assert!(contains(&out.raw, b"<p>first</p>"));
    assert!(contains(&out.raw, b"<p>second</p>"));
    assert!(out.warnings.is_empty());
    assert!(out.raw.ends_with(DEFAULT_MARKER.as_bytes()));
}

#[test]
fn test_unterminated_attachment_section_warns() {
    let blob = "QUJD".repeat(300 * 1024);
    let raw = format!(
        "{HEADERS}--A\r\nContent-Type: text/html;\r\n\r\n<p>x</p>\r\n\
--C\r\nContent-Type: image/jpeg;\r\n\r\n{blob}\r\n--A--\r\n"
    );
    let config = StripConfig::new(&["image/jpeg".to_string()], 1024, DEFAULT_MARKER).unwrap();
    let out = strip_attachments(raw.as_bytes(), &config).unwrap();

    // `--C` never recurs, so the section cannot be delimited
    assert_eq!(out.excision.expect("secondary pass ran").sections, 0);
    assert!(out.warnings.contains(&StripWarning::AttachmentEndBoundaryMissing {
        token: "--C".to_string(),
        offset: HEADERS.len() + "--A\r\nContent-Type: text/html;\r\n\r\n<p>x</p>\r".len(),
    }));
    assert!(matches!(
        out.warnings.last(),
        Some(StripWarning::OversizedAfterBothPasses { threshold: 1024, .. })
    ));
}

#[test]
fn test_attachment_before_body_is_excised() {
    let blob = "QUJD".repeat(300 * 1024);
    let raw = format!(
        "{HEADERS}--A\r\nContent-Type: image/jpeg;\r\n\r\n{blob}\r\n\
--A\r\nContent-Type: text/html;\r\n\r\n<p>x</p>\r\n--A--\r\n"
    );
    let config = StripConfig::new(&["image/jpeg".to_string()], 1024, DEFAULT_MARKER).unwrap();
    let out = strip_attachments(raw.as_bytes(), &config).unwrap();

    assert_eq!(out.excision.expect("secondary pass ran").sections, 1);
    assert!(out.raw.len() < 1024);
    assert!(out.warnings.is_empty());
    assert!(out.raw.ends_with(b"<p>x</p><br><br>[Attachments stripped and downloaded]"));
}

#[test]
fn test_custom_marker() {
    let raw = format!(
        "{HEADERS}--B\r\nContent-Type: text/html;\r\n\r\n<p>hi</p>\r\n--B--\r\n"
    );
    let config = StripConfig::new(&["image/png".to_string()], DEFAULT_SIZE_THRESHOLD, "[gone]").unwrap();
    let out = strip_attachments(raw.as_bytes(), &config).unwrap();
    assert!(out.raw.ends_with(b"<p>hi</p><br><br>[gone]"));
    assert_eq!(out.cut, CutKind::Terminal);
}
