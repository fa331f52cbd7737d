//! Secondary pass: cut attachment sections out of an oversized result.
//!
//! Some producers (Apple Mail in particular) reuse one boundary token for the
//! text parts and the attachments, so the primary cut can leave attachment
//! bytes in place. This pass removes every allowed attachment section it can
//! delimit, one at a time, restarting the search after each removal.
//!
//! This is best-effort: no published standard describes the reused-token layout.

use tracing::{debug, warn};

use super::pattern::PartPatterns;
use super::truncate::find_delimiter;
use super::StripWarning;

/// Outcome of the secondary pass.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ExcisionReport {
    /// Size before the pass.
    pub before: usize,
    /// Size after the pass.
    pub after: usize,
    /// Number of attachment sections removed.
    pub sections: usize,
}

/// Remove attachment sections from `text` in place.
///
/// Each section runs from just after the line ending that precedes its
/// boundary line to the next line-anchored occurrence of the same token, which
/// is kept so the following part stays delimited. Stops with a warning when a
/// section has no closing occurrence.
pub fn excise_attachments(
    text: &mut Vec<u8>,
    patterns: &PartPatterns,
) -> (ExcisionReport, Option<StripWarning>) {
    let before = text.len();
    let mut sections = 0;
    let mut warning = None;

    while let Some(part) = patterns.find_attachment(text) {
        // `end` is exclusive: the search starts on the first byte past the match.
        let Some(next) = find_delimiter(text, part.token.as_bytes(), part.end) else {
            warn!(
                token = %part.token,
                offset = part.start,
                "Couldn't find an end boundary for attachment section"
            );
            warning = Some(StripWarning::AttachmentEndBoundaryMissing {
                token: part.token.clone(),
                offset: part.start,
            });
            break;
        };

        let from = part.token_start();
        debug!(from, to = next, category = ?part.category, "Stripping attachment section");
        text.drain(from..next);
        sections += 1;
    }

    let report = ExcisionReport {
        before,
        after: text.len(),
        sections,
    };
    debug!(?report, "Secondary pass finished");
    (report, warning)
}
