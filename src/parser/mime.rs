//! MIME decoding of attachments through `mail-parser`.

use mail_parser::{MessageParser, MimeHeaders};

use crate::error::{Result, StripError};
use crate::model::attachment::Attachment;

/// Decode every attachment of a raw message (headers + body, no MBOX framing).
///
/// Parts without a filename are named `attachment_<n>`.
pub fn extract_attachments(raw_message: &[u8]) -> Result<Vec<Attachment>> {
    let msg = MessageParser::default()
        .parse(raw_message)
        .ok_or_else(|| StripError::MimeError("Failed to parse message".into()))?;

    let mut result = Vec::new();

    for (idx, part) in msg.attachments().enumerate() {
        let filename = part
            .attachment_name()
            .map(String::from)
            .unwrap_or_else(|| format!("attachment_{idx}"));

        let content_type = part
            .content_type()
            .map(|ct: &mail_parser::ContentType| {
                let main = ct.ctype();
                match ct.subtype() {
                    Some(sub) => format!("{main}/{sub}"),
                    None => main.to_string(),
                }
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let is_inline = part
            .content_disposition()
            .map(|d: &mail_parser::ContentType| d.ctype().eq_ignore_ascii_case("inline"))
            .unwrap_or(false);

        result.push(Attachment {
            filename,
            content_type: content_type.to_lowercase(),
            is_inline,
            data: part.contents().to_vec(),
        });
    }

    Ok(result)
}
