//! Decoded attachments.

/// An attachment decoded from a fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename of the attachment. Generated if missing from the headers.
    pub filename: String,

    /// MIME content type (e.g. `"image/jpeg"`, `"application/pdf"`).
    pub content_type: String,

    /// `true` if the part is inline (embedded in HTML), `false` if a regular attachment.
    pub is_inline: bool,

    /// Decoded binary content.
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
