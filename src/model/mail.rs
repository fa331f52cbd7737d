//! Core message types.

use std::fmt;

use chrono::{DateTime, Utc};

use super::attachment::Attachment;

/// Compact metadata for a single message, stored in the binary index.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageEntry {
    /// Byte offset of the message start inside the MBOX file
    /// (points to the `From ` separator line).
    pub offset: u64,

    /// Total byte length of the message (from `From ` to next separator or EOF).
    pub length: u64,

    /// Parsed date from the `Date:` header, falling back to Unix epoch.
    pub date: DateTime<Utc>,

    /// Decoded `From:` header.
    pub from: String,

    /// Decoded `To:` header.
    pub to: String,

    /// Decoded subject line (RFC 2047 encoded-words resolved).
    pub subject: String,

    /// The `Message-ID` header value.
    pub message_id: String,

    /// Gmail thread id (`X-GM-THRID`), empty when absent.
    pub thread_id: String,

    /// Gmail labels from the `X-Gmail-Labels` header.
    pub labels: Vec<String>,

    /// Whether the message looks like it carries attachments
    /// (`multipart/mixed` or an attachment disposition in the top headers).
    pub has_attachments: bool,

    /// Top-level `Content-Type` of the message.
    pub content_type: String,

    /// Sequential index within the MBOX (0, 1, 2, …).
    pub sequence: u64,
}

impl MessageEntry {
    /// Thread identifier to use when re-inserting: the Gmail thread id when
    /// known, the Message-ID otherwise.
    pub fn thread_key(&self) -> &str {
        if self.thread_id.is_empty() {
            &self.message_id
        } else {
            &self.thread_id
        }
    }
}

/// Opaque identifier of a message inside a message store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A full message as returned by a fetch.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub id: MessageId,
    /// Raw RFC 2822 message, without any MBOX framing.
    pub raw: Vec<u8>,
    pub date: DateTime<Utc>,
    pub subject: String,
    pub thread_id: String,
    pub label_ids: Vec<String>,
    /// Decoded attachments.
    pub attachments: Vec<Attachment>,
}
