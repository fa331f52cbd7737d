//! Email parsing: MBOX streaming and framing, header decoding, and MIME attachments.

pub mod header;
pub mod mbox;
pub mod mime;
