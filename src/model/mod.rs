//! Data model: index entries, fetched messages, attachments.

pub mod attachment;
pub mod mail;
