//! Message and file stores the batch processor talks to.
//!
//! The processor only sees the traits below. [`mailbox::Mailbox`] implements
//! the message side over a local MBOX file and [`folder::DirectoryStore`]
//! the file side over a directory tree.

pub mod folder;
pub mod mailbox;
pub mod trash;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Serialize;

use crate::error::Result;
use crate::model::mail::{FetchedMessage, MessageId};

/// Result of a mailbox search.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchListing {
    /// Matching message ids, newest first.
    pub ids: Vec<MessageId>,
    pub result_size_estimate: usize,
}

/// Where the internal date of an inserted message comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalDateSource {
    /// The message's own `Date:` header.
    DateHeader,
    /// The time of insertion.
    ReceivedTime,
}

/// A message to add to a mailbox.
#[derive(Debug, Clone, Serialize)]
pub struct InsertRequest {
    /// The full RFC 2822 message, URL-safe base64 encoded.
    pub raw: String,
    pub thread_id: String,
    pub label_ids: Vec<String>,
    pub internal_date_source: InternalDateSource,
}

impl InsertRequest {
    /// Build a request from raw message bytes.
    pub fn new(
        raw_message: &[u8],
        thread_id: impl Into<String>,
        label_ids: Vec<String>,
        internal_date_source: InternalDateSource,
    ) -> Self {
        Self {
            raw: URL_SAFE.encode(raw_message),
            thread_id: thread_id.into(),
            label_ids,
            internal_date_source,
        }
    }

    /// Decode the raw message. Padding is optional.
    pub fn decode_raw(&self) -> Result<Vec<u8>> {
        let trimmed = self.raw.trim().trim_end_matches('=');
        Ok(URL_SAFE_NO_PAD.decode(trimmed)?)
    }
}

/// Reference to a file created in a [`FileStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHandle {
    /// Store-specific identifier (a path for [`folder::DirectoryStore`]).
    pub id: String,
    /// Name the file was finally stored under.
    pub name: String,
    pub size: u64,
}

pub trait MessageSearch {
    fn search(&self, query: &str) -> Result<SearchListing>;
}

pub trait MessageFetch {
    fn fetch(&self, id: &MessageId) -> Result<FetchedMessage>;
}

pub trait MessageMutations {
    /// Add a message and return the id it was stored under.
    fn insert(&mut self, request: &InsertRequest) -> Result<MessageId>;

    /// Move a message to the trash.
    fn trash(&mut self, id: &MessageId) -> Result<()>;
}

pub trait FileStore {
    /// Create a new file. Existing files are never overwritten.
    fn create_file(&mut self, folder_id: &str, data: &[u8], name: &str) -> Result<FileHandle>;
}
