//! Binary index file format.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ HEADER (128 bytes, fixed)            │
//! │  magic: [u8; 8] = b"MSTRIDX\0"       │
//! │  version: u32                        │
//! │  message_count: u64                  │
//! │  mbox_file_size: u64                 │
//! │  mbox_modified_time: i64             │
//! │  sha256_first_4kb: [u8; 32]          │
//! │  (padding to 128 bytes)              │
//! ├──────────────────────────────────────┤
//! │ ENTRIES (variable)                   │
//! │  bincode-serialized Vec<MessageEntry>│
//! └──────────────────────────────────────┘
//! ```

pub const MAGIC: &[u8; 8] = b"MSTRIDX\0";

/// Bumped whenever [`MessageEntry`](crate::model::mail::MessageEntry) changes shape.
pub const VERSION: u32 = 1;

pub const HEADER_SIZE: usize = 128;

/// Number of leading MBOX bytes hashed for integrity checking.
pub const HASH_PREFIX_LEN: usize = 4096;

#[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IndexHeader {
    pub magic: [u8; 8],
    pub version: u32,
    pub message_count: u64,
    /// Size of the MBOX file when the index was built.
    pub mbox_file_size: u64,
    /// Modification time of the MBOX file (Unix seconds).
    pub mbox_modified_time: i64,
    pub sha256_first_4kb: [u8; 32],
}

impl IndexHeader {
    /// Validate magic and version.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.magic != *MAGIC {
            return Err("Invalid magic bytes".into());
        }
        if self.version != VERSION {
            return Err(format!(
                "Incompatible version: expected {VERSION}, found {}",
                self.version
            ));
        }
        Ok(())
    }

    /// Whether this header describes the MBOX in its current state.
    pub fn describes(&self, fingerprint: &IndexHeader) -> bool {
        self.mbox_file_size == fingerprint.mbox_file_size
            && self.mbox_modified_time == fingerprint.mbox_modified_time
            && self.sha256_first_4kb == fingerprint.sha256_first_4kb
    }
}
