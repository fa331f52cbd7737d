//! Trash ledger of an MBOX mailbox.
//!
//! Trashing never rewrites the mailbox. The message is copied into a sibling
//! MBOX (`<mbox>.trash`) and its offset recorded in a JSON ledger next to the
//! mailbox (`.<mbox>.mailstrip-trash.json`). Deleting the ledger restores
//! every trashed message.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StripError};
use crate::model::mail::MessageEntry;

const LEDGER_VERSION: u32 = 1;

/// One trashed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashRecord {
    pub offset: u64,
    pub message_id: String,
    pub trashed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    records: Vec<TrashRecord>,
}

/// In-memory view of the ledger of one mailbox.
#[derive(Debug)]
pub struct TrashLedger {
    path: PathBuf,
    records: Vec<TrashRecord>,
    offsets: HashSet<u64>,
}

impl TrashLedger {
    /// Load the ledger for `mbox_path`. A missing ledger is an empty one.
    pub fn load(mbox_path: &Path) -> Result<Self> {
        let path = ledger_path_for(mbox_path);
        let records = match std::fs::read(&path) {
            Ok(data) => {
                let file: LedgerFile =
                    serde_json::from_slice(&data).map_err(|e| StripError::InvalidIndex {
                        path: path.clone(),
                        reason: format!("Trash ledger is not valid JSON: {e}"),
                    })?;
                if file.version != LEDGER_VERSION {
                    return Err(StripError::InvalidIndex {
                        path,
                        reason: format!("Unsupported trash ledger version {}", file.version),
                    });
                }
                file.records
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StripError::io(&path, e)),
        };

        debug!(path = %path.display(), count = records.len(), "Loaded trash ledger");
        let offsets = records.iter().map(|r| r.offset).collect();
        Ok(Self {
            path,
            records,
            offsets,
        })
    }

    /// Drop records that no longer point at the message they were made for.
    ///
    /// Returns the number of records dropped.
    pub fn reconcile(&mut self, entries: &[MessageEntry]) -> usize {
        let before = self.records.len();
        self.records.retain(|r| {
            let alive = entries
                .binary_search_by_key(&r.offset, |e| e.offset)
                .is_ok_and(|i| entries[i].message_id == r.message_id);
            if !alive {
                warn!(
                    offset = r.offset,
                    message_id = %r.message_id,
                    "Trash record does not match the mailbox any more"
                );
            }
            alive
        });
        self.offsets = self.records.iter().map(|r| r.offset).collect();
        before - self.records.len()
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.offsets.contains(&offset)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TrashRecord] {
        &self.records
    }

    /// Record a trashed message and persist the ledger.
    pub fn record(&mut self, entry: &MessageEntry) -> Result<()> {
        if !self.offsets.insert(entry.offset) {
            return Ok(());
        }
        self.records.push(TrashRecord {
            offset: entry.offset,
            message_id: entry.message_id.clone(),
            trashed_at: Utc::now(),
        });
        self.save()
    }

    fn save(&self) -> Result<()> {
        let file = LedgerFile {
            version: LEDGER_VERSION,
            records: self.records.clone(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| StripError::io(&self.path, e.into()))?;
        std::fs::write(&self.path, json).map_err(|e| StripError::io(&self.path, e))
    }
}

/// Example: `/data/mail.mbox` → `/data/.mail.mbox.mailstrip-trash.json`
pub fn ledger_path_for(mbox_path: &Path) -> PathBuf {
    let filename = mbox_path.file_name().unwrap_or_default().to_string_lossy();
    mbox_path.with_file_name(format!(".{filename}.mailstrip-trash.json"))
}

/// Example: `/data/mail.mbox` → `/data/mail.mbox.trash`
pub fn trash_mbox_path_for(mbox_path: &Path) -> PathBuf {
    let filename = mbox_path.file_name().unwrap_or_default().to_string_lossy();
    mbox_path.with_file_name(format!("{filename}.trash"))
}
