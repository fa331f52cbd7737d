//! Index construction, validation, and persistence.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::StripError;
use crate::index::format::{IndexHeader, HASH_PREFIX_LEN, HEADER_SIZE, MAGIC, VERSION};
use crate::model::mail::MessageEntry;
use crate::parser::header;
use crate::parser::mbox::MboxParser;

/// Build (or load) the index for an MBOX file.
///
/// 1. If a valid index already exists and `force_rebuild` is false, load it.
/// 2. Otherwise, parse headers of all messages and write a new index file.
pub fn build_index(
    mbox_path: &Path,
    force_rebuild: bool,
    progress: Option<&dyn Fn(u64, u64)>,
) -> anyhow::Result<Vec<MessageEntry>> {
    if !force_rebuild {
        if let Some(entries) = load_index(mbox_path)? {
            debug!(
                path = %mbox_path.display(),
                count = entries.len(),
                "Loaded existing index"
            );
            return Ok(entries);
        }
    }

    info!(path = %mbox_path.display(), "Building index");

    let parser = MboxParser::new(mbox_path)?;
    let mut entries: Vec<MessageEntry> = Vec::new();

    parser.parse_headers_only(
        &mut |offset, length, header_bytes| {
            let sequence = entries.len() as u64;
            match header::parse_headers_to_entry(header_bytes, offset, length, sequence) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(offset = offset, error = %e, "Skipping unparseable message");
                }
            }
            true
        },
        progress,
    )?;

    if let Err(e) = write_index(mbox_path, &entries) {
        warn!(error = %e, "Could not write index file; continuing without persistence");
    }

    Ok(entries)
}

/// Attempt to load an existing index. Returns `None` if the index is missing or stale.
pub fn load_index(mbox_path: &Path) -> anyhow::Result<Option<Vec<MessageEntry>>> {
    for idx_path in [index_path_for(mbox_path), cache_index_path_for(mbox_path)] {
        if idx_path.exists() {
            return load_index_from_file(&idx_path, mbox_path);
        }
    }
    Ok(None)
}

fn load_index_from_file(
    idx_path: &Path,
    mbox_path: &Path,
) -> anyhow::Result<Option<Vec<MessageEntry>>> {
    let data = std::fs::read(idx_path).map_err(|e| StripError::io(idx_path, e))?;

    if data.len() < HEADER_SIZE {
        debug!("Index file too small");
        return Ok(None);
    }

    let header: IndexHeader =
        bincode::deserialize(&data[..HEADER_SIZE]).map_err(|e| StripError::InvalidIndex {
            path: idx_path.to_path_buf(),
            reason: format!("Header deserialization failed: {e}"),
        })?;

    if let Err(reason) = header.validate() {
        debug!(reason = %reason, "Index header invalid");
        return Ok(None);
    }

    if !header.describes(&fingerprint(mbox_path, 0)?) {
        debug!("MBOX changed since the index was written");
        return Ok(None);
    }

    let entries: Vec<MessageEntry> =
        bincode::deserialize(&data[HEADER_SIZE..]).map_err(|e| StripError::InvalidIndex {
            path: idx_path.to_path_buf(),
            reason: format!("Entry deserialization failed: {e}"),
        })?;

    if entries.len() as u64 != header.message_count {
        debug!("Message count mismatch");
        return Ok(None);
    }

    Ok(Some(entries))
}

/// Header describing the MBOX file as it currently is on disk.
fn fingerprint(mbox_path: &Path, message_count: u64) -> anyhow::Result<IndexHeader> {
    let mbox_meta = std::fs::metadata(mbox_path).map_err(|e| StripError::io(mbox_path, e))?;

    let mbox_mtime = mbox_meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    Ok(IndexHeader {
        magic: *MAGIC,
        version: VERSION,
        message_count,
        mbox_file_size: mbox_meta.len(),
        mbox_modified_time: mbox_mtime,
        sha256_first_4kb: sha256_first_n(mbox_path, HASH_PREFIX_LEN)?,
    })
}

/// Write the index to disk, next to the MBOX or in the cache directory.
pub fn write_index(mbox_path: &Path, entries: &[MessageEntry]) -> anyhow::Result<()> {
    let header = fingerprint(mbox_path, entries.len() as u64)?;

    let header_bytes = bincode::serialize(&header)?;
    let entries_bytes = bincode::serialize(entries)?;

    let mut padded_header = vec![0u8; HEADER_SIZE];
    let copy_len = header_bytes.len().min(HEADER_SIZE);
    padded_header[..copy_len].copy_from_slice(&header_bytes[..copy_len]);

    let idx_path = index_path_for(mbox_path);
    match write_index_to_file(&idx_path, &padded_header, &entries_bytes) {
        Ok(()) => {
            info!(path = %idx_path.display(), count = entries.len(), "Index written");
            return Ok(());
        }
        Err(e) => {
            debug!(error = %e, "Cannot write index next to MBOX, trying cache dir");
        }
    }

    let cache_path = cache_index_path_for(mbox_path);
    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_index_to_file(&cache_path, &padded_header, &entries_bytes)?;
    info!(path = %cache_path.display(), "Index written to cache");
    Ok(())
}

fn write_index_to_file(path: &Path, header: &[u8], entries: &[u8]) -> anyhow::Result<()> {
    let mut file = File::create(path).map_err(|e| StripError::io(path, e))?;
    file.write_all(header).map_err(|e| StripError::io(path, e))?;
    file.write_all(entries)
        .map_err(|e| StripError::io(path, e))?;
    file.flush().map_err(|e| StripError::io(path, e))?;
    Ok(())
}

/// Compute SHA-256 of the first `n` bytes of a file.
fn sha256_first_n(path: &Path, n: usize) -> anyhow::Result<[u8; 32]> {
    let file = File::open(path).map_err(|e| StripError::io(path, e))?;
    let mut buf = Vec::with_capacity(n);
    file.take(n as u64)
        .read_to_end(&mut buf)
        .map_err(|e| StripError::io(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&buf);
    Ok(hasher.finalize().into())
}

/// Primary index path: hidden file next to the MBOX.
///
/// Example: `/data/mail.mbox` → `/data/.mail.mbox.mailstrip.idx`
pub fn index_path_for(mbox_path: &Path) -> PathBuf {
    let filename = mbox_path.file_name().unwrap_or_default().to_string_lossy();
    mbox_path.with_file_name(format!(".{filename}.mailstrip.idx"))
}

/// Fallback index path inside the user cache directory.
///
/// Example: `~/.cache/mailstrip/<sha256_of_path>.idx`
pub fn cache_index_path_for(mbox_path: &Path) -> PathBuf {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("mailstrip");

    let mut hasher = Sha256::new();
    hasher.update(mbox_path.to_string_lossy().as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    cache_dir.join(format!("{hash}.idx"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MBOX: &str = "From a@example.com Mon Jan  8 09:30:00 2018\n\
From: Ana <a@example.com>\n\
Subject: first\n\
Date: Mon, 8 Jan 2018 09:30:00 +0000\n\
\n\
hello\n\
\n\
From b@example.com Tue Jan  9 10:00:00 2018\n\
From: Bo <b@example.com>\n\
Subject: second\n\
Date: Tue, 9 Jan 2018 10:00:00 +0000\n\
\n\
bye\n";

    #[test]
    fn test_build_writes_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let mbox = dir.path().join("mail.mbox");
        std::fs::write(&mbox, MBOX).unwrap();

        let entries = build_index(&mbox, false, None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].subject, "second");
        assert_eq!(entries[1].sequence, 1);
        assert!(index_path_for(&mbox).exists());

        let reloaded = load_index(&mbox).unwrap().expect("fresh index");
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded[0].offset, 0);
        assert_eq!(reloaded[1].offset, entries[1].offset);
    }

    #[test]
    fn test_stale_index_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mbox = dir.path().join("mail.mbox");
        std::fs::write(&mbox, MBOX).unwrap();
        build_index(&mbox, false, None).unwrap();

        let mut grown = MBOX.to_string();
        grown.push_str("\nFrom c@example.com Wed Jan 10 10:00:00 2018\nSubject: third\n\nx\n");
        std::fs::write(&mbox, grown).unwrap();

        assert!(load_index(&mbox).unwrap().is_none());
        assert_eq!(build_index(&mbox, false, None).unwrap().len(), 3);
    }

    #[test]
    fn test_index_path_for() {
        let p = index_path_for(Path::new("/data/mail.mbox"));
        assert_eq!(p, PathBuf::from("/data/.mail.mbox.mailstrip.idx"));
    }
}
