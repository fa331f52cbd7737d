//! A local MBOX file exposed as a searchable, mutable mailbox.
//!
//! Message ids are the byte offsets of the messages' `From ` separator lines.
//! Inserts append to the file and trashing is recorded in a ledger, so ids of
//! existing messages never change.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Result, StripError};
use crate::index::builder;
use crate::model::mail::{FetchedMessage, MessageEntry, MessageId};
use crate::parser::{header, mbox, mime};
use crate::search;

use super::trash::{self, TrashLedger};
use super::{
    InsertRequest, InternalDateSource, MessageFetch, MessageMutations, MessageSearch,
    SearchListing,
};

const THREAD_HEADER: &str = "X-GM-THRID";
const LABELS_HEADER: &str = "X-Gmail-Labels";

pub struct Mailbox {
    path: PathBuf,
    /// Ordered by offset.
    entries: Vec<MessageEntry>,
    trash: TrashLedger,
}

impl Mailbox {
    /// Open a mailbox, loading its index or building it when missing or stale.
    pub fn open(
        path: impl AsRef<Path>,
        force_reindex: bool,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entries = builder::build_index(&path, force_reindex, progress)?;
        entries.sort_by_key(|e| e.offset);

        let mut trash = TrashLedger::load(&path)?;
        let dropped = trash.reconcile(&entries);
        if dropped > 0 {
            warn!(dropped, "Ignoring trash records that no longer match the mailbox");
        }

        info!(
            path = %path.display(),
            messages = entries.len(),
            trashed = trash.len(),
            "Mailbox opened"
        );
        Ok(Self {
            path,
            entries,
            trash,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every indexed message, trashed ones included.
    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    /// Number of messages not in the trash.
    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !self.trash.contains(e.offset))
            .count()
    }

    pub fn is_trashed(&self, id: &MessageId) -> bool {
        id.0.parse::<u64>().is_ok_and(|o| self.trash.contains(o))
    }

    /// Resolve an id to its live entry.
    pub fn entry(&self, id: &MessageId) -> Result<&MessageEntry> {
        let offset: u64 = id
            .0
            .parse()
            .map_err(|_| StripError::InvalidMessageId(id.0.clone()))?;
        let idx = self
            .entries
            .binary_search_by_key(&offset, |e| e.offset)
            .map_err(|_| StripError::MessageNotFound(id.0.clone()))?;
        if self.trash.contains(offset) {
            return Err(StripError::MessageNotFound(id.0.clone()));
        }
        Ok(&self.entries[idx])
    }

    fn read_framed(&self, entry: &MessageEntry) -> Result<Vec<u8>> {
        mbox::MboxParser::read_message_at(&self.path, entry.offset, entry.length)
    }
}

impl MessageSearch for Mailbox {
    fn search(&self, query: &str) -> Result<SearchListing> {
        let (_, matches) = search::execute(&self.entries, query);
        let ids: Vec<MessageId> = matches
            .into_iter()
            .map(|i| &self.entries[i])
            .filter(|e| !self.trash.contains(e.offset))
            .map(|e| MessageId(e.offset.to_string()))
            .collect();

        debug!(query, count = ids.len(), "Search finished");
        Ok(SearchListing {
            result_size_estimate: ids.len(),
            ids,
        })
    }
}

impl MessageFetch for Mailbox {
    fn fetch(&self, id: &MessageId) -> Result<FetchedMessage> {
        let entry = self.entry(id)?;
        let raw = mbox::unframe_message(&self.read_framed(entry)?);

        let attachments = match mime::extract_attachments(&raw) {
            Ok(atts) => atts,
            Err(e) => {
                warn!(id = %id, error = %e, "Could not decode attachments");
                Vec::new()
            }
        };

        Ok(FetchedMessage {
            id: id.clone(),
            raw,
            date: entry.date,
            subject: entry.subject.clone(),
            thread_id: entry.thread_key().to_string(),
            label_ids: entry.labels.clone(),
            attachments,
        })
    }
}

impl MessageMutations for Mailbox {
    fn insert(&mut self, request: &InsertRequest) -> Result<MessageId> {
        let decoded = request.decode_raw()?;
        let thread = (!request.thread_id.is_empty()).then_some(request.thread_id.as_str());
        let labels = request.label_ids.join(",");
        let labels = (!labels.is_empty()).then_some(labels.as_str());

        let raw = set_header(&decoded, THREAD_HEADER, thread);
        let raw = set_header(&raw, LABELS_HEADER, labels);

        let date = match request.internal_date_source {
            InternalDateSource::DateHeader => header::raw_header_value(&raw, "date")
                .and_then(|d| header::parse_date(&d))
                .unwrap_or_else(Utc::now),
            InternalDateSource::ReceivedTime => Utc::now(),
        };
        let sender = header::raw_header_value(&raw, "from")
            .map(|f| envelope_sender(&f))
            .unwrap_or_default();
        let framed = mbox::frame_message(&raw, &sender, date);

        let offset = append_framed(&self.path, &framed)?;

        let header_end = header::find_header_end(&framed).unwrap_or(framed.len());
        let entry = header::parse_headers_to_entry(
            &framed[..header_end],
            offset,
            framed.len() as u64,
            self.entries.len() as u64,
        )?;
        info!(offset, subject = %entry.subject, "Message inserted");
        self.entries.push(entry);

        if let Err(e) = builder::write_index(&self.path, &self.entries) {
            warn!(error = %e, "Could not refresh index after insert");
        }

        Ok(MessageId(offset.to_string()))
    }

    fn trash(&mut self, id: &MessageId) -> Result<()> {
        let entry = self.entry(id)?.clone();
        let framed = self.read_framed(&entry)?;

        append_framed(&trash::trash_mbox_path_for(&self.path), &framed)?;
        self.trash.record(&entry)?;

        info!(offset = entry.offset, subject = %entry.subject, "Message trashed");
        Ok(())
    }
}

/// Append an already framed message, keeping a blank line before its
/// separator. Returns the offset the message starts at.
fn append_framed(path: &Path, framed: &[u8]) -> Result<u64> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| StripError::io(path, e))?;

    let size = file.metadata().map_err(|e| StripError::io(path, e))?.len();
    let padding = separator_padding(&mut file, size).map_err(|e| StripError::io(path, e))?;

    file.write_all(padding)
        .and_then(|_| file.write_all(framed))
        .and_then(|_| file.flush())
        .map_err(|e| StripError::io(path, e))?;

    Ok(size + padding.len() as u64)
}

/// Newlines needed so that the next `From ` line follows a blank line.
fn separator_padding(file: &mut File, size: u64) -> std::io::Result<&'static [u8]> {
    const NONE: &[u8] = b"";
    const ONE: &[u8] = b"\n";
    const TWO: &[u8] = b"\n\n";

    if size == 0 {
        return Ok(NONE);
    }
    let tail_len = size.min(3);
    file.seek(SeekFrom::Start(size - tail_len))?;
    let mut tail = vec![0u8; tail_len as usize];
    file.read_exact(&mut tail)?;

    Ok(if tail == b"\n" || tail.ends_with(b"\n\n") || tail.ends_with(b"\n\r\n") {
        NONE
    } else if tail.ends_with(b"\n") {
        ONE
    } else {
        TWO
    })
}

/// Replace every occurrence of a header (folded continuations included)
/// with a single `name: value` line, or remove it when `value` is `None`.
fn set_header(raw: &[u8], name: &str, value: Option<&str>) -> Vec<u8> {
    let header_end = header::find_header_end(raw).unwrap_or(raw.len());
    let (head, body) = raw.split_at(header_end);
    let newline: &[u8] = if head.contains(&b'\r') { b"\r\n" } else { b"\n" };

    let mut out = Vec::with_capacity(raw.len() + name.len() + 64);
    let mut skipping = false;
    for line in head.split_inclusive(|&b| b == b'\n') {
        let continuation = line.first().is_some_and(|&b| b == b' ' || b == b'\t');
        if continuation && skipping {
            continue;
        }
        skipping = !continuation && is_header_named(line, name);
        if !skipping {
            out.extend_from_slice(line);
        }
    }

    if let Some(value) = value {
        if !out.is_empty() && !out.ends_with(b"\n") {
            out.extend_from_slice(newline);
        }
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        if body.is_empty() {
            out.extend_from_slice(newline);
        }
    } else if out.ends_with(b"\n") && !body.is_empty() {
        // find_header_end points at the newline ending the last header line
        out.truncate(out.len() - if out.ends_with(b"\r\n") { 2 } else { 1 });
    }

    out.extend_from_slice(body);
    out
}

fn is_header_named(line: &[u8], name: &str) -> bool {
    line.len() > name.len()
        && line[name.len()] == b':'
        && line[..name.len()].eq_ignore_ascii_case(name.as_bytes())
}

/// Bare address for the `From ` separator line.
fn envelope_sender(from: &str) -> String {
    let addr = match (from.find('<'), from.rfind('>')) {
        (Some(start), Some(end)) if start < end => &from[start + 1..end],
        _ => from.split_whitespace().find(|w| w.contains('@')).unwrap_or(""),
    };
    addr.chars().filter(|c| !c.is_whitespace()).collect()
}
