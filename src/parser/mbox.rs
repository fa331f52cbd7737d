//! Streaming MBOX parser and MBOX framing helpers.
//!
//! Reads MBOX files line-by-line with a large buffer and never loads the
//! entire file into memory. Tolerant of malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{Result, StripError};

/// Size of the internal read buffer.
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Progress is reported every 4 MB.
const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

/// Streaming MBOX header scanner.
///
/// Tolerates mixed `\n` / `\r\n` line endings, `From ` lines not preceded by
/// a blank line (logs a warning), truncated messages at EOF and a UTF-8 BOM.
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
}

impl MboxParser {
    /// Create a parser for the given MBOX file.
    ///
    /// Verifies that the file exists and is readable, but does NOT validate
    /// that it is actually an MBOX.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StripError::FileNotFound(path.clone())
            } else {
                StripError::io(&path, e)
            }
        })?;
        Ok(Self {
            path,
            file_size: metadata.len(),
        })
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Scan the headers of each message.
    ///
    /// The callback receives `(offset, message_length, header_bytes)` where
    /// `header_bytes` starts with the `From ` separator line, and returns
    /// `false` to stop early. Returns the number of messages reported.
    pub fn parse_headers_only(
        &self,
        header_callback: &mut dyn FnMut(u64, u64, &[u8]) -> bool,
        progress_callback: Option<&dyn Fn(u64, u64)>,
    ) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| StripError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut current_offset: u64 = 0;
        let mut header_buf: Vec<u8> = Vec::with_capacity(16 * 1024);
        let mut in_headers = false;
        let mut prev_line_was_empty = true;
        let mut first_line = true;
        let mut last_progress: u64 = 0;
        let mut pending: Option<(u64, Vec<u8>)> = None;
        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line_buf.clear();
            let line_len = reader
                .read_until(b'\n', &mut line_buf)
                .map_err(|e| StripError::io(&self.path, e))? as u64;
            if line_len == 0 {
                break;
            }

            if is_mbox_separator(&line_buf) {
                if !first_line && !prev_line_was_empty {
                    warn!(
                        offset = current_offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }

                if let Some((start, headers)) = pending.take() {
                    if !header_callback(start, current_offset - start, &headers) {
                        return Ok(count);
                    }
                    count += 1;
                }

                header_buf.clear();
                header_buf.extend_from_slice(&line_buf);
                in_headers = true;
                pending = Some((current_offset, Vec::new()));
            } else if in_headers {
                if is_blank_line(&line_buf) {
                    in_headers = false;
                    if let Some((_, ref mut saved)) = pending {
                        std::mem::swap(saved, &mut header_buf);
                    }
                } else {
                    header_buf.extend_from_slice(&line_buf);
                }
            }

            prev_line_was_empty = is_blank_line(&line_buf);
            first_line = false;
            current_offset += line_len;

            if let Some(cb) = progress_callback {
                if current_offset - last_progress >= PROGRESS_INTERVAL {
                    cb(current_offset, self.file_size);
                    last_progress = current_offset;
                }
            }
        }

        // Flush last message (headers may run to EOF without a blank line)
        if let Some((start, mut headers)) = pending {
            if in_headers {
                headers = header_buf;
            }
            if header_callback(start, current_offset - start, &headers) {
                count += 1;
            }
        }

        if let Some(cb) = progress_callback {
            cb(self.file_size, self.file_size);
        }

        Ok(count)
    }

    /// Read a single message at the given offset and length.
    pub fn read_message_at(path: impl AsRef<Path>, offset: u64, length: u64) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| StripError::io(path, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| StripError::io(path, e))?;
        let mut buffer = vec![0u8; length as usize];
        file.read_exact(&mut buffer)
            .map_err(|e| StripError::io(path, e))?;
        Ok(buffer)
    }
}

/// Turn MBOX-framed message bytes into a bare RFC 2822 message.
///
/// Drops the `From ` separator line and the blank line that separates the
/// message from the next one, and un-escapes `>From ` body lines.
pub fn unframe_message(framed: &[u8]) -> Vec<u8> {
    let mut body = framed;
    if is_mbox_separator(body) {
        body = match body.iter().position(|&b| b == b'\n') {
            Some(pos) => &body[pos + 1..],
            None => &[],
        };
    }
    if body.ends_with(b"\r\n\r\n") {
        body = &body[..body.len() - 2];
    } else if body.ends_with(b"\n\n") {
        body = &body[..body.len() - 1];
    }

    let mut out = Vec::with_capacity(body.len());
    for line in body.split_inclusive(|&b| b == b'\n') {
        match line.strip_prefix(b">") {
            Some(rest) if rest.starts_with(b"From ") => out.extend_from_slice(rest),
            _ => out.extend_from_slice(line),
        }
    }
    out
}

/// Frame a bare message for appending to an MBOX file.
///
/// Writes the `From ` separator, escapes body lines starting with `From `,
/// and terminates the message with a blank line.
pub fn frame_message(raw: &[u8], sender: &str, date: DateTime<Utc>) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + 128);
    out.extend_from_slice(separator_line(sender, date).as_bytes());

    for line in raw.split_inclusive(|&b| b == b'\n') {
        if line.starts_with(b"From ") {
            out.push(b'>');
        }
        out.extend_from_slice(line);
    }

    let crlf = raw.windows(2).any(|w| w == b"\r\n");
    let newline: &[u8] = if crlf { b"\r\n" } else { b"\n" };
    if !out.ends_with(b"\n") {
        out.extend_from_slice(newline);
    }
    out.extend_from_slice(newline);
    out
}

/// `From sender Mon Jan  8 09:30:00 2018` (asctime date).
pub fn separator_line(sender: &str, date: DateTime<Utc>) -> String {
    let sender = if sender.trim().is_empty() {
        "MAILER-DAEMON"
    } else {
        sender.trim()
    };
    format!("From {sender} {}\n", date.format("%a %b %e %H:%M:%S %Y"))
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
