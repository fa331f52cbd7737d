//! Batch processing: find large messages, save their attachments, and
//! replace them with stripped copies.
//!
//! Per message the order is fetch → strip → save attachments → insert →
//! trash. Stripping is pure, so a message the stripper rejects leaves both
//! stores untouched. Any error aborts the rest of the batch.

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AttachmentConfig, RunConfig};
use crate::model::mail::{FetchedMessage, MessageId};
use crate::store::{
    FileStore, InsertRequest, InternalDateSource, MessageFetch, MessageMutations, MessageSearch,
};
use crate::strip::{strip_attachments, StripConfig, StripWarning};

/// What one batch run should do.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub query: String,
    /// Folder id attachments are saved into.
    pub folder: String,
    /// Maximum number of messages to process, 0 for no limit.
    pub limit: usize,
    /// Search, fetch and strip only. Nothing is written.
    pub dry_run: bool,
}

impl From<&RunConfig> for BatchOptions {
    fn from(run: &RunConfig) -> Self {
        Self {
            query: run.query.clone(),
            folder: run.folder.clone(),
            limit: run.limit,
            dry_run: run.dry_run,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Attachments saved, stripped copy inserted, original trashed.
    Stripped,
    /// Dry run: the message would have been stripped.
    WouldStrip,
    /// The message already carries the marker and no attachment parts.
    AlreadyStripped,
}

/// Result for one message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageReport {
    pub id: MessageId,
    /// Id of the stripped copy, when one was inserted.
    pub new_id: Option<MessageId>,
    pub subject: String,
    pub outcome: Outcome,
    pub original_size: usize,
    pub stripped_size: usize,
    /// Names the attachments were (or would be) saved under.
    pub attachments: Vec<String>,
    pub warnings: Vec<StripWarning>,
}

/// Totals for a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub dry_run: bool,
    /// Messages the search returned.
    pub matched: usize,
    pub stripped: usize,
    pub already_stripped: usize,
    pub attachments_saved: usize,
    pub bytes_removed: u64,
    pub warnings: usize,
    pub messages: Vec<MessageReport>,
}

impl BatchReport {
    fn add(&mut self, report: MessageReport) {
        match report.outcome {
            Outcome::Stripped | Outcome::WouldStrip => {
                self.stripped += 1;
                self.bytes_removed +=
                    report.original_size.saturating_sub(report.stripped_size) as u64;
            }
            Outcome::AlreadyStripped => self.already_stripped += 1,
        }
        if report.outcome == Outcome::Stripped {
            self.attachments_saved += report.attachments.len();
        }
        self.warnings += report.warnings.len();
        self.messages.push(report);
    }
}

/// Runs batches with one immutable strip configuration.
pub struct Processor<'a> {
    strip: &'a StripConfig,
    naming: &'a AttachmentConfig,
    options: BatchOptions,
}

impl<'a> Processor<'a> {
    pub fn new(strip: &'a StripConfig, naming: &'a AttachmentConfig, options: BatchOptions) -> Self {
        Self {
            strip,
            naming,
            options,
        }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Process every message matching the query, newest first.
    ///
    /// `progress` receives `(done, total)` before each message and once at the end.
    pub fn run<M, F>(
        &self,
        mailbox: &mut M,
        files: &mut F,
        progress: Option<&dyn Fn(usize, usize)>,
    ) -> anyhow::Result<BatchReport>
    where
        M: MessageSearch + MessageFetch + MessageMutations,
        F: FileStore,
    {
        let listing = mailbox
            .search(&self.options.query)
            .with_context(|| format!("Search failed for query '{}'", self.options.query))?;

        let mut ids = listing.ids;
        if self.options.limit > 0 {
            ids.truncate(self.options.limit);
        }
        info!(
            query = %self.options.query,
            estimate = listing.result_size_estimate,
            selected = ids.len(),
            dry_run = self.options.dry_run,
            "Starting batch"
        );

        let mut report = BatchReport {
            dry_run: self.options.dry_run,
            matched: listing.result_size_estimate,
            ..Default::default()
        };

        let total = ids.len();
        for (i, id) in ids.iter().enumerate() {
            if let Some(cb) = progress {
                cb(i, total);
            }
            let message_report = self
                .process_one(mailbox, files, id)
                .with_context(|| format!("Aborting batch at message {id}"))?;
            report.add(message_report);
        }
        if let Some(cb) = progress {
            cb(total, total);
        }

        info!(
            stripped = report.stripped,
            already_stripped = report.already_stripped,
            attachments = report.attachments_saved,
            bytes_removed = report.bytes_removed,
            "Batch finished"
        );
        Ok(report)
    }

    /// Strip a single message.
    pub fn process_one<M, F>(
        &self,
        mailbox: &mut M,
        files: &mut F,
        id: &MessageId,
    ) -> anyhow::Result<MessageReport>
    where
        M: MessageFetch + MessageMutations,
        F: FileStore,
    {
        let message = mailbox.fetch(id)?;
        let stripped = strip_attachments(&message.raw, self.strip)
            .with_context(|| format!("Cannot strip message '{}'", message.subject))?;

        let names: Vec<String> = message
            .attachments
            .iter()
            .map(|att| {
                attachment_file_name(message.date, &message.subject, &att.filename, self.naming)
            })
            .collect();

        let mut report = MessageReport {
            id: id.clone(),
            new_id: None,
            subject: message.subject.clone(),
            outcome: Outcome::WouldStrip,
            original_size: stripped.original_len,
            stripped_size: stripped.raw.len(),
            attachments: Vec::new(),
            warnings: stripped.warnings.clone(),
        };

        if stripped.is_unchanged() {
            info!(id = %id, subject = %message.subject, "Already stripped, skipping");
            report.outcome = Outcome::AlreadyStripped;
            return Ok(report);
        }

        if self.options.dry_run {
            info!(
                id = %id,
                subject = %message.subject,
                before = stripped.original_len,
                after = stripped.raw.len(),
                "Would strip"
            );
            report.attachments = names;
            return Ok(report);
        }

        report.attachments = self.save_attachments(files, &message, &names)?;

        let request = InsertRequest::new(
            &stripped.raw,
            message.thread_id.clone(),
            message.label_ids.clone(),
            InternalDateSource::DateHeader,
        );
        let new_id = mailbox.insert(&request)?;
        mailbox.trash(id)?;

        for warning in &stripped.warnings {
            warn!(id = %id, subject = %message.subject, %warning, "Stripped with warning");
        }
        info!(
            id = %id,
            new_id = %new_id,
            subject = %message.subject,
            before = stripped.original_len,
            after = stripped.raw.len(),
            attachments = report.attachments.len(),
            "Message stripped"
        );

        report.outcome = Outcome::Stripped;
        report.new_id = Some(new_id);
        Ok(report)
    }

    fn save_attachments<F: FileStore>(
        &self,
        files: &mut F,
        message: &FetchedMessage,
        names: &[String],
    ) -> anyhow::Result<Vec<String>> {
        let mut saved = Vec::with_capacity(names.len());
        for (att, name) in message.attachments.iter().zip(names) {
            let handle = files
                .create_file(&self.options.folder, &att.data, name)
                .with_context(|| format!("Cannot save attachment '{}'", att.filename))?;
            saved.push(handle.name);
        }
        Ok(saved)
    }
}

/// `<timestamp> <subject> - <filename>`, the subject cut to the configured
/// number of characters.
pub fn attachment_file_name(
    date: DateTime<Utc>,
    subject: &str,
    filename: &str,
    naming: &AttachmentConfig,
) -> String {
    let timestamp = if naming.utc {
        date.format(&naming.timestamp_format).to_string()
    } else {
        date.with_timezone(&Local)
            .format(&naming.timestamp_format)
            .to_string()
    };

    let subject: String = subject.trim().chars().take(naming.subject_max_chars).collect();
    let subject = subject.trim_end();
    let subject = if subject.is_empty() {
        "(no subject)"
    } else {
        subject
    };

    format!("{timestamp} {subject} - {filename}")
}
