//! `mailstrip`: strips attachment parts out of stored email messages.
//!
//! The core is [`strip::strip_attachments`], a boundary-aware heuristic that
//! keeps a message's headers and body part and drops the attachment parts
//! after it. [`process::Processor`] runs it over every message of a mailbox
//! that matches a search, saving the attachments to a file store first.

pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod parser;
pub mod process;
pub mod search;
pub mod store;
pub mod strip;
