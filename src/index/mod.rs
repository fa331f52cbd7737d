//! Persistent header index of an MBOX file.

pub mod builder;
pub mod format;
