//! Centralized error types for mailstrip.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailstrip library.
#[derive(Error, Debug)]
pub enum StripError {
    /// Neither an HTML nor a plain-text part header was found.
    #[error("No HTML or plain-text body boundary found in message")]
    NoBodyBoundaryFound,

    /// The body part's boundary token never recurs after the part header.
    #[error("End boundary '{token}' not found after the body part")]
    NoEndBoundaryFound { token: String },

    /// A strip pattern or its inputs are invalid.
    #[error("Invalid strip pattern: {0}")]
    InvalidPattern(String),

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The index file is corrupt or was built with an incompatible version.
    #[error("Corrupt or incompatible index for '{path}': {reason}")]
    InvalidIndex { path: PathBuf, reason: String },

    /// No message with this identifier exists (or it is in the trash).
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// The identifier cannot belong to this store.
    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),

    /// The raw message of an insert request is not valid URL-safe base64.
    #[error("Invalid base64 message payload: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    /// A MIME decoding error.
    #[error("MIME decoding error: {0}")]
    MimeError(String),

    /// An invalid path or file name was provided.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Convenience alias for `Result<T, StripError>`.
pub type Result<T> = std::result::Result<T, StripError>;

impl StripError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// `true` for the conditions that mean the message shape was not anticipated.
    pub fn is_unexpected_structure(&self) -> bool {
        matches!(
            self,
            Self::NoBodyBoundaryFound | Self::NoEndBoundaryFound { .. }
        )
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `StripError::io`).
impl From<std::io::Error> for StripError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
