//! Error types for exif-io

use std::io;

/// Result type for exif-io operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during EXIF I/O operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid file format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Invalid segment or chunk
    #[error("Invalid segment at offset {offset}: {reason}")]
    InvalidSegment { offset: u64, reason: String },

    /// Operation not supported for this source or container kind
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Stored byte offsets were invalidated by a save
    #[error("Stale state: {0}")]
    Stale(String),

    /// Malformed caller-supplied value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Whether this error is a format-level problem (bad signature, bad
    /// marker, truncation, CRC mismatch). Format errors found while locating
    /// metadata during the initial parse are downgraded to "no metadata".
    ///
    /// An unexpected end of file counts: a truncated segment is a format
    /// defect of the file, not an I/O failure of the source.
    pub fn is_format_error(&self) -> bool {
        match self {
            Error::InvalidFormat(_) | Error::InvalidSegment { .. } => true,
            Error::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}
