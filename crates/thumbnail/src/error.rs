//! Thumbnail Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A thumbnail error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for thumbnail operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The cover sent by the companion isn't an image we can read.
    #[display("could not decode cover image")]
    Decode,
    #[display("could not encode cover thumbnail")]
    Encode,
    #[display("could not write cover thumbnail: {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Write(_))
    }
}
