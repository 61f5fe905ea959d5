//! Metadata Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A metadata error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file exists but could not be read.
    #[display("could not read {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    /// The file (or its parent directories) could not be written.
    #[display("could not write {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
    /// The file is not empty, but it isn't what we expect either. Somebody
    /// (or an interrupted write) has mangled it; don't guess what it meant.
    #[display("corrupt metadata file: {}", _0.display())]
    Corrupt(#[error(not(source))] PathBuf),
    /// Metadata could not be serialized.
    #[display("could not serialize metadata")]
    Serialize,
    /// The book is not a readable package (not a ZIP, or missing its
    /// container/package documents).
    #[display("invalid book package: {}", _0.display())]
    InvalidPackage(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Write(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(
            ErrorKind::Corrupt(PathBuf::from("/mnt/onboard/metadata.calibre")).to_string(),
            "corrupt metadata file: /mnt/onboard/metadata.calibre"
        );
        assert_eq!(ErrorKind::Serialize.to_string(), "could not serialize metadata");
    }

    #[test]
    fn retryable() {
        assert!(ErrorKind::Read(PathBuf::new()).is_retryable());
        assert!(!ErrorKind::Corrupt(PathBuf::new()).is_retryable());
    }
}
