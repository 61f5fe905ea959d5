//! Library Error Types
//!
//! Errors from the lower crates are re-raised as one of these kinds, keeping
//! the full error tree underneath.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The catalog couldn't be opened or read; the session can't continue.
    #[display("catalog unavailable")]
    Catalog,
    /// The metadata side-cache couldn't be read or persisted; the session
    /// can't continue without risking the cache.
    #[display("metadata cache unusable")]
    Metadata,
    /// The companion sent a path that can't be stored.
    #[display("invalid book path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// Reading or writing a book file failed.
    #[display("book file error: {}", _0.display())]
    BookFile(#[error(not(source))] PathBuf),
    /// No book with this content ID is known.
    #[display("unknown book: {_0}")]
    UnknownBook(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BookFile(_))
    }
}
