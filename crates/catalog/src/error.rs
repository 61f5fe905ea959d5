//! Catalog Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The catalog database couldn't be opened; nothing can be reconciled.
    #[display("could not open catalog: {}", _0.display())]
    Open(#[error(not(source))] PathBuf),
    /// Reading from the catalog failed.
    #[display("catalog query failed")]
    Query,
    /// Writing to the catalog failed (the firmware may be holding a lock).
    #[display("catalog write failed")]
    Write,
    /// A value couldn't be converted to or from its catalog representation.
    #[display("invalid catalog data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Write)
    }
}
