//! Identity Error Types
//!
//! Structured errors using `exn` for automatic location tracking, the same
//! shape every crate in this workspace uses.

use derive_more::{Display, Error};

/// An identity error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for identity operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Path contains invalid characters, is empty, or escapes the library root.
    #[display("invalid library path: {_0}")]
    InvalidPath(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Paths don't get any more valid by trying again.
        false
    }
}
