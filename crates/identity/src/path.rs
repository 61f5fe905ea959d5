//! Library path validation.
//!
//! Paths arrive from the companion application and end up joined onto the
//! storage root, so they must never be allowed to leave it.

use crate::error::{ErrorKind, Result};
use regex::Regex;
use std::path::{Component, Path};
use std::sync::LazyLock;

/// Characters the firmware (or the FAT filesystem beneath it) chokes on.
static INVALID_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: static pattern, covered by tests.
    Regex::new(r#"[\\?%*:;|"'><$!]"#).unwrap()
});

/// Replace characters that are unsafe on the device's filesystem with `_`.
///
/// ```
/// use nickel_identity::sanitize_lpath;
/// assert_eq!(sanitize_lpath("Author/Why? Because!.epub"), "Author/Why_ Because_.epub");
/// ```
pub fn sanitize(lpath: &str) -> String {
    INVALID_CHARS.replace_all(lpath, "_").into_owned()
}

/// Validates an lpath for security and correctness, returning it normalized.
///
/// Ensures that paths don't escape the storage root (no `..` traversal),
/// rejects null bytes and paths that normalize to nothing.
///
/// ```
/// use nickel_identity::validate_lpath;
/// assert_eq!(validate_lpath("Author//./Title.epub").unwrap(), "Author/Title.epub");
/// assert!(validate_lpath("../etc/passwd").is_err());
/// ```
pub fn validate(lpath: &str) -> Result<String> {
    let mut components: Vec<&str> = Vec::new();
    for component in Path::new(lpath).components() {
        match component {
            Component::Normal(s) => {
                // Null bytes survive Path::components() but truncate the path
                // at the syscall.
                let Some(s) = s.to_str().filter(|s| !s.contains('\0')) else {
                    exn::bail!(ErrorKind::InvalidPath(lpath.to_string()));
                };
                components.push(s);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(lpath.to_string())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(lpath.to_string()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(lpath.to_string())),
        false => Ok(components.join("/")),
    }
}
