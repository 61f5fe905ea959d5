//! Identity mapping between the companion's library-relative paths ("lpaths")
//! and the firmware catalog's content identifiers.
//!
//! Everything in this crate is pure: no I/O, no logging. A content ID is the
//! storage prefix followed by the lpath, except for kepubs: the companion
//! calls them `Foo/Bar.kepub` while the file (and therefore the catalog row)
//! is `Foo/Bar.kepub.epub`.
//!
//! ```
//! use nickel_identity::{ContentId, Storage};
//! let id = ContentId::from_lpath("Foo/Bar.kepub", Storage::Onboard);
//! assert_eq!(id.as_str(), "file:///mnt/onboard/Foo/Bar.kepub.epub");
//! assert_eq!(id.to_lpath(Storage::Onboard), "Foo/Bar.kepub");
//! ```

pub mod error;
mod path;

pub use crate::path::{sanitize as sanitize_lpath, validate as validate_lpath};
use std::fmt;
use std::path::{Path, PathBuf};

/// Extension the companion uses for device-repackaged books.
pub const KEPUB_EXTENSION: &str = ".kepub";
/// Marker the firmware appends to a kepub's file name.
pub const KEPUB_MARKER: &str = ".epub";

/// Which storage the session is managing books on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Storage {
    /// Internal storage, mounted at `/mnt/onboard`.
    #[default]
    Onboard,
    /// External SD card, mounted at `/mnt/sd`.
    SdCard,
}
impl Storage {
    /// Prefix every catalog content ID on this storage starts with.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Onboard => "file:///mnt/onboard/",
            Self::SdCard => "file:///mnt/sd/",
        }
    }

    /// Directory (relative to the storage root) the firmware reads cover
    /// thumbnails from.
    pub fn images_dir(&self) -> &'static str {
        match self {
            Self::Onboard => ".kobo-images",
            Self::SdCard => "koboExtStorage/images-cache",
        }
    }

    /// Location code reported to the companion in the device info file.
    pub fn location_code(&self) -> &'static str {
        match self {
            Self::Onboard => "main",
            Self::SdCard => "A",
        }
    }
}

/// A catalog content identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId(String);
impl ContentId {
    /// Wrap a raw identifier, as found in the catalog.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Map an lpath to its content ID on the given storage.
    ///
    /// A leading `/` is ignored, and kepubs gain the `.epub` marker.
    pub fn from_lpath(lpath: impl AsRef<str>, storage: Storage) -> Self {
        let lpath = lpath.as_ref().trim_start_matches('/');
        let mut id = String::with_capacity(storage.prefix().len() + lpath.len() + KEPUB_MARKER.len());
        id.push_str(storage.prefix());
        id.push_str(lpath);
        if lpath.ends_with(KEPUB_EXTENSION) {
            id.push_str(KEPUB_MARKER);
        }
        Self(id)
    }

    /// Map this content ID back to an lpath.
    ///
    /// An identifier that does not start with the storage prefix is returned
    /// unchanged: it's not something this crate knows how to map, and the
    /// caller is better placed to decide whether that matters.
    pub fn to_lpath(&self, storage: Storage) -> String {
        match self.0.strip_prefix(storage.prefix()) {
            Some(relative) => Self::strip_kepub_marker(relative).to_string(),
            None => self.0.clone(),
        }
    }

    /// Absolute path of the book file under the given storage root.
    pub fn book_path(&self, root: impl AsRef<Path>, storage: Storage) -> PathBuf {
        let relative = self.0.strip_prefix(storage.prefix()).unwrap_or(&self.0);
        root.as_ref().join(relative.trim_start_matches('/'))
    }

    /// Whether this content ID refers to a device-repackaged (kepub) book.
    pub fn is_kepub(&self) -> bool {
        self.0.ends_with(".kepub.epub")
    }

    /// Identifier the firmware uses to name cover images for this book.
    pub fn image_id(&self) -> String {
        self.0.replace(['/', ' ', ':', '.'], "_")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    fn strip_kepub_marker(relative: &str) -> &str {
        match relative.strip_suffix(KEPUB_MARKER) {
            Some(stripped) if stripped.ends_with(KEPUB_EXTENSION) => stripped,
            _ => relative,
        }
    }
}
impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
impl From<String> for ContentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
