//! Book metadata for the device library.
//!
//! The firmware catalog can only represent a handful of fields, so the
//! richer metadata the companion application knows about lives in a JSON
//! side-cache next to the books. This crate owns that side-cache and the
//! record type stored in it, along with the other small JSON files the
//! session persists.
//!
//! # Sources
//! - **[`Store`]**: the side-cache, loaded once per session and rewritten
//!   wholesale on save.
//! - **[`DeviceInfo`]**: the stable identity reported to the companion.
//! - **[`PackageReader`]**: the fallback source of truth, metadata embedded
//!   in the book file itself.

mod device;
pub mod error;
mod file;
pub mod package;
mod record;
mod store;

pub use crate::device::DeviceInfo;
pub use crate::file::{read_records, write_records};
pub use crate::package::{EpubReader, PackageMetadata, PackageReader};
pub use crate::record::{Record, authors_from_attribution, parse_series_index, parse_timestamp};
pub use crate::store::Store;

/// Side-cache file name, relative to the storage root.
pub const SIDE_CACHE_FILE: &str = "metadata.calibre";
/// Pending-update file name, relative to the storage root.
pub const PENDING_UPDATE_FILE: &str = "metadata_update.kobouc";
/// Device info file name, relative to the storage root.
pub const DEVICE_INFO_FILE: &str = "driveinfo.calibre";
