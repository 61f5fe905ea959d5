//! Access to the firmware's content catalog.
//!
//! The catalog (`.kobo/KoboReader.sqlite`) belongs to the firmware. This
//! crate never migrates or otherwise reshapes it: it reads the set of books
//! that exist on a storage, and writes back the handful of columns the
//! firmware doesn't fill in itself.

mod book;
mod db;
pub mod error;

pub use crate::book::{BookRow, EPUB_MIME_TYPES, MetadataUpdate};
pub use crate::db::Catalog;
