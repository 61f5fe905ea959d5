//! The engine's session: reconciling the metadata cache with the catalog,
//! journalling updates for write-back, and the book operations the companion
//! drives in between.

pub mod error;
mod journal;
mod reconcile;
mod session;
mod status;

pub use crate::journal::{UpdateJournal, WriteBack, apply_pending};
pub use crate::reconcile::{Reconciled, reconcile};
pub use crate::session::{BookListing, CATALOG_FILE, DeviceOptions, Outcome, Session, SessionOptions};
pub use crate::status::{Status, StatusMessage};
