//! The update journal: books added or changed this session.
//!
//! The firmware only imports a new book's file on its next content scan, so
//! metadata the companion sent for it can't be written into the catalog in
//! the same session. Changed records are journalled to the pending-update
//! file instead, and the next session writes them back before anything else
//! ([`apply_pending`]).

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use nickel_catalog::{Catalog, MetadataUpdate};
use nickel_identity::{ContentId, Storage};
use nickel_metadata::{Record, Store, read_records, write_records};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Records added or changed during the current session.
#[derive(Debug, Clone)]
pub struct UpdateJournal {
    path: PathBuf,
    updates: BTreeMap<ContentId, Record>,
}

impl UpdateJournal {
    /// An empty journal that will be flushed to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), updates: BTreeMap::new() }
    }

    /// Record an added or changed book, in both the journal and the live store.
    pub fn accumulate(&mut self, store: &mut Store, id: ContentId, record: Record) {
        self.updates.insert(id.clone(), record.clone());
        store.insert(id, record);
    }

    /// Forget a book, e.g. because it was deleted again.
    pub fn remove(&mut self, id: &ContentId) -> Option<Record> {
        self.updates.remove(id)
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.updates.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Write the journal to the pending-update file.
    ///
    /// Nothing is written (or touched) when the journal is empty. Returns
    /// whether the file was written, meaning the catalog needs the next
    /// session to write metadata back.
    #[instrument(skip_all, fields(path = %self.path.display(), count = self.updates.len()))]
    pub async fn flush(&self) -> Result<bool> {
        if self.updates.is_empty() {
            return Ok(false);
        }
        let records: Vec<Record> = self.updates.values().cloned().collect();
        write_records(&self.path, &records).await.or_raise(|| ErrorKind::Metadata)?;
        tracing::info!("Journalled updated metadata for the next session");
        Ok(true)
    }
}

/// Outcome of writing pending updates back into the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteBack {
    /// Rows updated.
    pub applied: usize,
    /// Records with no matching catalog row (not imported yet, or deleted).
    pub missing: usize,
    /// Rows that failed to update.
    pub failed: usize,
}

/// Write the previous session's journalled metadata into the catalog.
///
/// Each record's content ID is recomputed from its lpath. A row that fails to
/// update is logged and skipped. The pending-update file is deleted however
/// the individual rows fared, including when it can't be read at all: it
/// will never get any better, and leaving it would retry it forever.
#[instrument(skip(catalog), fields(path = %path.as_ref().display()))]
pub async fn apply_pending(catalog: &Catalog, path: impl AsRef<Path>, storage: Storage) -> WriteBack {
    let path = path.as_ref();
    let mut outcome = WriteBack::default();
    let records = match read_records(path).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(error = ?e, "Discarding unreadable pending metadata updates");
            Vec::new()
        },
    };
    for record in &records {
        let id = ContentId::from_lpath(&record.lpath, storage);
        let update = MetadataUpdate::new(record.comments.as_deref(), record.series.as_deref(), record.series_index);
        match catalog.update_book_metadata(&id, &update).await {
            Ok(true) => outcome.applied += 1,
            Ok(false) => {
                tracing::debug!(id = %id, "No catalog row for pending update");
                outcome.missing += 1;
            },
            Err(e) => {
                tracing::warn!(id = %id, error = ?e, "Failed to write metadata back to catalog");
                outcome.failed += 1;
            },
        }
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => {},
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => tracing::warn!(error = %e, "Failed to remove pending metadata updates"),
    }
    if !records.is_empty() {
        tracing::info!(applied = outcome.applied, missing = outcome.missing, failed = outcome.failed, "Wrote back pending metadata");
    }
    outcome
}
