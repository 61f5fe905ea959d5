//! In-memory metadata store backed by the side-cache file.

use crate::Record;
use crate::error::Result;
use crate::file::{read_json, write_json};
use nickel_identity::{ContentId, Storage};
use std::collections::BTreeMap;
use std::collections::btree_map::{IntoIter, Iter};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Every known book's metadata, keyed by content ID.
///
/// The store is the only owner of the session's metadata. It is loaded once,
/// mutated in memory, and written back as a whole: there is no incremental
/// patching of the side-cache file. Keys are always derived from each
/// record's `lpath` under the session's [`Storage`]; the side-cache is a flat
/// list and any keys it might imply are never trusted.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    storage: Storage,
    records: BTreeMap<ContentId, Record>,
}
impl Store {
    /// An empty store that will be persisted to `path`.
    pub fn new(path: impl Into<PathBuf>, storage: Storage) -> Self {
        Self { path: path.into(), storage, records: BTreeMap::new() }
    }

    /// Load the side-cache file.
    ///
    /// An absent or empty file is an empty store. A file that can't be
    /// parsed is [`Corrupt`](crate::error::ErrorKind::Corrupt); the caller
    /// should abort rather than overwrite it with a partial view.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>, storage: Storage) -> Result<Self> {
        let path = path.as_ref();
        let cached: Vec<Record> = read_json(path).await?.unwrap_or_default();
        tracing::debug!(count = cached.len(), "Read cached metadata records");
        let mut store = Self::new(path, storage);
        for record in cached {
            store.insert(ContentId::from_lpath(&record.lpath, storage), record);
        }
        Ok(store)
    }

    /// Write the complete store to the side-cache file, replacing it.
    #[instrument(skip_all, fields(path = %self.path.display(), count = self.records.len()))]
    pub async fn save(&self) -> Result<()> {
        let records: Vec<&Record> = self.records.values().collect();
        write_json(&self.path, &records).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn storage(&self) -> Storage {
        self.storage
    }

    pub fn get(&self, id: &ContentId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.records.contains_key(id)
    }

    /// Insert a record, unconditionally replacing (and returning) any
    /// previous record for the same content ID.
    pub fn insert(&mut self, id: ContentId, record: Record) -> Option<Record> {
        self.records.insert(id, record)
    }

    pub fn remove(&mut self, id: &ContentId) -> Option<Record> {
        self.records.remove(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, ContentId, Record> {
        self.records.iter()
    }

    /// Take every record out of the store, leaving it empty.
    pub fn take(&mut self) -> BTreeMap<ContentId, Record> {
        std::mem::take(&mut self.records)
    }

    /// Replace every record in the store.
    pub fn replace_all(&mut self, records: BTreeMap<ContentId, Record>) {
        self.records = records;
    }
}
impl<'a> IntoIterator for &'a Store {
    type Item = (&'a ContentId, &'a Record);
    type IntoIter = Iter<'a, ContentId, Record>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
impl IntoIterator for Store {
    type Item = (ContentId, Record);
    type IntoIter = IntoIter<ContentId, Record>;
    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
