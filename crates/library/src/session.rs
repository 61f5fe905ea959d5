//! One end-to-end run of the engine, and the operations the companion
//! connection drives while it's open.

use crate::error::{ErrorKind, Result};
use crate::journal::{UpdateJournal, WriteBack, apply_pending};
use crate::reconcile::{Reconciled, reconcile};
use crate::status::Status;
use exn::{OptionExt, ResultExt};
use nickel_catalog::Catalog;
use nickel_identity::{ContentId, Storage, sanitize_lpath, validate_lpath};
use nickel_metadata::{
    DEVICE_INFO_FILE, DeviceInfo, EpubReader, PENDING_UPDATE_FILE, PackageReader, Record, SIDE_CACHE_FILE, Store,
};
use nickel_thumbnail::{CoverKind, GenerateLevel, Pipeline, Settings, Version};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::fs::File;
use tokio::io::AsyncSeekExt;
use tracing::instrument;

/// Catalog database, relative to the internal storage root.
pub const CATALOG_FILE: &str = ".kobo/KoboReader.sqlite";

/// Book formats the device reads, in the order they're offered to the
/// companion (after the preferred EPUB flavour).
const OTHER_EXTENSIONS: [&str; 7] = ["mobi", "pdf", "cbz", "cbr", "txt", "html", "rtf"];

/// Where and how a session runs.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Mount point of the internal storage (catalog, version descriptor).
    pub onboard_root: PathBuf,
    /// Mount point of the SD card, if one is mounted.
    pub sd_root: Option<PathBuf>,
    pub prefer_sd_card: bool,
    pub prefer_kepub: bool,
    pub thumbnails: Settings,
}
impl SessionOptions {
    pub fn new(onboard_root: impl Into<PathBuf>) -> Self {
        Self {
            onboard_root: onboard_root.into(),
            sd_root: None,
            prefer_sd_card: false,
            prefer_kepub: true,
            thumbnails: Settings::default(),
        }
    }

    /// Storage the session manages, and the root its books live under.
    pub fn storage(&self) -> (Storage, &Path) {
        match &self.sd_root {
            Some(sd_root) if self.prefer_sd_card => (Storage::SdCard, sd_root),
            _ => (Storage::Onboard, &self.onboard_root),
        }
    }
}

/// A book as listed to the companion.
#[derive(Debug, Clone, PartialEq)]
pub struct BookListing {
    pub content_id: ContentId,
    pub lpath: String,
    pub last_modified: Option<OffsetDateTime>,
    /// Lowercased file extension, without the dot.
    pub extension: Option<String>,
}

/// Device capabilities advertised to the companion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOptions {
    /// Accepted book formats, most preferred first.
    pub extensions: Vec<&'static str>,
    pub model: &'static str,
    /// Size of the largest cover variant that will be generated.
    pub cover_size: (u32, u32),
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing more to do.
    Done,
    /// Books were added or changed: the firmware must import them and the
    /// engine must run again to write their metadata back.
    RescanRequired,
}

/// Everything a session owns: the catalog connection, the metadata store,
/// this session's update journal and the cover pipeline.
///
/// Opening a session reconciles the store with the catalog; [`close`] must
/// be called at the end, it's the only place outstanding covers are waited
/// for and the journal is flushed.
///
/// [`close`]: Session::close
pub struct Session {
    root: PathBuf,
    storage: Storage,
    prefer_kepub: bool,
    catalog: Catalog,
    store: Store,
    journal: UpdateJournal,
    device_info: DeviceInfo,
    version: Version,
    pipeline: Pipeline,
    status: Status,
    write_back: WriteBack,
    reconciled: Reconciled,
}

impl Session {
    /// Open a session against the device's catalog, reading package metadata
    /// with [`EpubReader`].
    #[instrument(skip_all, fields(onboard = %options.onboard_root.display()))]
    pub async fn open(options: SessionOptions, status: Status) -> Result<Self> {
        let catalog =
            Catalog::connect(options.onboard_root.join(CATALOG_FILE)).await.or_raise(|| ErrorKind::Catalog)?;
        let reader: Arc<dyn PackageReader> = Arc::new(EpubReader);
        Self::open_with(options, catalog, reader, status).await
    }

    /// Open a session with an already connected catalog and a custom package
    /// reader.
    pub async fn open_with(
        options: SessionOptions,
        catalog: Catalog,
        reader: Arc<dyn PackageReader>,
        status: Status,
    ) -> Result<Self> {
        let (storage, root) = options.storage();
        let root = root.to_path_buf();
        status.message(match storage {
            Storage::Onboard => "Using internal storage",
            Storage::SdCard => "Using SD card",
        });
        status.message("Gathering information about your Kobo");

        let version = Version::detect(&options.onboard_root).await;
        let device_info =
            DeviceInfo::load_or_generate(root.join(DEVICE_INFO_FILE), storage, version.device.model())
                .await
                .or_raise(|| ErrorKind::Metadata)?;

        // Last session's changes go in before the catalog is read again.
        let write_back = apply_pending(&catalog, root.join(PENDING_UPDATE_FILE), storage).await;

        status.message("Reading metadata");
        let mut store = Store::load(root.join(SIDE_CACHE_FILE), storage).await.or_raise(|| ErrorKind::Metadata)?;
        let reconciled = reconcile(&catalog, &mut store, &root, &reader, &status).await?;

        let pipeline = Pipeline::new(root.join(storage.images_dir()), version.device, options.thumbnails);
        Ok(Self {
            journal: UpdateJournal::new(root.join(PENDING_UPDATE_FILE)),
            root,
            storage,
            prefer_kepub: options.prefer_kepub,
            catalog,
            store,
            device_info,
            version,
            pipeline,
            status,
            write_back,
            reconciled,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn storage(&self) -> Storage {
        self.storage
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn journal(&self) -> &UpdateJournal {
        &self.journal
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// What the previous session's pending updates amounted to.
    pub fn write_back(&self) -> WriteBack {
        self.write_back
    }

    pub fn reconciled(&self) -> Reconciled {
        self.reconciled
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Every book on the storage.
    pub fn list_books(&self) -> Vec<BookListing> {
        self.store
            .iter()
            .map(|(id, record)| BookListing {
                content_id: id.clone(),
                lpath: record.lpath.clone(),
                last_modified: record.last_modified,
                extension: record.extension(),
            })
            .collect()
    }

    /// Metadata for the given books (unknown IDs are skipped), or for every
    /// book.
    pub fn metadata(&self, ids: Option<&[ContentId]>) -> Vec<Record> {
        match ids {
            Some(ids) => ids.iter().filter_map(|id| self.store.get(id)).cloned().collect(),
            None => self.store.iter().map(|(_, record)| record.clone()).collect(),
        }
    }

    /// Accept a book from the companion, returning the file to write its
    /// `length` bytes into.
    ///
    /// The record is journalled for write-back. The side-cache is saved once
    /// the last book of a batch has arrived.
    #[instrument(skip(self, record), fields(lpath = %record.lpath))]
    pub async fn save_book(&mut self, mut record: Record, length: u64, last_in_batch: bool) -> Result<File> {
        let lpath = validate_lpath(&sanitize_lpath(&record.lpath))
            .or_raise(|| ErrorKind::InvalidPath(record.lpath.clone()))?;
        let id = ContentId::from_lpath(&lpath, self.storage);
        let path = id.book_path(&self.root, self.storage);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.or_raise(|| ErrorKind::BookFile(dir.to_path_buf()))?;
        }
        if self.store.contains(&id) {
            // The firmware only re-imports a replaced book if its size changed.
            match self.catalog.update_file_size(&id, length).await {
                Ok(true) => tracing::info!(id = %id, size = length, "Updated catalog size of replaced book"),
                Ok(false) => {},
                Err(e) => tracing::warn!(id = %id, error = ?e, "Could not update catalog size of replaced book"),
            }
        }
        let file = File::create(&path).await.or_raise(|| ErrorKind::BookFile(path.clone()))?;

        record.lpath = lpath;
        record.size = length;
        self.journal.accumulate(&mut self.store, id, record);
        if last_in_batch {
            self.store.save().await.or_raise(|| ErrorKind::Metadata)?;
        }
        Ok(file)
    }

    /// Open a book for sending to the companion, positioned at `offset`.
    ///
    /// Returns the file and the number of bytes left to read.
    pub async fn fetch_book(&self, id: &ContentId, offset: u64) -> Result<(File, u64)> {
        self.store.get(id).ok_or_raise(|| ErrorKind::UnknownBook(id.to_string()))?;
        let path = id.book_path(&self.root, self.storage);
        let book_error = || ErrorKind::BookFile(path.clone());
        let mut file = File::open(&path).await.or_raise(book_error)?;
        let length = file.metadata().await.or_raise(book_error)?.len();
        let offset = offset.min(length);
        file.seek(std::io::SeekFrom::Start(offset)).await.or_raise(book_error)?;
        Ok((file, length - offset))
    }

    /// Delete a book: its file, its covers and its metadata.
    ///
    /// A book file that's already gone is not an error.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete_book(&mut self, id: &ContentId) -> Result<()> {
        let path = id.book_path(&self.root, self.storage);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Book file already gone");
            },
            Err(e) => return Err(e).or_raise(|| ErrorKind::BookFile(path)),
        }
        self.pipeline.remove(id).await;
        self.journal.remove(id);
        if self.store.remove(id).is_some() {
            self.store.save().await.or_raise(|| ErrorKind::Metadata)?;
        }
        Ok(())
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    /// Replace (and persist) the device info, as sent by the companion.
    pub async fn set_device_info(&mut self, info: DeviceInfo) -> Result<()> {
        info.save(self.root.join(DEVICE_INFO_FILE)).await.or_raise(|| ErrorKind::Metadata)?;
        self.device_info = info;
        Ok(())
    }

    /// Queue a book's cover (JPEG or PNG bytes) for thumbnail generation.
    ///
    /// The book's metadata must have been saved first.
    pub fn save_cover(&self, id: &ContentId, image: Vec<u8>) {
        self.pipeline.submit_bytes(id, image);
    }

    /// Like [`save_cover`](Self::save_cover), for base64 encoded covers.
    pub fn save_cover_base64(&self, id: &ContentId, image: &str) {
        self.pipeline.submit_base64(id, image);
    }

    /// Where a cover variant for a book is written.
    pub fn cover_path(&self, id: &ContentId, kind: CoverKind) -> PathBuf {
        self.pipeline.cover_path(id, kind)
    }

    pub fn device_options(&self) -> DeviceOptions {
        let (first, second) = if self.prefer_kepub { ("kepub", "epub") } else { ("epub", "kepub") };
        let mut extensions = vec![first, second];
        extensions.extend(OTHER_EXTENSIONS);
        let device = self.pipeline.device();
        let cover_size = match self.pipeline.settings().level {
            GenerateLevel::All => device.cover_size(CoverKind::Full),
            GenerateLevel::Partial => device.cover_size(CoverKind::LibraryFull),
            GenerateLevel::None => device.cover_size(CoverKind::LibraryGrid),
        };
        DeviceOptions { extensions, model: device.model(), cover_size }
    }

    /// End the session.
    ///
    /// Waits for every queued cover, saves the store, flushes the journal and
    /// closes the catalog. The outcome says whether the engine has to run
    /// again once the firmware has imported new books.
    #[instrument(skip_all)]
    pub async fn close(self) -> Result<Outcome> {
        if self.pipeline.pending() > 0 {
            self.status.message("Waiting for thumbnail generation to complete");
        }
        self.pipeline.shutdown().await;
        let saved = self.store.save().await.or_raise(|| ErrorKind::Metadata);
        let flushed = self.journal.flush().await;
        self.catalog.close().await;
        saved?;
        let outcome = if flushed? { Outcome::RescanRequired } else { Outcome::Done };
        tracing::info!(?outcome, "Session closed");
        Ok(outcome)
    }
}
