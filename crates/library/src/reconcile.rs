//! Catalog reconciliation.
//!
//! The catalog decides which books exist; the side-cache decides what we
//! know about them. Reconciling rebuilds the store from the catalog's
//! existence set: cached records are adopted as they are, books the cache
//! has never seen get a record synthesised from their catalog row (and, for
//! EPUBs, their package metadata), and cached records for books the catalog
//! no longer lists are dropped.

use crate::Status;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use nickel_catalog::{BookRow, Catalog};
use nickel_identity::Storage;
use nickel_metadata::{PackageReader, Record, Store, authors_from_attribution, parse_series_index};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;

/// How the rebuilt store was put together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciled {
    /// Records adopted from the side-cache.
    pub cached: usize,
    /// Records built from catalog rows.
    pub synthesized: usize,
    /// Cached records dropped because the catalog doesn't list their book.
    pub dropped: usize,
}

/// Rebuild `store` from the catalog and persist it.
///
/// Catalog errors and a failure to persist the store are fatal and leave the
/// side-cache file untouched; problems with individual book files are only
/// logged.
#[instrument(skip_all, fields(root = %root.display(), storage = ?store.storage()))]
pub async fn reconcile(
    catalog: &Catalog,
    store: &mut Store,
    root: &Path,
    reader: &Arc<dyn PackageReader>,
    status: &Status,
) -> Result<Reconciled> {
    let storage = store.storage();
    let rows = catalog.list_books(storage).await.or_raise(|| ErrorKind::Catalog)?;
    let mut cached = store.take();
    let mut rebuilt = BTreeMap::new();
    let mut summary = Reconciled::default();

    let total = rows.len();
    for (done, row) in rows.into_iter().enumerate() {
        let id = row.content_id();
        let record = match cached.remove(&id) {
            Some(record) => {
                summary.cached += 1;
                record
            },
            None => {
                tracing::debug!(id = %id, "Book not in metadata cache");
                summary.synthesized += 1;
                status.progress("Reading new books", done, total);
                synthesize(row, root, storage, reader).await
            },
        };
        rebuilt.insert(id, record);
    }
    for (id, record) in cached {
        tracing::debug!(id = %id, lpath = %record.lpath, "Dropping cached metadata for book not in catalog");
        summary.dropped += 1;
    }

    store.replace_all(rebuilt);
    store.save().await.or_raise(|| ErrorKind::Metadata)?;
    tracing::info!(cached = summary.cached, synthesized = summary.synthesized, dropped = summary.dropped, "Reconciled metadata with catalog");
    Ok(summary)
}

/// Build a record for a book the side-cache doesn't know about.
async fn synthesize(row: BookRow, root: &Path, storage: Storage, reader: &Arc<dyn PackageReader>) -> Record {
    let id = row.content_id();
    let is_epub = row.is_epub();
    let mut record = Record {
        title: row.title.unwrap_or_default(),
        authors: row.attribution.as_deref().map(authors_from_attribution).unwrap_or_default(),
        comments: row.description,
        publisher: row.publisher,
        series: row.series,
        series_index: row.series_number.as_deref().and_then(parse_series_index),
        ..Record::new(id.to_lpath(storage))
    };
    let path = id.book_path(root, storage);

    if is_epub {
        let reader = Arc::clone(reader);
        let package_path = path.clone();
        match tokio::task::spawn_blocking(move || reader.read(&package_path)).await {
            Ok(Ok(package)) => record.enrich(package),
            Ok(Err(e)) => tracing::warn!(path = %path.display(), error = ?e, "Could not read book package metadata"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Book package reader panicked"),
        }
    }

    match tokio::fs::metadata(&path).await {
        Ok(meta) => {
            record.size = meta.len();
            record.last_modified = meta.modified().ok().map(OffsetDateTime::from);
        },
        Err(e) => tracing::debug!(path = %path.display(), error = %e, "Could not stat book file"),
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use nickel_identity::ContentId;
    use nickel_metadata::package::{Creator, Meta};
    use nickel_metadata::{PackageMetadata, SIDE_CACHE_FILE};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves canned package metadata, and remembers which books were opened.
    #[derive(Default)]
    struct FakeReader {
        package: Option<PackageMetadata>,
        opened: Mutex<Vec<PathBuf>>,
    }
    impl PackageReader for FakeReader {
        fn read(&self, path: &Path) -> nickel_metadata::error::Result<PackageMetadata> {
            self.opened.lock().unwrap().push(path.to_path_buf());
            match &self.package {
                Some(package) => Ok(package.clone()),
                None => exn::bail!(nickel_metadata::error::ErrorKind::InvalidPackage(path.to_path_buf())),
            }
        }
    }

    async fn insert(catalog: &Catalog, id: &str, mime: &str) {
        sqlx::query(
            "INSERT INTO content (ContentID, ContentType, MimeType, Title, Attribution, Description, Series, SeriesNumber, ___FileSize)
             VALUES (?, 6, ?, 'Catalog Title', 'A. Author,  B. Author', 'From catalog', 'Catalog Series', 'abc', 100)",
        )
        .bind(id)
        .bind(mime)
        .execute(catalog.pool())
        .await
        .unwrap();
    }

    fn package() -> PackageMetadata {
        PackageMetadata {
            titles: vec!["Package Title".into()],
            creators: vec![Creator { name: "Package Author".into(), role: Some("aut".into()) }],
            meta: vec![Meta { name: "calibre:series_index".into(), content: "2.5".into() }],
            ..Default::default()
        }
    }

    struct Fixture {
        dir: TempDir,
        catalog: Catalog,
        reader: Arc<dyn PackageReader>,
    }
    impl Fixture {
        async fn new(package: Option<PackageMetadata>) -> Self {
            let reader: Arc<dyn PackageReader> = Arc::new(FakeReader { package, ..Default::default() });
            Self { dir: TempDir::new().unwrap(), catalog: Catalog::connect_in_memory().await.unwrap(), reader }
        }

        fn cache_path(&self) -> PathBuf {
            self.dir.path().join(SIDE_CACHE_FILE)
        }

        async fn reconcile(&self) -> (Store, Reconciled) {
            let mut store = Store::load(self.cache_path(), Storage::Onboard).await.unwrap();
            let summary =
                reconcile(&self.catalog, &mut store, self.dir.path(), &self.reader, &Status::disabled()).await.unwrap();
            (store, summary)
        }
    }

    #[tokio::test]
    async fn test_synthesizes_from_catalog_row() {
        let fixture = Fixture::new(None).await;
        insert(&fixture.catalog, "file:///mnt/onboard/Foo/Bar.pdf", "application/pdf").await;
        std::fs::create_dir_all(fixture.dir.path().join("Foo")).unwrap();
        std::fs::write(fixture.dir.path().join("Foo/Bar.pdf"), b"%PDF-1.4").unwrap();

        let (store, summary) = fixture.reconcile().await;
        assert_eq!(summary, Reconciled { cached: 0, synthesized: 1, dropped: 0 });
        let record = store.get(&ContentId::new("file:///mnt/onboard/Foo/Bar.pdf")).unwrap();
        assert_eq!(record.lpath, "Foo/Bar.pdf");
        assert_eq!(record.title, "Catalog Title");
        assert_eq!(record.authors, vec!["A. Author", "B. Author"]);
        assert_eq!(record.comments.as_deref(), Some("From catalog"));
        assert_eq!(record.series.as_deref(), Some("Catalog Series"));
        // "abc" isn't a number; no index, and no error either.
        assert_eq!(record.series_index, None);
        assert_eq!(record.size, 8);
        assert!(record.last_modified.is_some());
    }

    #[tokio::test]
    async fn test_epub_package_enriches_new_books() {
        let fixture = Fixture::new(Some(package())).await;
        insert(&fixture.catalog, "file:///mnt/onboard/Foo/Bar.kepub.epub", "application/x-kobo-epub+zip").await;

        let (store, _) = fixture.reconcile().await;
        let record = store.get(&ContentId::new("file:///mnt/onboard/Foo/Bar.kepub.epub")).unwrap();
        assert_eq!(record.lpath, "Foo/Bar.kepub");
        assert_eq!(record.title, "Package Title");
        assert_eq!(record.authors, vec!["Package Author"]);
        assert_eq!(record.series_index, Some(2.5));
        // Fields the package doesn't have stay as the catalog had them.
        assert_eq!(record.series.as_deref(), Some("Catalog Series"));
        // The book file is missing, which is fine.
        assert_eq!(record.size, 0);
    }

    #[tokio::test]
    async fn test_unreadable_package_is_not_fatal() {
        let fixture = Fixture::new(None).await;
        insert(&fixture.catalog, "file:///mnt/onboard/a.epub", "application/epub+zip").await;
        let (store, summary) = fixture.reconcile().await;
        assert_eq!(summary.synthesized, 1);
        let record = store.get(&ContentId::new("file:///mnt/onboard/a.epub")).unwrap();
        assert_eq!(record.title, "Catalog Title");
        assert_eq!(record.lpath, "a.epub");
    }

    #[tokio::test]
    async fn test_cached_records_win() {
        let fixture = Fixture::new(Some(package())).await;
        insert(&fixture.catalog, "file:///mnt/onboard/a.epub", "application/epub+zip").await;
        std::fs::write(
            fixture.cache_path(),
            r#"[{"lpath": "a.epub", "title": "Cached Title", "authors": ["Cached Author"], "rating": 10}]"#,
        )
        .unwrap();

        let (store, summary) = fixture.reconcile().await;
        assert_eq!(summary, Reconciled { cached: 1, synthesized: 0, dropped: 0 });
        let record = store.get(&ContentId::new("file:///mnt/onboard/a.epub")).unwrap();
        assert_eq!(record.title, "Cached Title");
        assert_eq!(record.authors, vec!["Cached Author"]);
        assert_eq!(record.extra.get("rating").and_then(|v| v.as_i64()), Some(10));
    }

    #[tokio::test]
    async fn test_books_missing_from_catalog_are_dropped() {
        let fixture = Fixture::new(None).await;
        insert(&fixture.catalog, "file:///mnt/onboard/kept.epub", "application/epub+zip").await;
        std::fs::write(fixture.cache_path(), r#"[{"lpath": "kept.epub", "title": "Kept"}, {"lpath": "gone.epub"}]"#)
            .unwrap();

        let (store, summary) = fixture.reconcile().await;
        assert_eq!(summary, Reconciled { cached: 1, synthesized: 0, dropped: 1 });
        assert!(!store.contains(&ContentId::new("file:///mnt/onboard/gone.epub")));

        let persisted = Store::load(fixture.cache_path(), Storage::Onboard).await.unwrap();
        assert_eq!(persisted.len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let fixture = Fixture::new(Some(package())).await;
        insert(&fixture.catalog, "file:///mnt/onboard/a.epub", "application/epub+zip").await;
        insert(&fixture.catalog, "file:///mnt/onboard/b.pdf", "application/pdf").await;
        std::fs::write(fixture.dir.path().join("b.pdf"), b"%PDF").unwrap();

        let (_, first) = fixture.reconcile().await;
        let first_cache = std::fs::read(fixture.cache_path()).unwrap();
        let (_, second) = fixture.reconcile().await;
        let second_cache = std::fs::read(fixture.cache_path()).unwrap();

        assert_eq!(first, Reconciled { cached: 0, synthesized: 2, dropped: 0 });
        assert_eq!(second, Reconciled { cached: 2, synthesized: 0, dropped: 0 });
        assert_eq!(first_cache, second_cache);
    }

    #[tokio::test]
    async fn test_catalog_failure_leaves_cache_untouched() {
        let fixture = Fixture::new(None).await;
        std::fs::write(fixture.cache_path(), r#"[{"lpath": "a.epub"}]"#).unwrap();
        sqlx::query("DROP TABLE content").execute(fixture.catalog.pool()).await.unwrap();

        let mut store = Store::load(fixture.cache_path(), Storage::Onboard).await.unwrap();
        let err = reconcile(&fixture.catalog, &mut store, fixture.dir.path(), &fixture.reader, &Status::disabled())
            .await
            .unwrap_err();
        assert_eq!(*err, ErrorKind::Catalog);
        assert_eq!(std::fs::read_to_string(fixture.cache_path()).unwrap(), r#"[{"lpath": "a.epub"}]"#);
    }
}
