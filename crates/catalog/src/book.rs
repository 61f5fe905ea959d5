//! Book rows: the existence set, and the columns written back into it.

use crate::Catalog;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use nickel_identity::{ContentId, Storage};
use tracing::instrument;

/// Mime types of books the firmware stores as EPUB containers.
pub const EPUB_MIME_TYPES: [&str; 2] = ["application/epub+zip", "application/x-kobo-epub+zip"];

/// A downloaded, accessible book as recorded in the catalog.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BookRow {
    pub content_id: String,
    pub title: Option<String>,
    /// Comma-separated authors.
    pub attribution: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub series: Option<String>,
    /// Series number as text; not necessarily numeric.
    pub series_number: Option<String>,
    pub mime_type: String,
}
impl BookRow {
    pub fn content_id(&self) -> ContentId {
        ContentId::new(self.content_id.as_str())
    }

    /// Whether the book file is an EPUB container that can be opened for
    /// its package metadata.
    pub fn is_epub(&self) -> bool {
        EPUB_MIME_TYPES.contains(&self.mime_type.as_str())
    }
}

/// Metadata columns the firmware can't fill in from a sideloaded book
/// itself, written back from the companion's records.
///
/// Empty strings and a zero series index are stored as `NULL`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataUpdate {
    pub description: Option<String>,
    pub series: Option<String>,
    pub series_number: Option<String>,
    pub series_number_float: Option<f64>,
}
impl MetadataUpdate {
    pub fn new(description: Option<&str>, series: Option<&str>, series_index: Option<f64>) -> Self {
        let non_empty = |value: Option<&str>| value.filter(|v| !v.is_empty()).map(String::from);
        let index = series_index.filter(|index| *index != 0.0 && index.is_finite());
        Self {
            description: non_empty(description),
            series: non_empty(series),
            series_number: index.map(|index| index.to_string()),
            series_number_float: index,
        }
    }
}

impl Catalog {
    /// Every book the catalog considers present on the given storage.
    ///
    /// This is the authoritative existence set: a book that isn't returned
    /// here doesn't exist as far as the session is concerned.
    #[instrument(skip(self))]
    pub async fn list_books(&self, storage: Storage) -> Result<Vec<BookRow>> {
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../queries/list_books.sql"))
            .bind(storage.prefix())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Query)?;
        tracing::debug!(count = rows.len(), "Listed books in catalog");
        Ok(rows)
    }

    /// Size of a book file as recorded by the catalog, if the book is known.
    pub async fn file_size(&self, id: &ContentId) -> Result<Option<u64>> {
        let size: Option<Option<i64>> = sqlx::query_scalar(include_str!("../queries/get_file_size.sql"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Query)?;
        size.flatten()
            .map(|size| u64::try_from(size).or_raise(|| ErrorKind::InvalidData("file size")))
            .transpose()
    }

    /// Correct the recorded size of a book that's been replaced.
    ///
    /// The firmware only rescans books whose size changed, so a replaced book
    /// with a stale size would keep its old metadata. Returns `true` if the
    /// catalog was changed; unknown books and unchanged sizes are left alone.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn update_file_size(&self, id: &ContentId, size: u64) -> Result<bool> {
        match self.file_size(id).await? {
            Some(current) if current != size => {},
            _ => return Ok(false),
        }
        let size = i64::try_from(size).or_raise(|| ErrorKind::InvalidData("file size"))?;
        let result = sqlx::query(include_str!("../queries/update_file_size.sql"))
            .bind(size)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Write)?;
        Ok(result.rows_affected() > 0)
    }

    /// Write metadata columns back into a book's row.
    ///
    /// Returns `false` if there was no row for the content ID.
    pub async fn update_book_metadata(&self, id: &ContentId, update: &MetadataUpdate) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/update_book_metadata.sql"))
            .bind(update.description.as_deref())
            .bind(update.series.as_deref())
            .bind(update.series_number.as_deref())
            .bind(update.series_number_float)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Write)?;
        Ok(result.rows_affected() > 0)
    }
}
