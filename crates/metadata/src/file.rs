//! Whole-file JSON persistence.
//!
//! Every file this crate manages is read in one go and rewritten in one go.
//! An absent or empty file is "nothing here yet"; anything else that fails to
//! parse is corruption and is reported as such.

use crate::Record;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;

/// Read and deserialize a JSON file.
///
/// Returns `None` when the file does not exist or contains only whitespace.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).or_raise(|| ErrorKind::Read(path.to_path_buf())),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let value = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Corrupt(path.to_path_buf()))?;
    Ok(Some(value))
}

/// Serialize a value to JSON, replacing the file (and creating its parent
/// directories) if needed.
pub(crate) async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value).or_raise(|| ErrorKind::Serialize)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Write(parent.to_path_buf()))?;
    }
    tokio::fs::write(path, bytes).await.or_raise(|| ErrorKind::Write(path.to_path_buf()))
}

/// Read a JSON array of metadata records; absent or empty files yield no records.
pub async fn read_records(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    Ok(read_json(path.as_ref()).await?.unwrap_or_default())
}

/// Write metadata records as a JSON array, fully replacing the file.
pub async fn write_records(path: impl AsRef<Path>, records: &[Record]) -> Result<()> {
    write_json(path.as_ref(), records).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_absent_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let records = read_records(dir.path().join("metadata.calibre")).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_whitespace_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metadata.calibre");
        std::fs::write(&path, " \n\t").unwrap();
        assert!(read_records(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_truncated_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metadata.calibre");
        std::fs::write(&path, r#"[{"lpath": "Foo/Bar.epub", "title": "Ba"#).unwrap();
        let err = read_records(&path).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Corrupt(path));
    }

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("metadata.calibre");
        write_records(&path, &[Record::new("Foo/Bar.epub")]).await.unwrap();
        let records = read_records(&path).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].lpath, "Foo/Bar.epub");
    }

    #[tokio::test]
    async fn test_write_replaces_previous_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metadata.calibre");
        write_records(&path, &[Record::new("a.epub"), Record::new("b.epub")]).await.unwrap();
        write_records(&path, &[Record::new("c.epub")]).await.unwrap();
        let records = read_records(&path).await.unwrap();
        assert_eq!(records, vec![Record::new("c.epub")]);
    }
}
