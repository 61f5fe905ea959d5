//! Metadata embedded in book packages.
//!
//! The reconciler only needs a handful of fields from a book file, and it
//! needs them the same way regardless of the container format. A format gets
//! supported by implementing [`PackageReader`]; the rules for folding the
//! result into a [`Record`] live here, in [`Record::enrich`].

mod epub;

pub use self::epub::EpubReader;
use crate::error::Result;
use crate::record::{Record, parse_series_index, parse_timestamp};
use std::collections::BTreeMap;
use std::path::Path;

/// Role code for authors (MARC relator).
const AUTHOR_ROLE: &str = "aut";

/// Reads package metadata from a book file.
pub trait PackageReader: Send + Sync {
    /// Read the package metadata of the book at `path`.
    fn read(&self, path: &Path) -> Result<PackageMetadata>;
}

/// Raw metadata read from a book package, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub identifiers: Vec<Identifier>,
    pub titles: Vec<String>,
    pub creators: Vec<Creator>,
    /// Descriptions, with character entities already decoded.
    pub descriptions: Vec<String>,
    pub languages: Vec<String>,
    pub publishers: Vec<String>,
    pub dates: Vec<String>,
    /// Extension metadata (`<meta>` elements), by name or property.
    pub meta: Vec<Meta>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub scheme: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    pub name: String,
    /// MARC relator code, e.g. `aut`.
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub name: String,
    pub content: String,
}

impl Record {
    /// Fold package metadata into this record.
    ///
    /// Package values overwrite what's already there (they come from the
    /// book itself), except that absent values never clear existing ones.
    /// Authors are only replaced if the package names at least one creator
    /// with the author role.
    pub fn enrich(&mut self, package: PackageMetadata) {
        for identifier in package.identifiers {
            let scheme = identifier.scheme.map(|s| s.to_lowercase());
            match scheme.as_deref() {
                // Prefer the companion's own UUID over anything else.
                Some("calibre") => self.uuid = Some(identifier.value),
                Some("uuid") => {
                    self.uuid.get_or_insert(identifier.value);
                },
                Some(scheme) if !scheme.is_empty() => {
                    self.identifiers.insert(scheme.to_string(), identifier.value);
                },
                _ => {
                    if let Some(uuid) = identifier.value.strip_prefix("urn:uuid:") {
                        self.uuid.get_or_insert_with(|| uuid.to_string());
                    }
                },
            }
        }
        if let Some(title) = package.titles.into_iter().find(|t| !t.is_empty()) {
            self.title = title;
        }
        if let Some(description) = package.descriptions.into_iter().next() {
            self.comments = Some(description);
        }
        for language in package.languages {
            if !self.languages.contains(&language) {
                self.languages.push(language);
            }
        }
        let authors: Vec<String> = package
            .creators
            .into_iter()
            .filter(|c| c.role.as_deref().is_some_and(|r| r.eq_ignore_ascii_case(AUTHOR_ROLE)))
            .map(|c| c.name)
            .collect();
        if !authors.is_empty() {
            self.authors = authors;
        }
        if let Some(publisher) = package.publishers.into_iter().next() {
            self.publisher = Some(publisher);
        }
        if let Some(pubdate) = package.dates.iter().find_map(|d| parse_timestamp(d)) {
            self.pubdate = Some(pubdate);
        }
        for meta in package.meta {
            match meta.name.as_str() {
                "calibre:timestamp" => {
                    if let Some(timestamp) = parse_timestamp(&meta.content) {
                        self.timestamp = Some(timestamp);
                    }
                },
                "calibre:series" => self.series = Some(meta.content),
                "calibre:series_index" => {
                    if let Some(index) = parse_series_index(&meta.content) {
                        self.series_index = Some(index);
                    }
                },
                "calibre:title_sort" => self.title_sort = Some(meta.content),
                "calibre:author_link_map" => {
                    match serde_json::from_str::<BTreeMap<String, String>>(&meta.content) {
                        Ok(map) => self.author_link_map = map,
                        Err(e) => tracing::debug!(error = %e, "Ignoring unparsable author link map"),
                    }
                },
                _ => {},
            }
        }
    }
}
