use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Metadata for a single book, in the shape the companion application sends
/// and expects back.
///
/// Fields the engine reasons about are typed; everything else the companion
/// sends is kept verbatim in [`extra`](Self::extra) and written back out
/// untouched, so newer companion versions don't lose data by passing
/// through an older device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Path of the book relative to the storage root, as the companion knows it.
    pub lpath: String,
    /// Persistent UUID assigned by the companion's library.
    #[serde(default)]
    pub uuid: Option<String>,
    /// External identifiers keyed by scheme (`isbn`, `amazon`, ...).
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub title_sort: Option<String>,
    /// Authors, in display order.
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub author_sort: Option<String>,
    #[serde(default)]
    pub author_sort_map: BTreeMap<String, String>,
    #[serde(default)]
    pub author_link_map: BTreeMap<String, String>,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub series_index: Option<f64>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    /// Free-text description (HTML allowed).
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub mime: Option<String>,
    /// When the book was added to the companion's library.
    #[serde(default, with = "lenient_timestamp")]
    pub timestamp: Option<OffsetDateTime>,
    #[serde(default, with = "lenient_timestamp")]
    pub pubdate: Option<OffsetDateTime>,
    #[serde(default, with = "lenient_timestamp")]
    pub last_modified: Option<OffsetDateTime>,
    /// Size of the book file in bytes.
    #[serde(default)]
    pub size: u64,
    /// Custom column values; opaque to the device.
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
    #[serde(default)]
    pub user_categories: Map<String, Value>,
    /// Anything else the companion sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl Record {
    pub fn new(lpath: impl Into<String>) -> Self {
        Self { lpath: lpath.into(), ..Default::default() }
    }

    /// File extension of the book (without the dot), lowercased.
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.lpath.rsplit_once('.')?;
        (!ext.contains('/')).then(|| ext.to_lowercase())
    }
}

/// Timestamps are written as RFC 3339, but older caches hold whatever the
/// book package said (`"2011"`, `"May 2003"`). Anything [`parse_timestamp`]
/// can't make sense of reads as absent instead of failing the whole file.
mod lenient_timestamp {
    use super::{OffsetDateTime, Value, parse_timestamp};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error> {
        time::serde::rfc3339::option::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::String(value)) => parse_timestamp(&value),
            _ => None,
        })
    }
}

/// Split the catalog's attribution column into individual authors.
///
/// ```
/// use nickel_metadata::authors_from_attribution;
/// assert_eq!(authors_from_attribution("A. Author,  B. Author"), vec!["A. Author", "B. Author"]);
/// ```
pub fn authors_from_attribution(attribution: &str) -> Vec<String> {
    attribution
        .split(',')
        .map(str::trim)
        .filter(|author| !author.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a textual series number; anything that isn't a finite number is
/// treated as "no index" rather than an error.
pub fn parse_series_index(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|index| index.is_finite())
}

/// Parse a timestamp as found in book packages: either RFC 3339, or a bare
/// calendar date (taken as midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    if let Ok(timestamp) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(timestamp);
    }
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|date| date.midnight().assume_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    #[rstest]
    #[case("A. Author,  B. Author", &["A. Author", "B. Author"])]
    #[case("Solo Author", &["Solo Author"])]
    #[case(" Leading, Trailing ,", &["Leading", "Trailing"])]
    #[case("", &[])]
    fn test_authors_from_attribution(#[case] attribution: &str, #[case] expected: &[&str]) {
        assert_eq!(authors_from_attribution(attribution), expected);
    }

    #[rstest]
    #[case("2.5", Some(2.5))]
    #[case("3", Some(3.0))]
    #[case(" 1.0 ", Some(1.0))]
    #[case("abc", None)]
    #[case("", None)]
    #[case("NaN", None)]
    fn test_parse_series_index(#[case] value: &str, #[case] expected: Option<f64>) {
        assert_eq!(parse_series_index(value), expected);
    }

    #[rstest]
    #[case("2020-01-02T03:04:05+00:00", Some(datetime!(2020-01-02 03:04:05 UTC)))]
    #[case("2020-01-02", Some(datetime!(2020-01-02 00:00:00 UTC)))]
    #[case("2020", None)]
    #[case("yesterday", None)]
    fn test_parse_timestamp(#[case] value: &str, #[case] expected: Option<OffsetDateTime>) {
        assert_eq!(parse_timestamp(value), expected);
    }

    #[rstest]
    #[case("Foo/Bar.epub", Some("epub"))]
    #[case("Foo/Bar.KEPUB", Some("kepub"))]
    #[case("Foo.d/Bar", None)]
    #[case("Bar", None)]
    fn test_extension(#[case] lpath: &str, #[case] expected: Option<&str>) {
        assert_eq!(Record::new(lpath).extension().as_deref(), expected);
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let json = r##"{
            "lpath": "Foo/Bar.epub",
            "title": "Bar",
            "authors": ["Foo"],
            "series_index": 2,
            "timestamp": "2019-05-06T07:08:09+00:00",
            "rating": 8,
            "book_producer": null,
            "user_metadata": {"#genre": {"datatype": "text"}}
        }"##;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.series_index, Some(2.0));
        assert_eq!(record.timestamp, Some(datetime!(2019-05-06 07:08:09 UTC)));
        assert_eq!(record.extra.get("rating"), Some(&Value::from(8)));
        assert!(record.user_metadata.contains_key("#genre"));

        let reserialized: Value = serde_json::to_value(&record).unwrap();
        assert_eq!(reserialized["rating"], Value::from(8));
        assert_eq!(reserialized["book_producer"], Value::Null);
        assert_eq!(reserialized["title"], Value::from("Bar"));
    }

    #[rstest]
    #[case(r#""2011""#, None)]
    #[case(r#""2011-03-04""#, Some(datetime!(2011-03-04 00:00:00 UTC)))]
    #[case(r#""2011-03-04T05:06:07+00:00""#, Some(datetime!(2011-03-04 05:06:07 UTC)))]
    #[case("2011", None)]
    #[case("null", None)]
    fn test_cached_pubdate_is_lenient(#[case] pubdate: &str, #[case] expected: Option<OffsetDateTime>) {
        let json = format!(r#"{{"lpath": "a.epub", "title": "A", "pubdate": {pubdate}}}"#);
        let record: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(record.pubdate, expected);
        assert_eq!(record.title, "A");
    }

    #[test]
    fn test_nulls_are_absent() {
        let json = r#"{"lpath": "a.epub", "series": null, "pubdate": null, "uuid": null}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record, Record::new("a.epub"));
    }
}
