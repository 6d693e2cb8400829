//! Metadata keys and values

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use std::collections::BTreeMap;

/// Keys every well-formed archive carries
pub const MANDATORY_KEYS: [&str; 7] = [
    "Name",
    "Title",
    "Creator",
    "Publisher",
    "Date",
    "Description",
    "Language",
];

/// Optional keys with a canonical spelling
pub const OPTIONAL_KEYS: [&str; 7] = [
    "Longdescription",
    "Licence",
    "Tags",
    "Flavour",
    "Source",
    "Scraper",
    "Counter",
];

/// Key written by the creator itself from item mimetypes
pub const COUNTER_KEY: &str = "Counter";

/// Mimetype used for text metadata
pub const DEFAULT_METADATA_MIMETYPE: &str = "text/plain;charset=utf-8";

/// Canonical spelling of a metadata key
///
/// Recognized keys match case-insensitively and ignoring underscores
/// (`long_description` becomes `Longdescription`). Other snake_case keys
/// are pascalized; anything else is kept as given.
pub fn normalize_key(key: &str) -> String {
    let folded: String = key
        .chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect();
    if let Some(known) = MANDATORY_KEYS
        .iter()
        .chain(OPTIONAL_KEYS.iter())
        .find(|k| k.to_lowercase() == folded)
    {
        return (*known).to_string();
    }

    let is_snake = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if is_snake {
        key.split('_')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect()
    } else {
        key.to_string()
    }
}

/// Value accepted by `add_metadata`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Text(String),
    Bytes(Bytes),
    Date(NaiveDate),
}

impl MetadataValue {
    /// Stored representation; dates become `YYYY-MM-DD`
    pub fn to_bytes(&self) -> Bytes {
        match self {
            MetadataValue::Text(s) => Bytes::from(s.clone().into_bytes()),
            MetadataValue::Bytes(b) => b.clone(),
            MetadataValue::Date(d) => Bytes::from(d.format("%Y-%m-%d").to_string().into_bytes()),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

impl From<Vec<u8>> for MetadataValue {
    fn from(b: Vec<u8>) -> Self {
        MetadataValue::Bytes(Bytes::from(b))
    }
}

impl From<&[u8]> for MetadataValue {
    fn from(b: &[u8]) -> Self {
        MetadataValue::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<Bytes> for MetadataValue {
    fn from(b: Bytes) -> Self {
        MetadataValue::Bytes(b)
    }
}

impl From<NaiveDate> for MetadataValue {
    fn from(d: NaiveDate) -> Self {
        MetadataValue::Date(d)
    }
}

impl From<NaiveDateTime> for MetadataValue {
    fn from(dt: NaiveDateTime) -> Self {
        MetadataValue::Date(dt.date())
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for MetadataValue {
    fn from(dt: DateTime<Tz>) -> Self {
        MetadataValue::Date(dt.date_naive())
    }
}

/// Format mimetype counts as `mime=count;mime=count`, sorted by mimetype
pub fn format_counter(counts: &BTreeMap<String, u64>) -> String {
    counts
        .iter()
        .map(|(mime, count)| format!("{}={}", mime, count))
        .collect::<Vec<_>>()
        .join(";")
}

/// Parse a `Counter` value back into mimetype counts
///
/// Malformed pairs are skipped.
pub fn parse_counter(value: &str) -> BTreeMap<String, u64> {
    value
        .split(';')
        .filter_map(|pair| {
            let (mime, count) = pair.rsplit_once('=')?;
            Some((mime.trim().to_string(), count.trim().parse().ok()?))
        })
        .collect()
}
