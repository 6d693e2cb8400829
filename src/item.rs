//! Items handed to the [`Creator`](crate::Creator)

use crate::content::{ContentProvider, StringProvider};
use crate::error::CallbackResult;
use bytes::Bytes;

/// Per-entry flags influencing indexing and compression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hints {
    /// Entry is a user-facing article: listed, suggested and indexed
    pub front_article: bool,
    /// Force compression on or off; `None` decides from the mimetype
    pub compress: Option<bool>,
}

impl Hints {
    pub fn front_article() -> Self {
        Self {
            front_article: true,
            compress: None,
        }
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }
}

/// Latitude and longitude attached to indexed content
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// Text to index for an item, supplied instead of the default HTML extraction
pub trait IndexData: Send {
    fn has_index_data(&self) -> CallbackResult<bool>;
    fn title(&self) -> CallbackResult<String>;
    fn content(&self) -> CallbackResult<String>;
    fn keywords(&self) -> CallbackResult<String>;

    /// Document length used for ranking; 0 lets the index count the terms itself
    fn word_count(&self) -> CallbackResult<u32>;

    /// Position reported with search results for this item
    fn geo_position(&self) -> CallbackResult<Option<GeoPosition>> {
        Ok(None)
    }
}

/// An entry with content
///
/// Every accessor may fail; the writer reports which one failed and for
/// which item.
pub trait Item: Send {
    fn path(&self) -> CallbackResult<String>;
    fn title(&self) -> CallbackResult<String>;
    fn mimetype(&self) -> CallbackResult<String>;
    fn content_provider(&self) -> CallbackResult<Box<dyn ContentProvider>>;
    fn hints(&self) -> CallbackResult<Hints>;

    /// Custom index data; `None` uses the default extraction for HTML front articles
    fn index_data(&self) -> CallbackResult<Option<Box<dyn IndexData>>> {
        Ok(None)
    }
}

/// Item built from owned values
#[derive(Debug, Clone)]
pub struct StaticItem {
    pub path: String,
    pub title: String,
    pub mimetype: String,
    pub content: Bytes,
    pub hints: Hints,
}

impl StaticItem {
    pub fn new(path: &str, title: &str, mimetype: &str, content: impl Into<Bytes>) -> Self {
        Self {
            path: path.to_string(),
            title: title.to_string(),
            mimetype: mimetype.to_string(),
            content: content.into(),
            hints: Hints::default(),
        }
    }

    pub fn with_hints(mut self, hints: Hints) -> Self {
        self.hints = hints;
        self
    }
}

impl Item for StaticItem {
    fn path(&self) -> CallbackResult<String> {
        Ok(self.path.clone())
    }

    fn title(&self) -> CallbackResult<String> {
        Ok(self.title.clone())
    }

    fn mimetype(&self) -> CallbackResult<String> {
        Ok(self.mimetype.clone())
    }

    fn content_provider(&self) -> CallbackResult<Box<dyn ContentProvider>> {
        Ok(Box::new(StringProvider::from_bytes(self.content.clone())))
    }

    fn hints(&self) -> CallbackResult<Hints> {
        Ok(self.hints)
    }
}
