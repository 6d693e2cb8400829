//! zim-rs: reading and writing ZIM archives
//!
//! ZIM packs a website (articles, images, metadata) into one compressed,
//! randomly accessible file. This crate provides:
//! - [`Creator`] to write archives, compressing clusters on a worker pool
//! - [`Archive`] to open them, with zero-copy content views
//! - [`Searcher`] and [`SuggestionSearcher`] over the embedded indexes
//!
//! # Example
//!
//! ```no_run
//! use zim_rs::{Archive, Creator, CreatorConfig, Hints, StaticItem};
//!
//! let config = CreatorConfig::new().with_indexing(true, "eng");
//! let mut creator = Creator::create("example.zim", config)?;
//! let item = StaticItem::new("home", "Home", "text/html", "<h1>Hello</h1>")
//!     .with_hints(Hints::front_article());
//! creator.add_item(&item)?;
//! creator.add_metadata("Title", "Example")?;
//! creator.set_main_path("home")?;
//! creator.close()?;
//!
//! let archive = Archive::open("example.zim")?;
//! let content = archive.main_entry()?.get_item(true)?.content()?;
//! assert_eq!(&content[..], b"<h1>Hello</h1>");
//! # Ok::<(), zim_rs::ZimError>(())
//! ```

pub mod archive;
pub mod config;
pub mod content;
pub mod error;
pub mod illustration;
pub mod index;
pub mod item;
pub mod metadata;
pub mod path;
pub mod reader;
pub mod search;
pub mod writer;

pub use config::{Compression, CreatorConfig, IndexingConfig};
pub use content::{ContentProvider, FileProvider, StringProvider};
pub use error::{CallbackError, CallbackResult, ErrorKind, Result, ZimError};
pub use illustration::IllustrationInfo;
pub use item::{GeoPosition, Hints, IndexData, Item, StaticItem};
pub use metadata::MetadataValue;
pub use path::Namespace;
pub use reader::{Archive, Entry, Item as ArchiveItem};
pub use search::{Query, Search, SearchResult, Searcher, SuggestionSearch, SuggestionSearcher};
pub use writer::{Creator, CreatorState};
