//! Reading finished archives
//!
//! The file is memory-mapped once. Uncompressed clusters are served straight
//! from the mapping and compressed ones are decoded into an LRU cache; either
//! way, content comes back as [`bytes::Bytes`] that owns its buffer.

mod archive;
mod cache;
mod entry;

pub use archive::Archive;
pub use cache::DEFAULT_CLUSTER_CACHE_SIZE;
pub use entry::{Entry, Item, MAX_REDIRECT_HOPS};
