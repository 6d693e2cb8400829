//! On-disk ZIM structures shared by the reader and the writer

mod cluster;
mod dirent;
mod format;
mod layout;
mod mimetypes;

pub use cluster::{encode_cluster, Cluster, ClusterCompression, EXTENDED_FLAG};
pub use dirent::{Dirent, DirentTarget, REDIRECT_MIME};
pub use format::{
    Header, CHECKSUM_SIZE, CLUSTER_BASE_OFFSET, FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR,
    HEADER_SIZE, MAGIC_NUMBER, NO_PAGE,
};
pub use layout::{LayoutWriter, MIME_LIST_CAPACITY};
pub use mimetypes::MimeList;

pub(crate) use format::{u32_at, u64_at};
