use crate::archive::{ClusterCompression, Dirent, DirentTarget};
use crate::error::{Result, ZimError};
use crate::path::{user_path, Namespace};
use crate::reader::archive::Archive;
use bytes::Bytes;

/// Longest redirect chain followed by [`Entry::get_item`]
pub const MAX_REDIRECT_HOPS: usize = 50;

/// An addressable entry: either an item or a redirect to another entry
#[derive(Debug, Clone)]
pub struct Entry {
    archive: Archive,
    index: u32,
    dirent: Dirent,
}

impl Entry {
    pub(crate) fn new(archive: Archive, index: u32, dirent: Dirent) -> Self {
        Self {
            archive,
            index,
            dirent,
        }
    }

    /// User-visible path
    pub fn path(&self) -> String {
        user_path(
            Namespace::from_byte(self.dirent.namespace),
            &self.dirent.path,
            self.archive.has_new_namespace_scheme(),
        )
    }

    /// Title, falling back to the stored path
    pub fn title(&self) -> &str {
        self.dirent.title()
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::from_byte(self.dirent.namespace)
    }

    pub fn is_redirect(&self) -> bool {
        self.dirent.is_redirect()
    }

    /// Index of the entry this redirect points to
    pub fn get_redirect_entry_by_index(&self) -> Result<u32> {
        match self.dirent.target {
            DirentTarget::Redirect(target) => Ok(target),
            _ => Err(ZimError::NotARedirect(self.path())),
        }
    }

    /// Entry this redirect points to, one hop only
    pub fn get_redirect_entry(&self) -> Result<Entry> {
        let target = self.get_redirect_entry_by_index()?;
        self.archive.entry_at(target)
    }

    /// Item behind this entry
    ///
    /// With `follow`, redirect chains are resolved; otherwise a redirect is
    /// an error.
    pub fn get_item(&self, follow: bool) -> Result<Item> {
        let mut current = self.clone();
        for _ in 0..=MAX_REDIRECT_HOPS {
            match current.dirent.target {
                DirentTarget::Content { cluster, blob } => {
                    let mimetype = self.archive.mimetype(current.dirent.mime_index)?.to_string();
                    return Ok(Item {
                        path: current.path(),
                        title: current.title().to_string(),
                        archive: current.archive,
                        index: current.index,
                        mimetype,
                        cluster,
                        blob,
                    });
                }
                DirentTarget::Redirect(target) => {
                    if !follow {
                        return Err(ZimError::InvalidState(format!(
                            "{} is a redirect",
                            self.path()
                        )));
                    }
                    current = self.archive.entry_at(target)?;
                }
                DirentTarget::Placeholder => {
                    return Err(ZimError::corrupt(format!(
                        "{} has no content",
                        current.path()
                    )));
                }
            }
        }
        Err(ZimError::corrupt(format!(
            "redirect chain from {} exceeds {} hops",
            self.path(),
            MAX_REDIRECT_HOPS
        )))
    }
}

/// Content of an entry
///
/// [`content`](Self::content) returns a view that owns its buffer: it stays
/// valid after the item, the entry and even the archive handle are dropped.
#[derive(Debug, Clone)]
pub struct Item {
    archive: Archive,
    index: u32,
    path: String,
    title: String,
    mimetype: String,
    cluster: u32,
    blob: u32,
}

impl Item {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn mimetype(&self) -> &str {
        &self.mimetype
    }

    /// Index of the dirent holding the content
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn size(&self) -> Result<u64> {
        self.archive.cluster(self.cluster)?.blob_size(self.blob as usize)
    }

    pub fn content(&self) -> Result<Bytes> {
        self.archive.cluster(self.cluster)?.blob(self.blob as usize)
    }

    /// Absolute file offset of the content when it is stored uncompressed
    pub fn direct_access(&self) -> Result<Option<u64>> {
        let cluster = self.archive.cluster(self.cluster)?;
        if cluster.compression() != ClusterCompression::None {
            return Ok(None);
        }
        let start = self.archive.cluster_offset(self.cluster)?;
        // The payload follows the info byte
        Ok(Some(start + 1 + cluster.blob_offset(self.blob as usize)?))
    }
}
