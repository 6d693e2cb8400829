use crate::archive::{
    u32_at, u64_at, Cluster, ClusterCompression, Dirent, Header, MimeList, CHECKSUM_SIZE,
    HEADER_SIZE,
};
use crate::error::{Result, ZimError};
use crate::illustration::IllustrationInfo;
use crate::index::InvertedIndex;
use crate::metadata::{parse_counter, COUNTER_KEY, MANDATORY_KEYS};
use crate::path::{
    is_media_mimetype, parse_user_path, Namespace, FULLTEXT_INDEX_PATH, LEGACY_FAVICON_PATH,
    LISTING_FRONT_PATH, MAIN_PAGE_PATH, TITLE_INDEX_PATH,
};
use crate::reader::cache::{ClusterCache, DEFAULT_CLUSTER_CACHE_SIZE};
use crate::reader::entry::{Entry, Item};
use bytes::Bytes;
use memmap2::Mmap;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Illustration returned when none is requested explicitly
const DEFAULT_ILLUSTRATION: (u32, u32, f32) = (48, 48, 1.0);

pub(crate) struct ArchiveInner {
    path: PathBuf,
    data: Bytes,
    header: Header,
    mimes: MimeList,
    new_scheme: bool,
    /// Dirent indexes of user-visible entries
    user_range: Range<u32>,
    /// Title pointer positions of user-visible entries
    user_title_range: Range<u32>,
    clusters: ClusterCache,
    article_count: OnceLock<u32>,
}

/// A finished archive opened for reading
///
/// Cloning is cheap and every clone shares the mapping and the cluster
/// cache. An `Archive` can be used from several threads at once.
#[derive(Clone)]
pub struct Archive {
    inner: Arc<ArchiveInner>,
}

impl Archive {
    /// Open and validate an archive
    ///
    /// The header, table positions and mime list are checked here, so a
    /// truncated or foreign file fails immediately.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        if size < HEADER_SIZE as u64 {
            return Err(ZimError::corrupt(format!(
                "{} is too small to be an archive ({} bytes)",
                path.display(),
                size
            )));
        }

        // SAFETY: archives are immutable once written; the mapping is read-only
        let mmap = unsafe { Mmap::map(&file)? };
        let data = Bytes::from_owner(mmap);

        let header = Header::read_from(&data[..])?;
        header.validate_version()?;
        header.validate_layout(size)?;
        let mimes = MimeList::parse(&data, header.mime_list_pos as usize)?;
        let new_scheme = header.has_new_namespace_scheme();

        let mut inner = ArchiveInner {
            path,
            data,
            header,
            mimes,
            new_scheme,
            user_range: 0..0,
            user_title_range: 0..0,
            clusters: ClusterCache::new(DEFAULT_CLUSTER_CACHE_SIZE),
            article_count: OnceLock::new(),
        };
        let all = inner.header.entry_count;
        if new_scheme {
            inner.user_range = inner.namespace_range(Namespace::CONTENT)?;
            inner.user_title_range = inner.title_namespace_range(Namespace::CONTENT)?;
        } else {
            inner.user_range = 0..all;
            inner.user_title_range = 0..all;
        }
        for n in 0..inner.header.cluster_count {
            if inner.cluster_offset(n)? >= size {
                return Err(ZimError::corrupt(format!("cluster {} starts past end of file", n)));
            }
        }

        info!(
            path = %inner.path.display(),
            version = %format!("{}.{}", inner.header.version_major, inner.header.version_minor),
            entries = all,
            clusters = inner.header.cluster_count,
            "Opened archive"
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn filename(&self) -> &Path {
        &self.inner.path
    }

    pub fn filesize(&self) -> u64 {
        self.inner.data.len() as u64
    }

    pub fn header(&self) -> &Header {
        &self.inner.header
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::from_bytes(self.inner.header.uuid)
    }

    pub fn has_new_namespace_scheme(&self) -> bool {
        self.inner.new_scheme
    }

    /// Number of user-visible entries, redirects included
    pub fn entry_count(&self) -> u32 {
        self.inner.user_range.len() as u32
    }

    /// Number of dirents, internal ones included
    pub fn all_entry_count(&self) -> u32 {
        self.inner.header.entry_count
    }

    /// Number of front articles, redirects excluded
    pub fn article_count(&self) -> u32 {
        *self.inner.article_count.get_or_init(|| {
            self.compute_article_count().unwrap_or_else(|e| {
                warn!(error = %e, "Failed to count articles");
                0
            })
        })
    }

    /// Number of image, video and audio items, as recorded in `Counter`
    pub fn media_count(&self) -> Result<u64> {
        match self.metadata(COUNTER_KEY) {
            Ok(counter) => Ok(parse_counter(&String::from_utf8_lossy(&counter))
                .iter()
                .filter(|(mime, _)| is_media_mimetype(mime))
                .map(|(_, count)| count)
                .sum()),
            Err(ZimError::NotFound(_)) if !self.inner.new_scheme => {
                let range = self.inner.namespace_range(Namespace::LEGACY_IMAGE)?;
                Ok(range.len() as u64)
            }
            Err(ZimError::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn compute_article_count(&self) -> Result<u32> {
        if self.inner.new_scheme {
            if let Some(index) = self.inner.find(Namespace::INDEX, LISTING_FRONT_PATH)? {
                let listing = self.entry_at(index)?.get_item(true)?;
                return Ok((listing.size()? / 4) as u32);
            }
        }
        let ns = if self.inner.new_scheme {
            Namespace::CONTENT
        } else {
            Namespace::LEGACY_ARTICLE
        };
        let mut count = 0;
        for index in self.inner.namespace_range(ns)? {
            let dirent = self.inner.dirent(index)?;
            if !dirent.is_redirect() {
                count += 1;
            }
        }
        Ok(count)
    }

    // Checksum

    pub fn has_checksum(&self) -> bool {
        self.inner.header.checksum_pos != 0
    }

    /// Stored MD5 checksum as lowercase hex
    pub fn checksum(&self) -> Result<String> {
        let pos = self.inner.header.checksum_pos as usize;
        if pos == 0 {
            return Err(ZimError::NotFound("archive has no checksum".into()));
        }
        let stored = self
            .inner
            .data
            .get(pos..pos + CHECKSUM_SIZE)
            .ok_or_else(|| ZimError::corrupt("checksum truncated"))?;
        Ok(hex::encode(stored))
    }

    /// Recompute the MD5 of the archive and compare it to the stored one
    pub fn verify_checksum(&self) -> Result<()> {
        let expected = self.checksum()?;
        let pos = self.inner.header.checksum_pos as usize;
        let actual = hex::encode(md5::compute(&self.inner.data[..pos]).0);
        if actual != expected {
            return Err(ZimError::ChecksumMismatch { expected, actual });
        }
        debug!(path = %self.inner.path.display(), "Checksum verified");
        Ok(())
    }

    /// Whether the archive carries a checksum and it matches
    pub fn check(&self) -> bool {
        match self.verify_checksum() {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.inner.path.display(), error = %e, "Archive check failed");
                false
            }
        }
    }

    // Entry lookup

    pub fn get_entry_by_path(&self, path: &str) -> Result<Entry> {
        let (ns, stored) = parse_user_path(path, self.inner.new_scheme)
            .ok_or_else(|| ZimError::NotFound(path.to_string()))?;
        match self.inner.find(ns, stored)? {
            Some(index) => self.entry_at(index),
            None => Err(ZimError::NotFound(path.to_string())),
        }
    }

    pub fn has_entry_by_path(&self, path: &str) -> bool {
        match parse_user_path(path, self.inner.new_scheme) {
            Some((ns, stored)) => matches!(self.inner.find(ns, stored), Ok(Some(_))),
            None => false,
        }
    }

    /// Look up a user entry by its exact title
    pub fn get_entry_by_title(&self, title: &str) -> Result<Entry> {
        match self.inner.find_by_title(self.title_namespace(), title)? {
            Some(index) => self.entry_at(index),
            None => Err(ZimError::NotFound(format!("title {}", title))),
        }
    }

    pub fn has_entry_by_title(&self, title: &str) -> bool {
        matches!(
            self.inner.find_by_title(self.title_namespace(), title),
            Ok(Some(_))
        )
    }

    pub fn get_entry_by_id(&self, index: u32) -> Result<Entry> {
        if index >= self.inner.user_range.end {
            return Err(ZimError::OutOfRange {
                index,
                count: self.entry_count(),
            });
        }
        self.entry_at(index)
    }

    /// Entry the archive opens on
    ///
    /// New-scheme archives resolve `W/mainPage`; older ones use the header.
    pub fn main_entry(&self) -> Result<Entry> {
        if self.inner.new_scheme {
            if let Some(index) = self.inner.find(Namespace::WELL_KNOWN, MAIN_PAGE_PATH)? {
                return self.entry_at(index);
            }
        }
        match self.inner.header.main_page() {
            Some(index) => self.entry_at(index),
            None => Err(ZimError::NoMainEntry),
        }
    }

    pub fn has_main_entry(&self) -> bool {
        self.main_entry().is_ok()
    }

    /// A random user entry that is not a redirect
    pub fn get_random_entry(&self) -> Result<Entry> {
        let range = self.inner.user_range.clone();
        if range.is_empty() {
            return Err(ZimError::NotFound("archive has no entries".into()));
        }
        let mut rng = rand::thread_rng();
        for _ in 0..range.len().min(64) {
            let entry = self.entry_at(rng.gen_range(range.clone()))?;
            if !entry.is_redirect() {
                return Ok(entry);
            }
        }
        // Mostly redirects: take the first real item
        for index in range {
            let entry = self.entry_at(index)?;
            if !entry.is_redirect() {
                return Ok(entry);
            }
        }
        Err(ZimError::NotFound("archive has no items".into()))
    }

    /// User entries in path order
    pub fn entries_by_path(&self) -> impl Iterator<Item = Result<Entry>> + '_ {
        self.inner.user_range.clone().map(move |index| self.entry_at(index))
    }

    /// User entries in title order
    pub fn entries_by_title(&self) -> impl Iterator<Item = Result<Entry>> + '_ {
        self.inner
            .user_title_range
            .clone()
            .map(move |pos| self.inner.title_entry(pos).and_then(|index| self.entry_at(index)))
    }

    // Metadata

    /// Raw value of metadata `key`
    pub fn metadata(&self, key: &str) -> Result<Bytes> {
        self.metadata_item(key)?.content()
    }

    pub fn metadata_item(&self, key: &str) -> Result<Item> {
        match self.inner.find(Namespace::METADATA, key)? {
            Some(index) => self.entry_at(index)?.get_item(true),
            None => Err(ZimError::NotFound(format!("metadata {}", key))),
        }
    }

    /// Metadata keys in sorted order
    pub fn metadata_keys(&self) -> Result<Vec<String>> {
        self.inner
            .namespace_range(Namespace::METADATA)?
            .map(|index| self.inner.dirent(index).map(|d| d.path))
            .collect()
    }

    /// Mandatory metadata keys the archive lacks
    pub fn missing_mandatory_metadata(&self) -> Result<Vec<&'static str>> {
        let keys: BTreeSet<String> = self.metadata_keys()?.into_iter().collect();
        Ok(MANDATORY_KEYS
            .iter()
            .copied()
            .filter(|key| !keys.contains(*key))
            .collect())
    }

    pub fn has_complete_mandatory_metadata(&self) -> bool {
        matches!(self.missing_mandatory_metadata(), Ok(missing) if missing.is_empty())
    }

    // Illustrations

    /// Every illustration stored in metadata
    pub fn illustration_infos(&self) -> Result<Vec<IllustrationInfo>> {
        let mut infos = Vec::new();
        for key in self.metadata_keys()? {
            if IllustrationInfo::is_illustration_name(&key) {
                infos.push(IllustrationInfo::from_metadata_item_name(&key)?);
            }
        }
        if infos.is_empty() && !self.inner.new_scheme && self.legacy_favicon()?.is_some() {
            let (w, h, scale) = DEFAULT_ILLUSTRATION;
            infos.push(IllustrationInfo::new(w, h, scale));
        }
        Ok(infos)
    }

    /// Illustrations of exactly `width`x`height` with a scale of at least `min_scale`
    ///
    /// The filters come as a set: give all three or none.
    pub fn illustration_infos_filtered(
        &self,
        width: Option<u32>,
        height: Option<u32>,
        min_scale: Option<f32>,
    ) -> Result<Vec<IllustrationInfo>> {
        let infos = self.illustration_infos()?;
        match (width, height, min_scale) {
            (None, None, None) => Ok(infos),
            (Some(w), Some(h), Some(scale)) => Ok(infos
                .into_iter()
                .filter(|i| i.width == w && i.height == h && i.scale >= scale)
                .collect()),
            _ => Err(ZimError::ContractViolation(
                "Either provide all of width, height and min_scale or none".into(),
            )),
        }
    }

    /// Widths of the square illustrations at scale 1
    pub fn illustration_sizes(&self) -> Result<BTreeSet<u32>> {
        Ok(self
            .illustration_infos()?
            .into_iter()
            .filter(|i| i.width == i.height && i.scale == 1.0)
            .map(|i| i.width)
            .collect())
    }

    pub fn has_illustration(&self, info: Option<&IllustrationInfo>) -> bool {
        self.illustration_item(info).is_ok()
    }

    /// Illustration content; `None` asks for the default 48x48 at scale 1
    pub fn illustration_item(&self, info: Option<&IllustrationInfo>) -> Result<Item> {
        let default = {
            let (w, h, scale) = DEFAULT_ILLUSTRATION;
            IllustrationInfo::new(w, h, scale)
        };
        let requested = info.unwrap_or(&default);
        match self.metadata_item(&requested.as_metadata_item_name()) {
            Err(ZimError::NotFound(_)) if !self.inner.new_scheme && *requested == default => {
                match self.legacy_favicon()? {
                    Some(index) => self.entry_at(index)?.get_item(true),
                    None => Err(ZimError::NotFound(format!(
                        "illustration {}",
                        requested
                    ))),
                }
            }
            Err(ZimError::NotFound(_)) => {
                Err(ZimError::NotFound(format!("illustration {}", requested)))
            }
            other => other,
        }
    }

    fn legacy_favicon(&self) -> Result<Option<u32>> {
        self.inner.find(Namespace::LEGACY_LAYOUT, LEGACY_FAVICON_PATH)
    }

    // Indexes

    pub fn has_fulltext_index(&self) -> bool {
        self.inner.new_scheme
            && matches!(self.inner.find(Namespace::INDEX, FULLTEXT_INDEX_PATH), Ok(Some(_)))
    }

    pub fn has_title_index(&self) -> bool {
        self.inner.new_scheme
            && matches!(self.inner.find(Namespace::INDEX, TITLE_INDEX_PATH), Ok(Some(_)))
    }

    /// Parse the inverted index stored at `X/{path}`, if present
    pub(crate) fn inverted_index(&self, path: &str) -> Result<Option<InvertedIndex>> {
        if !self.inner.new_scheme {
            return Ok(None);
        }
        match self.inner.find(Namespace::INDEX, path)? {
            Some(index) => {
                let content = self.entry_at(index)?.get_item(true)?.content()?;
                InvertedIndex::parse(content).map(Some)
            }
            None => Ok(None),
        }
    }

    // Cluster cache

    pub fn cluster_cache_max_size(&self) -> usize {
        self.inner.clusters.max_size()
    }

    pub fn set_cluster_cache_max_size(&self, max_size: usize) {
        self.inner.clusters.set_max_size(max_size);
    }

    pub fn cluster_cache_current_size(&self) -> usize {
        self.inner.clusters.len()
    }

    // Crate internals shared with entries and search

    pub(crate) fn entry_at(&self, index: u32) -> Result<Entry> {
        if index >= self.inner.header.entry_count {
            return Err(ZimError::OutOfRange {
                index,
                count: self.inner.header.entry_count,
            });
        }
        let dirent = self.inner.dirent(index)?;
        Ok(Entry::new(self.clone(), index, dirent))
    }

    pub(crate) fn mimetype(&self, index: u16) -> Result<&str> {
        self.inner.mimes.get(index)
    }

    pub(crate) fn cluster(&self, number: u32) -> Result<Arc<Cluster>> {
        self.inner.cluster(number)
    }

    pub(crate) fn cluster_offset(&self, number: u32) -> Result<u64> {
        self.inner.cluster_offset(number)
    }

    /// Dirent index at title pointer position `pos`
    pub(crate) fn title_entry(&self, pos: u32) -> Result<u32> {
        self.inner.title_entry(pos)
    }

    pub(crate) fn user_title_range(&self) -> Range<u32> {
        self.inner.user_title_range.clone()
    }

    pub(crate) fn is_user_entry(&self, index: u32) -> bool {
        self.inner.user_range.contains(&index)
    }

    fn title_namespace(&self) -> Namespace {
        if self.inner.new_scheme {
            Namespace::CONTENT
        } else {
            Namespace::LEGACY_ARTICLE
        }
    }
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.inner.path)
            .field("entries", &self.inner.header.entry_count)
            .field("new_scheme", &self.inner.new_scheme)
            .finish()
    }
}

impl PartialEq for Archive {
    /// Two handles are equal when they were opened from the same file
    fn eq(&self, other: &Self) -> bool {
        self.inner.path == other.inner.path && self.inner.header == other.inner.header
    }
}

impl ArchiveInner {
    pub(crate) fn dirent(&self, index: u32) -> Result<Dirent> {
        let ptr = u64_at(&self.data, self.header.path_ptr_pos as usize + index as usize * 8)?;
        Dirent::parse(&self.data, ptr as usize)
    }

    fn title_entry(&self, pos: u32) -> Result<u32> {
        u32_at(&self.data, self.header.title_ptr_pos as usize + pos as usize * 4)
    }

    /// Binary search the path-ordered dirents for (`ns`, `path`)
    fn find(&self, ns: Namespace, path: &str) -> Result<Option<u32>> {
        let (mut lo, mut hi) = (0u32, self.header.entry_count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let dirent = self.dirent(mid)?;
            match (dirent.namespace, dirent.path.as_bytes()).cmp(&(ns.as_byte(), path.as_bytes())) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Some(mid)),
            }
        }
        Ok(None)
    }

    /// Binary search the title pointer list for (`ns`, `title`)
    fn find_by_title(&self, ns: Namespace, title: &str) -> Result<Option<u32>> {
        let (mut lo, mut hi) = (0u32, self.header.entry_count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let index = self.title_entry(mid)?;
            let dirent = self.dirent(index)?;
            let key = (dirent.namespace, dirent.title().as_bytes());
            match key.cmp(&(ns.as_byte(), title.as_bytes())) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => {
                    // Several entries may share a title; return the first
                    let mut first = mid;
                    while first > 0 {
                        let prev = self.dirent(self.title_entry(first - 1)?)?;
                        if prev.namespace != ns.as_byte() || prev.title() != title {
                            break;
                        }
                        first -= 1;
                    }
                    return self.title_entry(first).map(Some);
                }
            }
        }
        Ok(None)
    }

    /// Dirent indexes of namespace `ns`
    fn namespace_range(&self, ns: Namespace) -> Result<Range<u32>> {
        let count = self.header.entry_count;
        let start = self.partition(count, |i| Ok(self.dirent(i)?.namespace < ns.as_byte()))?;
        let end = self.partition(count, |i| Ok(self.dirent(i)?.namespace <= ns.as_byte()))?;
        Ok(start..end)
    }

    /// Title pointer positions of namespace `ns`
    fn title_namespace_range(&self, ns: Namespace) -> Result<Range<u32>> {
        let count = self.header.entry_count;
        let ns_at = |pos: u32| -> Result<u8> { Ok(self.dirent(self.title_entry(pos)?)?.namespace) };
        let start = self.partition(count, |pos| Ok(ns_at(pos)? < ns.as_byte()))?;
        let end = self.partition(count, |pos| Ok(ns_at(pos)? <= ns.as_byte()))?;
        Ok(start..end)
    }

    /// First position in `0..count` where `pred` turns false
    fn partition<F>(&self, count: u32, pred: F) -> Result<u32>
    where
        F: Fn(u32) -> Result<bool>,
    {
        let (mut lo, mut hi) = (0u32, count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if pred(mid)? {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    fn cluster_offset(&self, number: u32) -> Result<u64> {
        if number >= self.header.cluster_count {
            return Err(ZimError::corrupt(format!(
                "cluster {} out of range ({} clusters)",
                number, self.header.cluster_count
            )));
        }
        u64_at(&self.data, self.header.cluster_ptr_pos as usize + number as usize * 8)
    }

    fn cluster(&self, number: u32) -> Result<Arc<Cluster>> {
        self.clusters.get_or_load(number, || {
            let start = self.cluster_offset(number)? as usize;
            let end = self.cluster_end(number, start)?;
            let cluster = Cluster::decode(self.data.slice(start..end))?;
            if cluster.compression() != ClusterCompression::None {
                debug!(cluster = number, size = cluster.size(), "Decompressed cluster");
            }
            Ok(cluster)
        })
    }

    /// End of cluster `number`: the next cluster, else the checksum or end of file
    fn cluster_end(&self, number: u32, start: usize) -> Result<usize> {
        let limit = match self.header.checksum_pos {
            0 => self.data.len(),
            pos => pos as usize,
        };
        if number + 1 < self.header.cluster_count {
            let next = self.cluster_offset(number + 1)? as usize;
            if next > start && next <= limit {
                return Ok(next);
            }
        }
        if start >= limit {
            return Err(ZimError::corrupt(format!("cluster {} starts past its end", number)));
        }
        Ok(limit)
    }
}
