use crate::archive::{LayoutWriter, MIME_LIST_CAPACITY};
use crate::config::CreatorConfig;
use crate::content::read_all;
use crate::error::{CallbackError, Result, ZimError};
use crate::illustration::IllustrationInfo;
use crate::index::{extract_text, is_html, Analyzer, DocumentInfo, IndexBuilder};
use crate::item::{Hints, Item};
use crate::metadata::{normalize_key, MetadataValue, COUNTER_KEY, DEFAULT_METADATA_MIMETYPE};
use crate::path::{is_precompressed_mimetype, validate_path, Namespace};
use crate::writer::clusters::{BlobRef, ClusterManager};
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, error, info};

/// Mimetype of listing and index items
pub(crate) const INDEX_MIMETYPE: &str = "application/octet-stream";

/// Mimetypes finalize always writes; reserved up front so `close` never runs out of room
const FINALIZE_MIMETYPES: [&str; 2] = [DEFAULT_METADATA_MIMETYPE, INDEX_MIMETYPE];

/// Creator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatorState {
    Started,
    Finalizing,
    Closed,
    /// A fatal I/O error ended the session
    Failed,
}

#[derive(Debug, Clone)]
pub(crate) enum PendingTarget {
    Content { mime: u16, blob: BlobRef },
    Redirect { target: String },
}

/// Entry recorded during writing, addressed by its provisional id
#[derive(Debug, Clone)]
pub(crate) struct PendingEntry {
    pub ns: Namespace,
    pub path: String,
    pub title: String,
    pub front_article: bool,
    pub target: PendingTarget,
}

/// Writes a new archive
///
/// The archive is assembled in a temporary file next to the target and
/// moved into place by [`close`](Self::close). Dropping a started creator
/// closes it; [`discard`](Self::discard) abandons it without leaving a file.
pub struct Creator {
    pub(crate) config: CreatorConfig,
    pub(crate) target: PathBuf,
    pub(crate) temp: Option<TempPath>,
    pub(crate) clusters: Option<ClusterManager>,
    pub(crate) state: CreatorState,
    pub(crate) entries: Vec<PendingEntry>,
    pub(crate) paths: HashMap<(Namespace, String), u32>,
    pub(crate) mimetypes: Vec<String>,
    mime_lookup: HashMap<String, u16>,
    mime_list_size: usize,
    pub(crate) counter: BTreeMap<String, u64>,
    pub(crate) fulltext: Option<IndexBuilder>,
    pub(crate) main_path: Option<String>,
}

impl Creator {
    /// Validate `config` and open the archive for writing
    ///
    /// Fails immediately when the target directory is missing or not writable.
    pub fn create<P: AsRef<Path>>(path: P, config: CreatorConfig) -> Result<Self> {
        config.validate()?;
        let target = path.as_ref().to_path_buf();
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ZimError::InvalidConfig(format!("{} is not a file path", target.display()))
            })?;

        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(".tmp")
            .tempfile_in(&parent)?;
        let (file, temp_path) = temp.into_parts();
        let layout = LayoutWriter::new(file)?;
        let clusters = ClusterManager::new(layout, &config)?;

        let fulltext = config.indexing.enabled.then(|| {
            IndexBuilder::new(
                Analyzer::for_language(&config.indexing.language),
                &config.indexing.language,
            )
        });

        info!(
            path = %target.display(),
            compression = %config.compression,
            cluster_size = config.cluster_size,
            workers = config.workers,
            indexing = config.indexing.enabled,
            "Creator started"
        );

        let mut creator = Self {
            main_path: config.main_path.clone(),
            config,
            target,
            temp: Some(temp_path),
            clusters: Some(clusters),
            state: CreatorState::Started,
            entries: Vec::new(),
            paths: HashMap::new(),
            mimetypes: Vec::new(),
            mime_lookup: HashMap::new(),
            mime_list_size: 1,
            counter: BTreeMap::new(),
            fulltext,
        };
        for mimetype in FINALIZE_MIMETYPES {
            creator.register_mimetype(None, mimetype);
        }
        Ok(creator)
    }

    pub fn config(&self) -> &CreatorConfig {
        &self.config
    }

    pub fn state(&self) -> CreatorState {
        self.state
    }

    pub fn target_path(&self) -> &Path {
        &self.target
    }

    /// Add an item in the user content namespace
    pub fn add_item<I: Item + ?Sized>(&mut self, item: &I) -> Result<()> {
        self.ensure_started()?;

        let path = item
            .path()
            .map_err(|e| ZimError::callback("path", "<unknown>", e))?;
        validate_path(&path)?;
        self.ensure_new(Namespace::CONTENT, &path)?;

        let title = item.title().map_err(|e| ZimError::callback("title", &path, e))?;
        let mimetype = item
            .mimetype()
            .map_err(|e| ZimError::callback("mimetype", &path, e))?;
        let hints = item.hints().map_err(|e| ZimError::callback("hints", &path, e))?;
        let mut provider = item
            .content_provider()
            .map_err(|e| ZimError::callback("content_provider", &path, e))?;
        let content = read_all(&path, provider.as_mut())?;

        // Everything the item can fail on is gathered before any state changes
        let index_text = self.index_text(item, &path, &title, &mimetype, &hints, &content)?;
        let mime = self.check_mimetype(&mimetype)?;

        let compress = hints
            .compress
            .unwrap_or_else(|| !is_precompressed_mimetype(&mimetype));
        let blob = self.store(content, compress)?;
        let mime = self.register_mimetype(mime, &mimetype);

        let id = self.push_entry(PendingEntry {
            ns: Namespace::CONTENT,
            path,
            title,
            front_article: hints.front_article,
            target: PendingTarget::Content { mime, blob },
        });
        *self.counter.entry(mimetype).or_insert(0) += 1;
        if let (Some(builder), Some((text, info))) = (self.fulltext.as_mut(), index_text) {
            builder.add_document_with(id, &text, info);
        }
        Ok(())
    }

    /// Add a text metadata value; the key is normalized first
    pub fn add_metadata<V: Into<MetadataValue>>(&mut self, key: &str, value: V) -> Result<()> {
        self.add_metadata_with_mimetype(key, value, DEFAULT_METADATA_MIMETYPE)
    }

    pub fn add_metadata_with_mimetype<V: Into<MetadataValue>>(
        &mut self,
        key: &str,
        value: V,
        mimetype: &str,
    ) -> Result<()> {
        self.ensure_started()?;
        let key = normalize_key(key);
        validate_path(&key)?;
        if key == COUNTER_KEY {
            return Err(ZimError::DuplicateEntry(format!(
                "M/{}: computed by the creator",
                key
            )));
        }
        self.add_metadata_blob(&key, value.into().to_bytes(), mimetype)
    }

    /// Store an illustration as `M/Illustration_{w}x{h}@{scale}`
    pub fn add_illustration<I: Into<IllustrationInfo>>(
        &mut self,
        info: I,
        content: impl Into<Bytes>,
    ) -> Result<()> {
        self.ensure_started()?;
        let info = info.into();
        if info.width == 0 || info.height == 0 || !info.scale.is_finite() || info.scale <= 0.0 {
            return Err(ZimError::ContractViolation(format!(
                "invalid illustration size {}",
                info
            )));
        }
        // Identity is the metadata name, so attributes tell illustrations apart
        let key = info.as_metadata_item_name();
        self.add_metadata_blob(&key, content.into(), "image/png")
    }

    /// Add a redirect; the target is resolved when the archive is closed
    pub fn add_redirection(
        &mut self,
        path: &str,
        title: &str,
        target: &str,
        hints: Hints,
    ) -> Result<()> {
        self.ensure_started()?;
        validate_path(path)?;
        validate_path(target)?;
        self.ensure_new(Namespace::CONTENT, path)?;
        self.push_entry(PendingEntry {
            ns: Namespace::CONTENT,
            path: path.to_string(),
            title: title.to_string(),
            front_article: hints.front_article,
            target: PendingTarget::Redirect {
                target: target.to_string(),
            },
        });
        Ok(())
    }

    /// Add a second entry sharing the content of an existing item
    pub fn add_alias(&mut self, path: &str, title: &str, target: &str, hints: Hints) -> Result<()> {
        self.ensure_started()?;
        validate_path(path)?;
        self.ensure_new(Namespace::CONTENT, path)?;
        let target_id = self
            .paths
            .get(&(Namespace::CONTENT, target.to_string()))
            .copied()
            .ok_or_else(|| ZimError::NotFound(format!("alias target {} doesn't exist", target)))?;
        let target_entry = &self.entries[target_id as usize];
        let PendingTarget::Content { mime, blob } = target_entry.target else {
            return Err(ZimError::ContractViolation(format!(
                "alias target {} is a redirect",
                target
            )));
        };
        self.push_entry(PendingEntry {
            ns: Namespace::CONTENT,
            path: path.to_string(),
            title: title.to_string(),
            front_article: hints.front_article,
            target: PendingTarget::Content { mime, blob },
        });
        Ok(())
    }

    /// Set the entry the archive's main page points to
    pub fn set_main_path(&mut self, path: &str) -> Result<()> {
        self.ensure_started()?;
        validate_path(path)?;
        self.main_path = Some(path.to_string());
        Ok(())
    }

    /// Finalize the archive and move it to its target path
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            CreatorState::Started => {}
            CreatorState::Closed => {
                return Err(ZimError::InvalidState("Creator already closed".into()))
            }
            CreatorState::Finalizing => {
                return Err(ZimError::InvalidState("Creator is finalizing".into()))
            }
            CreatorState::Failed => {
                return Err(ZimError::InvalidState("Creator failed; archive not written".into()))
            }
        }
        self.state = CreatorState::Finalizing;
        match self.finalize() {
            Ok(()) => {
                self.state = CreatorState::Closed;
                Ok(())
            }
            Err(e) => {
                self.state = CreatorState::Failed;
                self.abandon();
                Err(e)
            }
        }
    }

    /// Abandon the archive; no file is left at the target path
    pub fn discard(mut self) {
        debug!(path = %self.target.display(), "Creator discarded");
        self.abandon();
        self.state = CreatorState::Closed;
    }

    fn abandon(&mut self) {
        // Dropping the manager stops its workers; dropping the temp path deletes the file
        self.clusters = None;
        if let Some(temp) = self.temp.take() {
            if let Err(e) = temp.close() {
                debug!(error = %e, "Failed to remove temporary file");
            }
        }
    }

    pub(crate) fn ensure_started(&self) -> Result<()> {
        match self.state {
            CreatorState::Started => Ok(()),
            CreatorState::Closed => Err(ZimError::InvalidState("Creator already closed".into())),
            CreatorState::Finalizing => {
                Err(ZimError::InvalidState("Creator is finalizing".into()))
            }
            CreatorState::Failed => Err(ZimError::InvalidState(
                "Creator failed and is not started".into(),
            )),
        }
    }

    fn ensure_new(&self, ns: Namespace, path: &str) -> Result<()> {
        if self.paths.contains_key(&(ns, path.to_string())) {
            return Err(ZimError::DuplicateEntry(format!("{}/{}", ns, path)));
        }
        Ok(())
    }

    pub(crate) fn push_entry(&mut self, entry: PendingEntry) -> u32 {
        let id = self.entries.len() as u32;
        self.paths.insert((entry.ns, entry.path.clone()), id);
        self.entries.push(entry);
        id
    }

    pub(crate) fn add_metadata_blob(&mut self, key: &str, content: Bytes, mimetype: &str) -> Result<()> {
        self.ensure_new(Namespace::METADATA, key)?;
        let mime = self.check_mimetype(mimetype)?;
        let blob = self.store(content, !is_precompressed_mimetype(mimetype))?;
        let mime = self.register_mimetype(mime, mimetype);
        self.push_entry(PendingEntry {
            ns: Namespace::METADATA,
            path: key.to_string(),
            title: String::new(),
            front_article: false,
            target: PendingTarget::Content { mime, blob },
        });
        Ok(())
    }

    /// Existing index of `mimetype`, or `None` if registering it still fits the mime list
    pub(crate) fn check_mimetype(&self, mimetype: &str) -> Result<Option<u16>> {
        if let Some(index) = self.mime_lookup.get(mimetype) {
            return Ok(Some(*index));
        }
        if mimetype.is_empty() || mimetype.contains('\0') {
            return Err(ZimError::ContractViolation(format!(
                "invalid mimetype {:?}",
                mimetype
            )));
        }
        if self.mime_list_size + mimetype.len() + 1 > MIME_LIST_CAPACITY {
            return Err(ZimError::ContractViolation(format!(
                "too many distinct mimetypes to add {}",
                mimetype
            )));
        }
        Ok(None)
    }

    pub(crate) fn register_mimetype(&mut self, existing: Option<u16>, mimetype: &str) -> u16 {
        if let Some(index) = existing {
            return index;
        }
        let index = self.mimetypes.len() as u16;
        self.mimetypes.push(mimetype.to_string());
        self.mime_lookup.insert(mimetype.to_string(), index);
        self.mime_list_size += mimetype.len() + 1;
        index
    }

    /// Hand content to the cluster manager; an I/O failure here ends the session
    pub(crate) fn store(&mut self, content: Bytes, compress: bool) -> Result<BlobRef> {
        let clusters = self
            .clusters
            .as_mut()
            .ok_or_else(|| ZimError::InvalidState("Creator is not started".into()))?;
        match clusters.add_blob(content, compress) {
            Ok(blob) => Ok(blob),
            Err(e) => {
                error!(error = %e, "Writing cluster failed; aborting archive");
                self.state = CreatorState::Failed;
                self.abandon();
                Err(e)
            }
        }
    }

    /// Text and document facts to feed the full-text index for this item, if any
    fn index_text<I: Item + ?Sized>(
        &self,
        item: &I,
        path: &str,
        title: &str,
        mimetype: &str,
        hints: &Hints,
        content: &Bytes,
    ) -> Result<Option<(String, DocumentInfo)>> {
        if self.fulltext.is_none() {
            return Ok(None);
        }
        let wrap = |accessor: &'static str| move |e: CallbackError| ZimError::callback(accessor, path, e);

        if let Some(data) = item.index_data().map_err(wrap("index_data"))? {
            if !data.has_index_data().map_err(wrap("has_index_data"))? {
                return Ok(None);
            }
            let parts = [
                data.title().map_err(wrap("index_data.title"))?,
                data.keywords().map_err(wrap("index_data.keywords"))?,
                data.content().map_err(wrap("index_data.content"))?,
            ];
            let info = DocumentInfo {
                word_count: Some(data.word_count().map_err(wrap("index_data.word_count"))?),
                geo_position: data
                    .geo_position()
                    .map_err(wrap("index_data.geo_position"))?,
            };
            return Ok(Some((parts.join("\n"), info)));
        }

        if !hints.front_article || !is_html(mimetype) {
            return Ok(None);
        }
        let html = String::from_utf8_lossy(content);
        let text = extract_text(&html);
        let title = if title.is_empty() { text.title } else { title.to_string() };
        Ok(Some((format!("{}\n{}", title, text.body), DocumentInfo::default())))
    }
}

impl Drop for Creator {
    fn drop(&mut self) {
        if self.state == CreatorState::Started {
            if let Err(e) = self.close() {
                error!(path = %self.target.display(), error = %e, "Failed to finalize archive on drop");
            }
        }
    }
}

impl std::fmt::Debug for Creator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Creator")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("entries", &self.entries.len())
            .finish()
    }
}
