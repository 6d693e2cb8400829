use crate::archive::{Dirent, Header, MimeList, NO_PAGE};
use crate::error::{Result, ZimError};
use crate::index::{Analyzer, IndexBuilder};
use crate::metadata::{format_counter, COUNTER_KEY, DEFAULT_METADATA_MIMETYPE};
use crate::path::{
    Namespace, FULLTEXT_INDEX_PATH, LISTING_ALL_PATH, LISTING_FRONT_PATH, MAIN_PAGE_PATH,
    TITLE_INDEX_PATH,
};
use crate::writer::creator::{Creator, PendingEntry, PendingTarget, INDEX_MIMETYPE};
use bytes::Bytes;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

impl Creator {
    /// Write everything that depends on the complete set of entries
    pub(crate) fn finalize(&mut self) -> Result<()> {
        info!(path = %self.target.display(), entries = self.entries.len(), "Finalizing archive");

        // Counter metadata
        let counter = format_counter(&self.counter);
        self.add_metadata_blob(
            COUNTER_KEY,
            Bytes::from(counter.into_bytes()),
            DEFAULT_METADATA_MIMETYPE,
        )?;

        // Main page
        if let Some(main) = self.main_path.clone() {
            if self.paths.contains_key(&(Namespace::CONTENT, main.clone())) {
                self.push_entry(PendingEntry {
                    ns: Namespace::WELL_KNOWN,
                    path: MAIN_PAGE_PATH.to_string(),
                    title: String::new(),
                    front_article: false,
                    target: PendingTarget::Redirect { target: main },
                });
            } else {
                warn!(main_path = %main, "Main path does not name an entry; archive has no main page");
            }
        }

        let dropped = self.drop_dangling_redirects();

        // Index items; their content is filled in once final indexes are known
        let placeholder = PendingTarget::Redirect {
            target: String::new(),
        };
        let mut index_items = vec![LISTING_ALL_PATH, LISTING_FRONT_PATH];
        if self.fulltext.is_some() {
            index_items.push(FULLTEXT_INDEX_PATH);
        }
        let has_front_articles = self
            .entries
            .iter()
            .enumerate()
            .any(|(id, e)| {
                e.front_article && e.ns == Namespace::CONTENT && !dropped.contains(&(id as u32))
            });
        if has_front_articles {
            index_items.push(TITLE_INDEX_PATH);
        }
        let mut index_ids = Vec::new();
        for path in &index_items {
            index_ids.push(self.push_entry(PendingEntry {
                ns: Namespace::INDEX,
                path: path.to_string(),
                title: String::new(),
                front_article: false,
                target: placeholder.clone(),
            }));
        }

        // Final order: namespace then path
        let mut order: Vec<u32> = (0..self.entries.len() as u32)
            .filter(|id| !dropped.contains(id))
            .collect();
        order.sort_by(|a, b| {
            let (ea, eb) = (&self.entries[*a as usize], &self.entries[*b as usize]);
            (ea.ns, ea.path.as_bytes()).cmp(&(eb.ns, eb.path.as_bytes()))
        });
        let mut final_index = vec![None; self.entries.len()];
        for (index, id) in order.iter().enumerate() {
            final_index[*id as usize] = Some(index as u32);
        }

        // Title order: namespace then title (path when untitled)
        let mut title_order: Vec<u32> = (0..order.len() as u32).collect();
        title_order.sort_by(|a, b| {
            let ea = &self.entries[order[*a as usize] as usize];
            let eb = &self.entries[order[*b as usize] as usize];
            (ea.ns, title_key(ea), *a).cmp(&(eb.ns, title_key(eb), *b))
        });

        // Listings over user entries
        let user_titles: Vec<u32> = title_order
            .iter()
            .copied()
            .filter(|i| self.entries[order[*i as usize] as usize].ns == Namespace::CONTENT)
            .collect();
        let front_titles: Vec<u32> = user_titles
            .iter()
            .copied()
            .filter(|i| {
                let entry = &self.entries[order[*i as usize] as usize];
                entry.front_article && matches!(entry.target, PendingTarget::Content { .. })
            })
            .collect();

        let mut blobs: Vec<(Bytes, bool)> = vec![
            (encode_listing(&user_titles), false),
            (encode_listing(&front_titles), false),
        ];
        if let Some(builder) = self.fulltext.take() {
            let docs = builder.doc_count();
            let data = builder.finish(|id| final_index.get(id as usize).copied().flatten())?;
            debug!(documents = docs, bytes = data.len(), "Full-text index built");
            blobs.push((Bytes::from(data), true));
        }
        if has_front_articles {
            let mut titles = IndexBuilder::new(Analyzer::plain(), "");
            for index in &user_titles {
                let entry = &self.entries[order[*index as usize] as usize];
                if entry.front_article {
                    titles.add_document(*index, title_key(entry));
                }
            }
            blobs.push((Bytes::from(titles.finish(Some)?), true));
        }

        let mime = self.index_mimetype()?;
        for (id, (content, compress)) in index_ids.iter().zip(blobs) {
            let blob = self.store(content, compress)?;
            self.entries[*id as usize].target = PendingTarget::Content { mime, blob };
        }

        // Flush clusters and wait for the workers
        let clusters = self
            .clusters
            .take()
            .ok_or_else(|| ZimError::InvalidState("Creator is not started".into()))?;
        let (layout, slot_to_cluster) = clusters.finish()?;

        // Mimetypes are stored sorted
        let mut sorted_mimes: Vec<(usize, &String)> = self.mimetypes.iter().enumerate().collect();
        sorted_mimes.sort_by(|a, b| a.1.cmp(b.1));
        let mut mime_remap = vec![0u16; self.mimetypes.len()];
        for (new, (old, _)) in sorted_mimes.iter().enumerate() {
            mime_remap[*old] = new as u16;
        }
        let mimes = MimeList::new(sorted_mimes.iter().map(|(_, m)| (*m).clone()).collect());

        let mut dirents = Vec::with_capacity(order.len());
        for id in &order {
            let entry = &self.entries[*id as usize];
            let dirent = match &entry.target {
                PendingTarget::Content { mime, blob } => Dirent::content(
                    entry.ns.as_byte(),
                    &entry.path,
                    &entry.title,
                    mime_remap[*mime as usize],
                    slot_to_cluster[blob.slot as usize],
                    blob.blob,
                ),
                PendingTarget::Redirect { target } => {
                    let target_index = self
                        .paths
                        .get(&(Namespace::CONTENT, target.clone()))
                        .and_then(|t| final_index[*t as usize])
                        .ok_or_else(|| {
                            ZimError::InvalidState(format!("redirect target {} vanished", target))
                        })?;
                    Dirent::redirect(entry.ns.as_byte(), &entry.path, &entry.title, target_index)
                }
            };
            dirents.push(dirent);
        }

        let main_page = self
            .paths
            .get(&(Namespace::WELL_KNOWN, MAIN_PAGE_PATH.to_string()))
            .and_then(|id| final_index[*id as usize])
            .unwrap_or(NO_PAGE);
        let header = Header {
            uuid: *Uuid::new_v4().as_bytes(),
            main_page,
            ..Header::new()
        };

        let file = layout.finish(header, &mimes, &dirents, &title_order)?;
        drop(file);

        let temp = self
            .temp
            .take()
            .ok_or_else(|| ZimError::InvalidState("temporary file already released".into()))?;
        temp.persist(&self.target).map_err(|e| ZimError::Io(e.error))?;

        info!(
            path = %self.target.display(),
            entries = dirents.len(),
            dropped_redirects = dropped.len(),
            "Archive written"
        );
        Ok(())
    }

    /// Remove redirects whose target is missing, repeating until none dangle
    fn drop_dangling_redirects(&self) -> HashSet<u32> {
        let mut dropped = HashSet::new();
        loop {
            let mut changed = false;
            for (id, entry) in self.entries.iter().enumerate() {
                let id = id as u32;
                if dropped.contains(&id) {
                    continue;
                }
                let PendingTarget::Redirect { target } = &entry.target else {
                    continue;
                };
                let resolved = self
                    .paths
                    .get(&(Namespace::CONTENT, target.clone()))
                    .is_some_and(|t| !dropped.contains(t));
                if !resolved {
                    warn!(path = %entry.path, target = %target, "Dropping redirect to missing entry");
                    dropped.insert(id);
                    changed = true;
                }
            }
            if !changed {
                return dropped;
            }
        }
    }

    fn index_mimetype(&mut self) -> Result<u16> {
        let existing = self.check_mimetype(INDEX_MIMETYPE)?;
        Ok(self.register_mimetype(existing, INDEX_MIMETYPE))
    }
}

fn title_key(entry: &PendingEntry) -> &str {
    if entry.title.is_empty() {
        &entry.path
    } else {
        &entry.title
    }
}

fn encode_listing(indexes: &[u32]) -> Bytes {
    let mut out = Vec::with_capacity(indexes.len() * 4);
    for index in indexes {
        out.extend_from_slice(&index.to_le_bytes());
    }
    Bytes::from(out)
}
