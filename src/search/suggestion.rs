use crate::error::Result;
use crate::index::{fold, words, InvertedIndex};
use crate::path::TITLE_INDEX_PATH;
use crate::reader::Archive;
use crate::search::{highlight, page, to_results, Hit, SearchResult};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Suggests entries whose title matches what the user is typing
///
/// Every query word matches title words by prefix. Archives without a title
/// index fall back to titles starting with the query.
#[derive(Clone)]
pub struct SuggestionSearcher {
    archive: Archive,
    index: Option<Arc<InvertedIndex>>,
}

impl SuggestionSearcher {
    pub fn new(archive: &Archive) -> Result<Self> {
        let index = archive.inverted_index(TITLE_INDEX_PATH)?;
        Ok(Self {
            archive: archive.clone(),
            index: index.map(Arc::new),
        })
    }

    pub fn suggest(&self, query: &str) -> Result<SuggestionSearch> {
        let words = words(query);
        let hits = if words.is_empty() {
            Vec::new()
        } else {
            match &self.index {
                Some(index) => self.from_index(index, &words, query)?,
                None => self.from_title_scan(query)?,
            }
        };
        debug!(query, matches = hits.len(), indexed = self.index.is_some(), "Suggestion search");
        Ok(SuggestionSearch {
            archive: self.archive.clone(),
            words,
            hits,
        })
    }

    /// Entries having a title word starting with each query word
    fn from_index(&self, index: &InvertedIndex, words: &[String], query: &str) -> Result<Vec<Hit>> {
        let mut matched: Option<HashSet<u32>> = None;
        for word in words {
            let mut docs = HashSet::new();
            for term in index.prefix_range(word)? {
                for posting in index.postings_at(term)? {
                    if matched.as_ref().map_or(true, |m| m.contains(&posting.doc)) {
                        docs.insert(posting.doc);
                    }
                }
            }
            if docs.is_empty() {
                return Ok(Vec::new());
            }
            matched = Some(docs);
        }

        let folded_query = fold(query.trim());
        let mut ranked = Vec::new();
        for doc in matched.unwrap_or_default() {
            let (entry, _) = index.doc(doc)?;
            let title = fold(self.archive.entry_at(entry)?.title());
            ranked.push((!title.starts_with(&folded_query), title.chars().count(), entry));
        }
        ranked.sort_unstable();
        Ok(ranked
            .into_iter()
            .map(|(_, len, entry)| Hit {
                entry,
                score: 1.0 / (1.0 + len as f64),
                geo_position: None,
            })
            .collect())
    }

    /// Titles starting with the query, in title order
    fn from_title_scan(&self, query: &str) -> Result<Vec<Hit>> {
        let prefix = fold(query.trim());
        let mut hits = Vec::new();
        for pos in self.archive.user_title_range() {
            let entry = self.archive.entry_at(self.archive.title_entry(pos)?)?;
            if self.archive.is_user_entry(entry.index()) && fold(entry.title()).starts_with(&prefix) {
                hits.push(Hit {
                    entry: entry.index(),
                    score: 1.0,
                    geo_position: None,
                });
            }
        }
        Ok(hits)
    }
}

/// Ranked suggestions for one query
pub struct SuggestionSearch {
    archive: Archive,
    words: Vec<String>,
    hits: Vec<Hit>,
}

impl SuggestionSearch {
    pub fn estimated_matches(&self) -> u64 {
        self.hits.len() as u64
    }

    /// Up to `count` suggestions starting at rank `start`
    ///
    /// Snippets are the titles with matching words highlighted.
    pub fn results(&self, start: usize, count: usize) -> Result<Vec<SearchResult>> {
        to_results(&self.archive, page(&self.hits, start, count), |entry| {
            Ok(highlight(entry.title(), |word| {
                let word = fold(word);
                self.words.iter().any(|w| word.starts_with(w.as_str()))
            }))
        })
    }

    pub fn paths(&self, start: usize, count: usize) -> Result<Vec<String>> {
        page(&self.hits, start, count)
            .iter()
            .map(|hit| self.archive.entry_at(hit.entry).map(|e| e.path()))
            .collect()
    }
}

impl std::fmt::Debug for SuggestionSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestionSearch")
            .field("words", &self.words)
            .field("matches", &self.hits.len())
            .finish()
    }
}
