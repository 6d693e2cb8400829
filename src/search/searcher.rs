use crate::error::Result;
use crate::index::{extract_text, is_html, Analyzer, InvertedIndex};
use crate::path::FULLTEXT_INDEX_PATH;
use crate::reader::{Archive, Entry};
use crate::search::{highlight, page, to_results, Hit, SearchResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// BM25 term-frequency saturation
const BM25_K1: f64 = 1.2;
/// BM25 length normalization
const BM25_B: f64 = 0.75;

/// Text of a full-text query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    query: String,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_query(mut self, query: &str) -> Self {
        self.query = query.to_string();
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

/// Runs queries against an archive's full-text index
///
/// The index is parsed once here. Archives without one accept queries
/// and return no matches.
#[derive(Clone)]
pub struct Searcher {
    archive: Archive,
    index: Option<Arc<InvertedIndex>>,
    analyzer: Arc<Analyzer>,
}

impl Searcher {
    pub fn new(archive: &Archive) -> Result<Self> {
        let index = archive.inverted_index(FULLTEXT_INDEX_PATH)?;
        let analyzer = match &index {
            Some(index) if index.is_stemmed() => Analyzer::for_language(index.language()),
            _ => Analyzer::plain(),
        };
        if let Some(index) = &index {
            debug!(
                documents = index.doc_count(),
                terms = index.term_count(),
                language = index.language(),
                "Loaded full-text index"
            );
        }
        Ok(Self {
            archive: archive.clone(),
            index: index.map(Arc::new),
            analyzer: Arc::new(analyzer),
        })
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Rank every entry containing all terms of `query`
    pub fn search(&self, query: &Query) -> Result<Search> {
        let mut terms = self.analyzer.terms(query.query());
        terms.sort();
        terms.dedup();

        let hits = match &self.index {
            Some(index) if !terms.is_empty() => rank(index, &terms)?,
            _ => Vec::new(),
        };
        debug!(query = query.query(), matches = hits.len(), "Full-text search");
        Ok(Search {
            archive: self.archive.clone(),
            analyzer: Arc::clone(&self.analyzer),
            terms: terms.into_iter().collect(),
            hits,
        })
    }
}

/// BM25 over the documents matching every term, best first, ties by entry
fn rank(index: &InvertedIndex, terms: &[String]) -> Result<Vec<Hit>> {
    let docs = index.doc_count() as f64;
    let avg_len = index.average_doc_length().max(1.0);

    let mut scores: Option<HashMap<u32, f64>> = None;
    for term in terms {
        let postings = index.postings(term)?;
        if postings.is_empty() {
            return Ok(Vec::new());
        }
        let df = postings.len() as f64;
        let idf = (1.0 + (docs - df + 0.5) / (df + 0.5)).ln();

        let mut next = HashMap::with_capacity(postings.len());
        for posting in postings {
            let previous = match &scores {
                Some(scores) => match scores.get(&posting.doc) {
                    Some(score) => *score,
                    None => continue,
                },
                None => 0.0,
            };
            let (_, len) = index.doc(posting.doc)?;
            let tf = posting.tf as f64;
            let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * len as f64 / avg_len);
            next.insert(posting.doc, previous + idf * tf * (BM25_K1 + 1.0) / (tf + norm));
        }
        scores = Some(next);
    }

    let mut hits = Vec::new();
    for (doc, score) in scores.unwrap_or_default() {
        let (entry, _) = index.doc(doc)?;
        hits.push(Hit {
            entry,
            score,
            geo_position: index.geo_position(doc)?,
        });
    }
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.entry.cmp(&b.entry)));
    Ok(hits)
}

/// Ranked matches of one query
pub struct Search {
    archive: Archive,
    analyzer: Arc<Analyzer>,
    terms: HashSet<String>,
    hits: Vec<Hit>,
}

impl Search {
    pub fn estimated_matches(&self) -> u64 {
        self.hits.len() as u64
    }

    /// Up to `count` results starting at rank `start`
    pub fn results(&self, start: usize, count: usize) -> Result<Vec<SearchResult>> {
        to_results(&self.archive, page(&self.hits, start, count), |entry| {
            self.snippet(entry)
        })
    }

    /// Paths of up to `count` results starting at rank `start`
    pub fn paths(&self, start: usize, count: usize) -> Result<Vec<String>> {
        page(&self.hits, start, count)
            .iter()
            .map(|hit| self.archive.entry_at(hit.entry).map(|e| e.path()))
            .collect()
    }

    fn snippet(&self, entry: &Entry) -> Result<String> {
        let item = entry.get_item(true)?;
        let content = item.content()?;
        let raw = String::from_utf8_lossy(&content);
        let text = if is_html(item.mimetype()) {
            extract_text(&raw).body
        } else {
            raw.into_owned()
        };
        Ok(highlight(&text, |word| {
            self.analyzer
                .terms(word)
                .iter()
                .any(|term| self.terms.contains(term))
        }))
    }
}

impl std::fmt::Debug for Search {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Search")
            .field("terms", &self.terms)
            .field("matches", &self.hits.len())
            .finish()
    }
}
