//! Full-text search and title suggestions
//!
//! Both searchers rank every match up front, so [`Search::results`] and
//! [`SuggestionSearch::results`] page through a fixed, repeatable order.

mod searcher;
mod suggestion;

pub use searcher::{Query, Search, Searcher};
pub use suggestion::{SuggestionSearch, SuggestionSearcher};

use crate::error::Result;
use crate::item::GeoPosition;
use crate::reader::Archive;

/// Words kept around the first match in a snippet
const SNIPPET_WORDS: usize = 30;
/// Words shown before the first match
const SNIPPET_LEAD: usize = 5;

/// One ranked match
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub path: String,
    pub title: String,
    pub score: f64,
    /// Excerpt with matching words wrapped in `<b>`
    pub snippet: String,
    /// Position supplied by the item's index data
    pub geo_position: Option<GeoPosition>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Hit {
    pub entry: u32,
    pub score: f64,
    pub geo_position: Option<GeoPosition>,
}

/// Slice `hits[start..start + count]`, clamped to the available range
pub(crate) fn page(hits: &[Hit], start: usize, count: usize) -> &[Hit] {
    let start = start.min(hits.len());
    let end = start.saturating_add(count).min(hits.len());
    &hits[start..end]
}

/// Build a short excerpt of `text` around the first word accepted by `is_match`
pub(crate) fn highlight<F>(text: &str, is_match: F) -> String
where
    F: Fn(&str) -> bool,
{
    let words: Vec<&str> = text.split_whitespace().collect();
    let marked: Vec<bool> = words.iter().map(|w| is_match(w)).collect();
    let first = marked.iter().position(|m| *m).unwrap_or(0);
    let start = first.saturating_sub(SNIPPET_LEAD);
    let end = (start + SNIPPET_WORDS).min(words.len());

    let body = (start..end)
        .map(|i| {
            if marked[i] {
                format!("<b>{}</b>", words[i])
            } else {
                words[i].to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    let lead = if start > 0 { "..." } else { "" };
    let tail = if end < words.len() { "..." } else { "" };
    format!("{}{}{}", lead, body, tail)
}

/// Turn ranked hits into results with `snippet` computed per entry
pub(crate) fn to_results<F>(
    archive: &Archive,
    hits: &[Hit],
    mut snippet: F,
) -> Result<Vec<SearchResult>>
where
    F: FnMut(&crate::reader::Entry) -> Result<String>,
{
    hits.iter()
        .map(|hit| {
            let entry = archive.entry_at(hit.entry)?;
            Ok(SearchResult {
                path: entry.path(),
                title: entry.title().to_string(),
                score: hit.score,
                snippet: snippet(&entry)?,
                geo_position: hit.geo_position,
            })
        })
        .collect()
}
