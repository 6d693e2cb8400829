//! Inverted index stored as an archive item
//!
//! Layout (little-endian):
//! ```text
//! magic "ZIDX" | version u16 | flags u16 | language len u8 + bytes
//! doc_count u32 | term_count u32 | total_tokens u64
//! docs:   [entry u32, length u32] * doc_count        (sorted by entry)
//! geo:    [latitude f64, longitude f64] * doc_count  (only with FLAG_GEO; NaN when unset)
//! terms:  [str_off u32, str_len u16, post_off u32, post_count u32] * term_count
//! pool_len u32 | pool bytes                           (terms sorted bytewise)
//! postings: [doc u32, tf u32] * total postings        (sorted by doc)
//! ```

use crate::error::{Result, ZimError};
use crate::index::analyzer::Analyzer;
use crate::item::GeoPosition;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;

pub const INDEX_MAGIC: &[u8; 4] = b"ZIDX";
pub const INDEX_VERSION: u16 = 1;

/// Set when terms were stemmed at build time
pub const FLAG_STEMMED: u16 = 0x1;
/// Set when the geo section follows the doc table
pub const FLAG_GEO: u16 = 0x2;

const DOC_RECORD_SIZE: usize = 8;
const GEO_RECORD_SIZE: usize = 16;
const TERM_RECORD_SIZE: usize = 14;
const POSTING_SIZE: usize = 8;

/// Extra facts about an indexed document
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DocumentInfo {
    /// Document length for ranking; `None` or 0 uses the number of terms
    pub word_count: Option<u32>,
    pub geo_position: Option<GeoPosition>,
}

#[derive(Debug, Clone, Copy)]
struct DocRecord {
    entry: u32,
    length: u32,
    geo_position: Option<GeoPosition>,
}

/// Accumulates documents in memory and serializes the index
pub struct IndexBuilder {
    analyzer: Analyzer,
    language: String,
    docs: Vec<DocRecord>,
    /// term -> [(doc position, term frequency)]
    postings: HashMap<String, Vec<(u32, u32)>>,
}

impl IndexBuilder {
    pub fn new(analyzer: Analyzer, language: &str) -> Self {
        Self {
            analyzer,
            language: language.to_string(),
            docs: Vec::new(),
            postings: HashMap::new(),
        }
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    /// Index `text` for `entry`; documents without any term are skipped
    pub fn add_document(&mut self, entry: u32, text: &str) {
        self.add_document_with(entry, text, DocumentInfo::default());
    }

    pub fn add_document_with(&mut self, entry: u32, text: &str, info: DocumentInfo) {
        let terms = self.analyzer.terms(text);
        if terms.is_empty() {
            return;
        }
        let doc = self.docs.len() as u32;
        let length = info
            .word_count
            .filter(|count| *count > 0)
            .unwrap_or(terms.len() as u32);
        self.docs.push(DocRecord {
            entry,
            length,
            geo_position: info.geo_position,
        });

        let mut counts: HashMap<String, u32> = HashMap::new();
        for term in terms {
            *counts.entry(term).or_insert(0) += 1;
        }
        for (term, tf) in counts {
            self.postings.entry(term).or_default().push((doc, tf));
        }
    }

    /// Serialize, mapping the provisional entry ids through `map_entry`
    ///
    /// Documents whose entry maps to `None` are dropped.
    pub fn finish<F>(self, map_entry: F) -> Result<Vec<u8>>
    where
        F: Fn(u32) -> Option<u32>,
    {
        // Final doc order follows final entry order
        let mut mapped: Vec<(u32, u32, u32)> = self
            .docs
            .iter()
            .enumerate()
            .filter_map(|(old, doc)| map_entry(doc.entry).map(|e| (e, doc.length, old as u32)))
            .collect();
        mapped.sort_unstable();
        let mut renumber = vec![None; self.docs.len()];
        for (new, (_, _, old)) in mapped.iter().enumerate() {
            renumber[*old as usize] = Some(new as u32);
        }

        let mut terms: BTreeMap<String, Vec<(u32, u32)>> = BTreeMap::new();
        for (term, list) in self.postings {
            let mut list: Vec<(u32, u32)> = list
                .into_iter()
                .filter_map(|(doc, tf)| renumber[doc as usize].map(|d| (d, tf)))
                .collect();
            if list.is_empty() {
                continue;
            }
            list.sort_unstable();
            terms.insert(term, list);
        }

        let total_tokens: u64 = mapped.iter().map(|(_, len, _)| *len as u64).sum();
        let has_geo = mapped
            .iter()
            .any(|(_, _, old)| self.docs[*old as usize].geo_position.is_some());
        let mut flags = if self.analyzer.is_stemming() { FLAG_STEMMED } else { 0 };
        if has_geo {
            flags |= FLAG_GEO;
        }
        let language = self.language.as_bytes();
        if language.len() > u8::MAX as usize {
            return Err(ZimError::InvalidConfig("index language too long".into()));
        }

        let mut out = Vec::new();
        out.write_all(INDEX_MAGIC)?;
        out.write_all(&INDEX_VERSION.to_le_bytes())?;
        out.write_all(&flags.to_le_bytes())?;
        out.write_all(&[language.len() as u8])?;
        out.write_all(language)?;
        out.write_all(&(mapped.len() as u32).to_le_bytes())?;
        out.write_all(&(terms.len() as u32).to_le_bytes())?;
        out.write_all(&total_tokens.to_le_bytes())?;

        for (entry, len, _) in &mapped {
            out.write_all(&entry.to_le_bytes())?;
            out.write_all(&len.to_le_bytes())?;
        }
        if has_geo {
            for (_, _, old) in &mapped {
                let (lat, lon) = match self.docs[*old as usize].geo_position {
                    Some(geo) => (geo.latitude, geo.longitude),
                    None => (f64::NAN, f64::NAN),
                };
                out.write_all(&lat.to_le_bytes())?;
                out.write_all(&lon.to_le_bytes())?;
            }
        }

        let mut pool = Vec::new();
        let mut post_off: u32 = 0;
        for (term, list) in &terms {
            if term.len() > u16::MAX as usize {
                return Err(ZimError::ContractViolation("index term too long".into()));
            }
            out.write_all(&(pool.len() as u32).to_le_bytes())?;
            out.write_all(&(term.len() as u16).to_le_bytes())?;
            out.write_all(&post_off.to_le_bytes())?;
            out.write_all(&(list.len() as u32).to_le_bytes())?;
            pool.extend_from_slice(term.as_bytes());
            post_off += list.len() as u32;
        }

        out.write_all(&(pool.len() as u32).to_le_bytes())?;
        out.write_all(&pool)?;

        for list in terms.values() {
            for (doc, tf) in list {
                out.write_all(&doc.to_le_bytes())?;
                out.write_all(&tf.to_le_bytes())?;
            }
        }

        Ok(out)
    }
}

/// One occurrence list entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc: u32,
    pub tf: u32,
}

/// Read-only view over a serialized index
#[derive(Debug, Clone)]
pub struct InvertedIndex {
    data: Bytes,
    language: String,
    stemmed: bool,
    doc_count: u32,
    term_count: u32,
    total_tokens: u64,
    docs_pos: usize,
    geo_pos: Option<usize>,
    terms_pos: usize,
    pool_pos: usize,
    postings_pos: usize,
}

impl InvertedIndex {
    pub fn parse(data: Bytes) -> Result<Self> {
        let corrupt = |what: &str| ZimError::corrupt(format!("search index: {}", what));
        if data.len() < 9 || &data[0..4] != INDEX_MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != INDEX_VERSION {
            return Err(corrupt("unsupported version"));
        }
        let flags = u16::from_le_bytes([data[6], data[7]]);
        let lang_len = data[8] as usize;
        let language = data
            .get(9..9 + lang_len)
            .and_then(|b| std::str::from_utf8(b).ok())
            .ok_or_else(|| corrupt("bad language"))?
            .to_string();

        let mut pos = 9 + lang_len;
        let doc_count = read_u32(&data, pos)?;
        let term_count = read_u32(&data, pos + 4)?;
        let total_tokens = read_u64(&data, pos + 8)?;
        pos += 16;

        let docs_pos = pos;
        let docs_end = span(docs_pos, doc_count as usize, DOC_RECORD_SIZE)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| corrupt("doc table truncated"))?;
        let (geo_pos, terms_pos) = if flags & FLAG_GEO != 0 {
            let end = span(docs_end, doc_count as usize, GEO_RECORD_SIZE)
                .filter(|end| *end <= data.len())
                .ok_or_else(|| corrupt("geo table truncated"))?;
            (Some(docs_end), end)
        } else {
            (None, docs_end)
        };
        let pool_len_pos = span(terms_pos, term_count as usize, TERM_RECORD_SIZE)
            .ok_or_else(|| corrupt("term table truncated"))?;
        let pool_len = read_u32(&data, pool_len_pos)? as usize;
        let pool_pos = pool_len_pos + 4;
        let postings_pos = pool_pos
            .checked_add(pool_len)
            .filter(|pos| *pos <= data.len())
            .ok_or_else(|| corrupt("truncated"))?;

        let index = Self {
            data,
            language,
            stemmed: flags & FLAG_STEMMED != 0,
            doc_count,
            term_count,
            total_tokens,
            docs_pos,
            geo_pos,
            terms_pos,
            pool_pos,
            postings_pos,
        };
        // Every term record is checked again on access; this catches truncation early
        if term_count > 0 {
            index.term_record(term_count - 1)?;
        }
        Ok(index)
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_stemmed(&self) -> bool {
        self.stemmed
    }

    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    pub fn term_count(&self) -> u32 {
        self.term_count
    }

    pub fn average_doc_length(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.total_tokens as f64 / self.doc_count as f64
        }
    }

    /// Entry index and token count of document `doc`
    pub fn doc(&self, doc: u32) -> Result<(u32, u32)> {
        if doc >= self.doc_count {
            return Err(ZimError::corrupt(format!("search index doc {} out of range", doc)));
        }
        let pos = self.docs_pos + doc as usize * DOC_RECORD_SIZE;
        Ok((read_u32(&self.data, pos)?, read_u32(&self.data, pos + 4)?))
    }

    /// Position stored for document `doc`, if the index carries one
    pub fn geo_position(&self, doc: u32) -> Result<Option<GeoPosition>> {
        let Some(geo_pos) = self.geo_pos else {
            return Ok(None);
        };
        if doc >= self.doc_count {
            return Err(ZimError::corrupt(format!("search index doc {} out of range", doc)));
        }
        let pos = geo_pos + doc as usize * GEO_RECORD_SIZE;
        let latitude = f64::from_bits(read_u64(&self.data, pos)?);
        let longitude = f64::from_bits(read_u64(&self.data, pos + 8)?);
        if latitude.is_nan() || longitude.is_nan() {
            return Ok(None);
        }
        Ok(Some(GeoPosition { latitude, longitude }))
    }

    /// Term string of term record `i`
    pub fn term(&self, i: u32) -> Result<&str> {
        let (range, _, _) = self.term_record(i)?;
        std::str::from_utf8(&self.data[range])
            .map_err(|_| ZimError::corrupt("search index term is not UTF-8"))
    }

    /// Postings of an exact term
    pub fn postings(&self, term: &str) -> Result<Vec<Posting>> {
        match self.find(term)? {
            Ok(i) => self.postings_at(i),
            Err(_) => Ok(Vec::new()),
        }
    }

    /// Term record indexes of every term starting with `prefix`
    pub fn prefix_range(&self, prefix: &str) -> Result<std::ops::Range<u32>> {
        let start = match self.find(prefix)? {
            Ok(i) | Err(i) => i,
        };
        let mut end = start;
        while end < self.term_count && self.term(end)?.starts_with(prefix) {
            end += 1;
        }
        Ok(start..end)
    }

    /// Postings of term record `i`
    pub fn postings_at(&self, i: u32) -> Result<Vec<Posting>> {
        let (_, off, count) = self.term_record(i)?;
        let mut list = Vec::with_capacity(count as usize);
        for k in 0..count as usize {
            let pos = self.postings_pos + (off as usize + k) * POSTING_SIZE;
            list.push(Posting {
                doc: read_u32(&self.data, pos)?,
                tf: read_u32(&self.data, pos + 4)?,
            });
        }
        Ok(list)
    }

    /// Binary search over the sorted term table
    fn find(&self, term: &str) -> Result<std::result::Result<u32, u32>> {
        let (mut lo, mut hi) = (0u32, self.term_count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.term(mid)?.as_bytes().cmp(term.as_bytes()) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Ok(mid)),
            }
        }
        Ok(Err(lo))
    }

    fn term_record(&self, i: u32) -> Result<(std::ops::Range<usize>, u32, u32)> {
        if i >= self.term_count {
            return Err(ZimError::corrupt(format!("search index term {} out of range", i)));
        }
        let pos = self.terms_pos + i as usize * TERM_RECORD_SIZE;
        let str_off = read_u32(&self.data, pos)? as usize;
        let str_len = self
            .data
            .get(pos + 4..pos + 6)
            .map(|b| u16::from_le_bytes([b[0], b[1]]) as usize)
            .ok_or_else(|| ZimError::corrupt("search index term table truncated"))?;
        let post_off = read_u32(&self.data, pos + 6)?;
        let post_count = read_u32(&self.data, pos + 10)?;
        let start = self.pool_pos.saturating_add(str_off);
        let end = start
            .checked_add(str_len)
            .filter(|end| *end <= self.postings_pos)
            .ok_or_else(|| ZimError::corrupt("search index term outside string pool"))?;
        (post_off as usize)
            .checked_add(post_count as usize)
            .and_then(|postings| span(self.postings_pos, postings, POSTING_SIZE))
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| ZimError::corrupt("search index postings out of bounds"))?;
        Ok((start..end, post_off, post_count))
    }
}

/// `base + count * size`, or `None` on overflow
fn span(base: usize, count: usize, size: usize) -> Option<usize> {
    count.checked_mul(size)?.checked_add(base)
}

fn read_u32(data: &[u8], pos: usize) -> Result<u32> {
    crate::archive::u32_at(data, pos)
}

fn read_u64(data: &[u8], pos: usize) -> Result<u64> {
    crate::archive::u64_at(data, pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn build() -> InvertedIndex {
        let mut builder = IndexBuilder::new(Analyzer::for_language("eng"), "eng");
        builder.add_document(30, "The quick brown fox jumps");
        builder.add_document(10, "Foxes are quick, very quick");
        builder.add_document(20, "");
        builder.add_document(40, "Lazy dogs sleep");
        let data = builder
            .finish(|entry| if entry == 40 { None } else { Some(entry / 10) })
            .unwrap();
        InvertedIndex::parse(Bytes::from(data)).unwrap()
    }

    #[test]
    fn test_docs_follow_entry_order() {
        let index = build();
        assert_eq!(index.doc_count(), 2);
        assert_eq!(index.doc(0).unwrap(), (1, 5));
        assert_eq!(index.doc(1).unwrap(), (3, 5));
        assert!(index.is_stemmed());
        assert_eq!(index.language(), "eng");
    }

    #[test]
    fn test_exact_and_prefix_lookup() {
        let index = build();
        let quick = index.postings("quick").unwrap();
        assert_eq!(quick, vec![Posting { doc: 0, tf: 2 }, Posting { doc: 1, tf: 1 }]);
        // "foxes" and "fox" stem to the same term
        assert_eq!(index.postings("fox").unwrap().len(), 2);
        assert!(index.postings("dog").unwrap().is_empty());

        let range = index.prefix_range("qu").unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(index.term(range.start).unwrap(), "quick");
        assert!(index.prefix_range("zzz").unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_index_rejected() {
        assert!(InvertedIndex::parse(Bytes::from_static(b"nope")).is_err());
        let mut builder = IndexBuilder::new(Analyzer::plain(), "");
        builder.add_document(0, "alpha beta");
        let mut data = builder.finish(Some).unwrap();
        data.truncate(data.len() - 3);
        assert!(InvertedIndex::parse(Bytes::from(data)).is_err());
    }

    /// Offset of term record `i` in an index built with an empty language
    fn term_record_pos(doc_count: usize, i: usize) -> usize {
        9 + 16 + doc_count * DOC_RECORD_SIZE + i * TERM_RECORD_SIZE
    }

    #[test]
    fn test_oversized_posting_count_is_corrupt() {
        let mut builder = IndexBuilder::new(Analyzer::plain(), "");
        builder.add_document(0, "alpha beta");
        let mut data = builder.finish(Some).unwrap();

        // First term ("alpha") claims far more postings than the index holds
        let pos = term_record_pos(1, 0) + 10;
        data[pos..pos + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        let index = InvertedIndex::parse(Bytes::from(data)).unwrap();

        let err = index.postings("alpha").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptArchive);
        assert!(index.postings_at(0).is_err());
        assert!(index.prefix_range("al").is_err());
    }

    #[test]
    fn test_oversized_posting_offset_is_corrupt() {
        let mut builder = IndexBuilder::new(Analyzer::plain(), "");
        builder.add_document(0, "alpha beta");
        let mut data = builder.finish(Some).unwrap();

        // The last term is checked while parsing
        let pos = term_record_pos(1, 1) + 6;
        data[pos..pos + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = InvertedIndex::parse(Bytes::from(data)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptArchive);
    }

    #[test]
    fn test_huge_doc_count_is_corrupt() {
        let mut builder = IndexBuilder::new(Analyzer::plain(), "");
        builder.add_document(0, "alpha");
        let mut data = builder.finish(Some).unwrap();
        data[9..13].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = InvertedIndex::parse(Bytes::from(data)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptArchive);
    }

    #[test]
    fn test_word_count_and_geo_position() {
        let mut builder = IndexBuilder::new(Analyzer::plain(), "");
        let paris = GeoPosition {
            latitude: 48.8566,
            longitude: 2.3522,
        };
        builder.add_document_with(
            7,
            "paris city",
            DocumentInfo {
                word_count: Some(40),
                geo_position: Some(paris),
            },
        );
        builder.add_document(3, "city of light");
        let zero_count = DocumentInfo {
            word_count: Some(0),
            geo_position: None,
        };
        builder.add_document_with(9, "village", zero_count);
        let index = InvertedIndex::parse(Bytes::from(builder.finish(Some).unwrap())).unwrap();

        // Docs are ordered by entry: 3, 7, 9
        assert_eq!(index.doc(0).unwrap(), (3, 3));
        assert_eq!(index.doc(1).unwrap(), (7, 40));
        // A zero word count falls back to the term count
        assert_eq!(index.doc(2).unwrap(), (9, 1));
        assert_eq!(index.geo_position(0).unwrap(), None);
        assert_eq!(index.geo_position(1).unwrap(), Some(paris));
        assert!(index.geo_position(3).is_err());
        assert_eq!(index.postings("city").unwrap().len(), 2);

        // No positions, no geo table
        assert_eq!(build().geo_position(0).unwrap(), None);
    }
}
