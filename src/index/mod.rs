//! Full-text and title indexes
//!
//! Both indexes share the [`InvertedIndex`] format. The full-text index holds
//! stemmed terms of front-article content; the title index holds folded
//! title words and backs suggestions.

pub mod analyzer;
pub mod html;
pub mod inverted;

pub use analyzer::{fold, words, Analyzer};
pub use html::{extract_text, is_html, HtmlText};
pub use inverted::{DocumentInfo, IndexBuilder, InvertedIndex, Posting};
