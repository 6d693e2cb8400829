use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase `text` and strip accents (NFKD without combining marks)
pub fn fold(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Folded words of `text`, split on anything that is not alphanumeric
pub fn words(text: &str) -> Vec<String> {
    fold(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Stemming algorithm for an ISO 639-1 or 639-3 language code
pub fn stemmer_for(language: &str) -> Option<Algorithm> {
    let code = language.trim().to_ascii_lowercase();
    let code = code.split(['-', '_']).next().unwrap_or("");
    let algorithm = match code {
        "en" | "eng" => Algorithm::English,
        "fr" | "fra" | "fre" => Algorithm::French,
        "de" | "deu" | "ger" => Algorithm::German,
        "es" | "spa" => Algorithm::Spanish,
        "it" | "ita" => Algorithm::Italian,
        "pt" | "por" => Algorithm::Portuguese,
        "nl" | "nld" | "dut" => Algorithm::Dutch,
        "sv" | "swe" => Algorithm::Swedish,
        "no" | "nor" | "nb" | "nob" | "nn" | "nno" => Algorithm::Norwegian,
        "da" | "dan" => Algorithm::Danish,
        "fi" | "fin" => Algorithm::Finnish,
        "hu" | "hun" => Algorithm::Hungarian,
        "ro" | "ron" | "rum" => Algorithm::Romanian,
        "ru" | "rus" => Algorithm::Russian,
        "tr" | "tur" => Algorithm::Turkish,
        "el" | "ell" | "gre" => Algorithm::Greek,
        "ar" | "ara" => Algorithm::Arabic,
        "ta" | "tam" => Algorithm::Tamil,
        _ => return None,
    };
    Some(algorithm)
}

/// Turns text into index terms
pub struct Analyzer {
    stemmer: Option<Stemmer>,
}

impl Analyzer {
    /// Analyzer stemming for `language`; unknown languages are not stemmed
    pub fn for_language(language: &str) -> Self {
        Self {
            stemmer: stemmer_for(language).map(Stemmer::create),
        }
    }

    /// Analyzer producing folded words only
    pub fn plain() -> Self {
        Self { stemmer: None }
    }

    pub fn is_stemming(&self) -> bool {
        self.stemmer.is_some()
    }

    /// Map one folded word to its term
    pub fn term(&self, word: &str) -> String {
        match &self.stemmer {
            Some(stemmer) => stemmer.stem(word).into_owned(),
            None => word.to_string(),
        }
    }

    pub fn terms(&self, text: &str) -> Vec<String> {
        words(text).iter().map(|w| self.term(w)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_strips_accents_and_case() {
        assert_eq!(fold("Éléphant Ça"), "elephant ca");
        assert_eq!(fold("ﬁn"), "fin");
    }

    #[test]
    fn test_words_split_on_punctuation() {
        assert_eq!(words("Hello, wörld! 42-times"), vec!["hello", "world", "42", "times"]);
        assert!(words("  ...  ").is_empty());
    }

    #[test]
    fn test_stemming_by_language() {
        let en = Analyzer::for_language("eng");
        assert!(en.is_stemming());
        assert_eq!(en.terms("running runs"), vec!["run", "run"]);

        let unknown = Analyzer::for_language("xyz");
        assert!(!unknown.is_stemming());
        assert_eq!(unknown.terms("running"), vec!["running"]);

        assert_eq!(stemmer_for("fr-CA").map(|_| ()), Some(()));
    }
}
