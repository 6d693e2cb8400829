//! Namespaces and the mapping between user-visible paths and stored paths
//!
//! Archives written by this crate use the flat scheme: user content lives in
//! namespace `C` and its paths carry no prefix. Older archives expose every
//! namespace to users as `"{ns}/{path}"`; those are read-only here.

use crate::error::{Result, ZimError};
use std::fmt;

/// Single-byte namespace tag stored in every dirent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Namespace(u8);

impl Namespace {
    /// User content
    pub const CONTENT: Namespace = Namespace(b'C');
    /// Metadata, including illustrations
    pub const METADATA: Namespace = Namespace(b'M');
    /// Well-known entries such as the main page
    pub const WELL_KNOWN: Namespace = Namespace(b'W');
    /// Listings and search indexes
    pub const INDEX: Namespace = Namespace(b'X');

    /// Legacy article namespace
    pub const LEGACY_ARTICLE: Namespace = Namespace(b'A');
    /// Legacy image namespace
    pub const LEGACY_IMAGE: Namespace = Namespace(b'I');
    /// Legacy layout namespace holding the favicon
    pub const LEGACY_LAYOUT: Namespace = Namespace(b'-');

    pub const fn from_byte(b: u8) -> Self {
        Namespace(b)
    }

    pub const fn as_byte(self) -> u8 {
        self.0
    }

    pub fn as_char(self) -> char {
        self.0 as char
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Path of the well-known redirect to the main entry
pub const MAIN_PAGE_PATH: &str = "mainPage";

/// Legacy favicon location, in the layout namespace
pub const LEGACY_FAVICON_PATH: &str = "favicon";

/// Listing of all user entries in title order
pub const LISTING_ALL_PATH: &str = "listing/titleOrdered/v0";

/// Listing of front articles in title order
pub const LISTING_FRONT_PATH: &str = "listing/titleOrdered/v1";

/// Full-text inverted index
pub const FULLTEXT_INDEX_PATH: &str = "fulltext/inverted";

/// Title word index used for suggestions
pub const TITLE_INDEX_PATH: &str = "title/inverted";

/// Resolve a user-visible path to the stored (namespace, path) pair
///
/// Returns `None` when a legacy path carries no namespace prefix.
pub fn parse_user_path(path: &str, new_scheme: bool) -> Option<(Namespace, &str)> {
    if new_scheme {
        return Some((Namespace::CONTENT, path));
    }
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let mut chars = trimmed.char_indices();
    let (_, ns) = chars.next()?;
    if !ns.is_ascii() {
        return None;
    }
    match chars.next() {
        Some((_, '/')) => Some((Namespace::from_byte(ns as u8), &trimmed[2..])),
        None => Some((Namespace::from_byte(ns as u8), "")),
        _ => None,
    }
}

/// Build the user-visible path for a stored entry
///
/// New-scheme paths never carry the namespace, internal entries included
/// (`W/mainPage` reads as `mainPage`).
pub fn user_path(ns: Namespace, path: &str, new_scheme: bool) -> String {
    if new_scheme {
        path.to_string()
    } else {
        format!("{}/{}", ns, path)
    }
}

/// Check a path given to the writer
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ZimError::ContractViolation("path must not be empty".into()));
    }
    if path.contains('\0') {
        return Err(ZimError::ContractViolation(format!(
            "path {:?} contains a NUL byte",
            path
        )));
    }
    Ok(())
}

/// Media kinds counted by `media_count`
pub fn is_media_mimetype(mimetype: &str) -> bool {
    mimetype.starts_with("image/") || mimetype.starts_with("video/") || mimetype.starts_with("audio/")
}

/// Mimetypes that gain nothing from cluster compression
pub fn is_precompressed_mimetype(mimetype: &str) -> bool {
    let essence = mimetype.split(';').next().unwrap_or(mimetype).trim();
    if essence == "image/svg+xml" {
        return false;
    }
    is_media_mimetype(essence)
        || matches!(
            essence,
            "application/zip"
                | "application/gzip"
                | "application/x-xz"
                | "application/zstd"
                | "application/x-bzip2"
                | "application/pdf"
                | "font/woff"
                | "font/woff2"
                | "application/font-woff"
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_scheme_paths_are_flat() {
        assert_eq!(
            parse_user_path("A/page", true),
            Some((Namespace::CONTENT, "A/page"))
        );
        assert_eq!(user_path(Namespace::CONTENT, "home", true), "home");
        assert_eq!(user_path(Namespace::WELL_KNOWN, "mainPage", true), "mainPage");
    }

    #[test]
    fn test_legacy_paths_carry_namespace() {
        assert_eq!(
            parse_user_path("A/Main_Page", false),
            Some((Namespace::LEGACY_ARTICLE, "Main_Page"))
        );
        assert_eq!(
            parse_user_path("/-/favicon", false),
            Some((Namespace::LEGACY_LAYOUT, "favicon"))
        );
        assert_eq!(parse_user_path("Main_Page", false), None);
        assert_eq!(parse_user_path("", false), None);
        assert_eq!(user_path(Namespace::LEGACY_IMAGE, "logo.png", false), "I/logo.png");
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("ok").is_ok());
        assert!(validate_path("").is_err());
        assert!(validate_path("a\0b").is_err());
    }

    #[test]
    fn test_mimetype_classes() {
        assert!(is_media_mimetype("image/png"));
        assert!(!is_media_mimetype("text/html"));
        assert!(is_precompressed_mimetype("video/webm"));
        assert!(is_precompressed_mimetype("application/zip"));
        assert!(!is_precompressed_mimetype("image/svg+xml"));
        assert!(!is_precompressed_mimetype("text/html; charset=utf-8"));
    }
}
