use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// Result type for zim operations
pub type Result<T> = std::result::Result<T, ZimError>;

/// Error returned by user-supplied callbacks (items, content providers, index data)
pub type CallbackError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type for user-supplied callbacks
pub type CallbackResult<T> = std::result::Result<T, CallbackError>;

/// Coarse classification of every [`ZimError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    OutOfRange,
    DuplicateKey,
    InvalidState,
    ContractViolation,
    CorruptArchive,
    IoFailure,
}

/// Unified error type for all zim operations
#[derive(Debug, Error)]
pub enum ZimError {
    // Lookup errors
    #[error("Cannot find entry: {0}")]
    NotFound(String),

    #[error("Entry index {index} out of range (entry count {count})")]
    OutOfRange { index: u32, count: u32 },

    #[error("No main entry in archive")]
    NoMainEntry,

    #[error("Entry {0} is not a redirect")]
    NotARedirect(String),

    // Writer errors
    #[error("Impossible to add {0}: entry already exists")]
    DuplicateEntry(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Content size mismatch for {path}: declared {declared} bytes, provider fed {actual}")]
    SizeMismatch {
        path: String,
        declared: u64,
        actual: u64,
    },

    #[error("Error calling {accessor} on item {path}: {source}")]
    Callback {
        accessor: &'static str,
        path: String,
        #[source]
        source: CallbackError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Archive format errors
    #[error("Invalid magic number in archive header")]
    InvalidMagic,

    #[error("Unsupported archive version: {0}")]
    UnsupportedVersion(u16),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Invalid compression method: {0}")]
    InvalidCompression(u8),

    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("TOML error: {0}")]
    TomlError(String),
}

impl ZimError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ZimError::NotFound(_) | ZimError::NoMainEntry => ErrorKind::NotFound,
            ZimError::OutOfRange { .. } => ErrorKind::OutOfRange,
            ZimError::DuplicateEntry(_) => ErrorKind::DuplicateKey,
            ZimError::InvalidState(_) => ErrorKind::InvalidState,
            ZimError::NotARedirect(_)
            | ZimError::ContractViolation(_)
            | ZimError::SizeMismatch { .. }
            | ZimError::Callback { .. }
            | ZimError::InvalidConfig(_)
            | ZimError::TomlError(_) => ErrorKind::ContractViolation,
            ZimError::InvalidMagic
            | ZimError::UnsupportedVersion(_)
            | ZimError::CorruptArchive(_)
            | ZimError::ChecksumMismatch { .. }
            | ZimError::InvalidCompression(_)
            | ZimError::DecompressionFailed(_) => ErrorKind::CorruptArchive,
            ZimError::CompressionFailed(_) | ZimError::Io(_) => ErrorKind::IoFailure,
        }
    }

    /// Wrap a callback failure with the accessor and item path that raised it
    pub(crate) fn callback(accessor: &'static str, path: &str, source: CallbackError) -> Self {
        ZimError::Callback {
            accessor,
            path: path.to_string(),
            source,
        }
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        ZimError::CorruptArchive(msg.into())
    }
}

impl From<toml::de::Error> for ZimError {
    fn from(err: toml::de::Error) -> Self {
        ZimError::TomlError(err.to_string())
    }
}

impl From<toml::ser::Error> for ZimError {
    fn from(err: toml::ser::Error) -> Self {
        ZimError::TomlError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ZimError::NotFound("a".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            ZimError::OutOfRange { index: 5, count: 2 }.kind(),
            ErrorKind::OutOfRange
        );
        assert_eq!(
            ZimError::DuplicateEntry("a".into()).kind(),
            ErrorKind::DuplicateKey
        );
        assert_eq!(
            ZimError::NotARedirect("a".into()).kind(),
            ErrorKind::ContractViolation
        );
        assert_eq!(ZimError::InvalidMagic.kind(), ErrorKind::CorruptArchive);
        let io = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(ZimError::from(io).kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn test_callback_message_names_accessor() {
        let err = ZimError::callback("content_provider", "home", "boom".into());
        let msg = err.to_string();
        assert!(msg.contains("content_provider"));
        assert!(msg.contains("home"));
        assert!(msg.contains("boom"));
    }
}
