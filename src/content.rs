//! Content providers feeding item payloads to the writer

use crate::error::{CallbackResult, Result, ZimError};
use bytes::{Bytes, BytesMut};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Chunk size used by [`FileProvider`]
pub const FILE_CHUNK_SIZE: usize = 1024 * 1024;

/// Source of an item's bytes
///
/// `size` is fixed before the first call to `feed`. `feed` yields chunks
/// until it returns `None` (an empty chunk also ends the stream) and keeps
/// returning `None` afterwards. The chunks must add up to `size` exactly.
pub trait ContentProvider: Send {
    fn size(&self) -> u64;

    fn feed(&mut self) -> CallbackResult<Option<Bytes>>;
}

/// Provider over an in-memory string or byte buffer
#[derive(Debug, Clone)]
pub struct StringProvider {
    content: Option<Bytes>,
    size: u64,
}

impl StringProvider {
    pub fn new(content: impl Into<String>) -> Self {
        Self::from_bytes(content.into().into_bytes())
    }

    pub fn from_bytes(content: impl Into<Bytes>) -> Self {
        let content = content.into();
        Self {
            size: content.len() as u64,
            content: Some(content),
        }
    }
}

impl ContentProvider for StringProvider {
    fn size(&self) -> u64 {
        self.size
    }

    fn feed(&mut self) -> CallbackResult<Option<Bytes>> {
        Ok(self.content.take())
    }
}

/// Provider streaming a file from disk in fixed-size chunks
#[derive(Debug)]
pub struct FileProvider {
    file: Option<File>,
    size: u64,
}

impl FileProvider {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: Some(file),
            size,
        })
    }
}

impl ContentProvider for FileProvider {
    fn size(&self) -> u64 {
        self.size
    }

    fn feed(&mut self) -> CallbackResult<Option<Bytes>> {
        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };
        let mut chunk = vec![0u8; FILE_CHUNK_SIZE];
        let read = file.read(&mut chunk)?;
        if read == 0 {
            self.file = None;
            return Ok(None);
        }
        chunk.truncate(read);
        Ok(Some(Bytes::from(chunk)))
    }
}

/// Drain a provider completely, enforcing its declared size
///
/// Feeding stops with an error as soon as the provider overshoots.
pub(crate) fn read_all(path: &str, provider: &mut dyn ContentProvider) -> Result<Bytes> {
    let declared = provider.size();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total: u64 = 0;

    loop {
        let chunk = match provider.feed() {
            Ok(Some(chunk)) if !chunk.is_empty() => chunk,
            Ok(_) => break,
            Err(e) => return Err(ZimError::callback("feed", path, e)),
        };
        total += chunk.len() as u64;
        if total > declared {
            return Err(ZimError::SizeMismatch {
                path: path.to_string(),
                declared,
                actual: total,
            });
        }
        chunks.push(chunk);
    }

    if total != declared {
        return Err(ZimError::SizeMismatch {
            path: path.to_string(),
            declared,
            actual: total,
        });
    }

    Ok(match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.remove(0),
        _ => {
            let mut buf = BytesMut::with_capacity(total as usize);
            for chunk in &chunks {
                buf.extend_from_slice(chunk);
            }
            buf.freeze()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct Chunked {
        chunks: Vec<&'static [u8]>,
        declared: u64,
    }

    impl ContentProvider for Chunked {
        fn size(&self) -> u64 {
            self.declared
        }

        fn feed(&mut self) -> CallbackResult<Option<Bytes>> {
            if self.chunks.is_empty() {
                return Ok(None);
            }
            Ok(Some(Bytes::from_static(self.chunks.remove(0))))
        }
    }

    #[test]
    fn test_string_provider_is_exhausted_after_one_chunk() {
        let mut provider = StringProvider::new("hello");
        assert_eq!(provider.size(), 5);
        assert_eq!(provider.feed().unwrap().unwrap(), Bytes::from_static(b"hello"));
        assert!(provider.feed().unwrap().is_none());
        assert!(provider.feed().unwrap().is_none());
    }

    #[test]
    fn test_read_all_concatenates_chunks() {
        let mut provider = Chunked {
            chunks: vec![b"ab", b"cd", b"e"],
            declared: 5,
        };
        assert_eq!(&read_all("p", &mut provider).unwrap()[..], b"abcde");
    }

    #[test]
    fn test_empty_chunk_ends_stream() {
        let mut provider = Chunked {
            chunks: vec![b"ab", b"", b"cd"],
            declared: 2,
        };
        assert_eq!(&read_all("p", &mut provider).unwrap()[..], b"ab");
    }

    #[test]
    fn test_size_mismatch_detected() {
        let mut short = Chunked {
            chunks: vec![b"ab"],
            declared: 3,
        };
        let err = read_all("short", &mut short).unwrap_err();
        assert!(matches!(err, ZimError::SizeMismatch { declared: 3, actual: 2, .. }));

        let mut long = Chunked {
            chunks: vec![b"abcd", b"never read"],
            declared: 3,
        };
        let err = read_all("long", &mut long).unwrap_err();
        assert!(matches!(err, ZimError::SizeMismatch { actual: 4, .. }));
        // stopped before pulling the second chunk
        assert_eq!(long.chunks.len(), 1);
    }

    #[test]
    fn test_file_provider() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let data = vec![7u8; FILE_CHUNK_SIZE + 10];
        tmp.write_all(&data).unwrap();
        tmp.flush().unwrap();

        let mut provider = FileProvider::open(tmp.path()).unwrap();
        assert_eq!(provider.size(), data.len() as u64);
        let content = read_all("file", &mut provider).unwrap();
        assert_eq!(content.len(), data.len());
        assert!(provider.feed().unwrap().is_none());
    }
}
