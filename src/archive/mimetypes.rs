use crate::error::{Result, ZimError};
use std::io::Write;

/// Ordered list of mimetypes referenced by dirent mime indexes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimeList {
    types: Vec<String>,
}

impl MimeList {
    pub fn new(types: Vec<String>) -> Self {
        Self { types }
    }

    pub fn get(&self, index: u16) -> Result<&str> {
        self.types
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| ZimError::corrupt(format!("mimetype index {} not in mime list", index)))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(String::as_str)
    }

    /// Write the list: NUL-terminated strings followed by an empty string
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize> {
        let mut written = 0;
        for mime in &self.types {
            if mime.is_empty() || mime.contains('\0') {
                return Err(ZimError::ContractViolation(format!(
                    "invalid mimetype {:?}",
                    mime
                )));
            }
            writer.write_all(mime.as_bytes())?;
            writer.write_all(&[0])?;
            written += mime.len() + 1;
        }
        writer.write_all(&[0])?;
        Ok(written + 1)
    }

    /// Parse the list starting at `pos`
    pub fn parse(data: &[u8], pos: usize) -> Result<Self> {
        let mut types = Vec::new();
        let mut cursor = pos;
        loop {
            let rest = data
                .get(cursor..)
                .ok_or_else(|| ZimError::corrupt("mime list truncated"))?;
            let len = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| ZimError::corrupt("mime list not terminated"))?;
            if len == 0 {
                break;
            }
            let mime = std::str::from_utf8(&rest[..len])
                .map_err(|e| ZimError::corrupt(format!("invalid mimetype: {}", e)))?;
            types.push(mime.to_string());
            cursor += len + 1;
        }
        Ok(Self { types })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_list_roundtrip() {
        let list = MimeList::new(vec!["text/html".into(), "image/png".into()]);
        let mut buf = Vec::new();
        let written = list.write_to(&mut buf).unwrap();
        assert_eq!(written, buf.len());
        assert_eq!(buf, b"text/html\0image/png\0\0");

        let parsed = MimeList::parse(&buf, 0).unwrap();
        assert_eq!(parsed, list);
        assert_eq!(parsed.get(1).unwrap(), "image/png");
        assert!(parsed.get(2).is_err());
    }

    #[test]
    fn test_empty_and_unterminated() {
        let parsed = MimeList::parse(b"\0", 0).unwrap();
        assert!(parsed.is_empty());
        assert!(MimeList::parse(b"text/html", 0).is_err());
    }
}
