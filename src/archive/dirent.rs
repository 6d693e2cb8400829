use crate::archive::format::{cstr_at, u32_at};
use crate::error::{Result, ZimError};
use std::io::Write;

/// Mimetype index marking a redirect dirent
pub const REDIRECT_MIME: u16 = 0xFFFF;
/// Mimetype index of obsolete link-target dirents
pub const LINKTARGET_MIME: u16 = 0xFFFE;
/// Mimetype index of obsolete deleted dirents
pub const DELETED_MIME: u16 = 0xFFFD;

/// Fixed part of a content dirent (before path)
const CONTENT_FIXED_SIZE: usize = 16;
/// Fixed part of a redirect dirent (before path)
const REDIRECT_FIXED_SIZE: usize = 12;
/// Fixed part of link-target and deleted dirents
const PLACEHOLDER_FIXED_SIZE: usize = 8;

/// What a dirent points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirentTarget {
    /// Blob `blob` of cluster `cluster`
    Content { cluster: u32, blob: u32 },
    /// Entry index of the redirect target
    Redirect(u32),
    /// Obsolete link-target or deleted dirent with no content
    Placeholder,
}

/// Directory entry as stored on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub mime_index: u16,
    pub namespace: u8,
    pub revision: u32,
    pub path: String,
    /// Raw title; empty means "same as path"
    pub title: String,
    pub parameter: Vec<u8>,
    pub target: DirentTarget,
}

impl Dirent {
    pub fn content(namespace: u8, path: &str, title: &str, mime_index: u16, cluster: u32, blob: u32) -> Self {
        Self {
            mime_index,
            namespace,
            revision: 0,
            path: path.to_string(),
            title: stored_title(path, title),
            parameter: Vec::new(),
            target: DirentTarget::Content { cluster, blob },
        }
    }

    pub fn redirect(namespace: u8, path: &str, title: &str, target_index: u32) -> Self {
        Self {
            mime_index: REDIRECT_MIME,
            namespace,
            revision: 0,
            path: path.to_string(),
            title: stored_title(path, title),
            parameter: Vec::new(),
            target: DirentTarget::Redirect(target_index),
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.target, DirentTarget::Redirect(_))
    }

    /// Title, falling back to the path when none was stored
    pub fn title(&self) -> &str {
        if self.title.is_empty() {
            &self.path
        } else {
            &self.title
        }
    }

    pub fn namespace_char(&self) -> char {
        self.namespace as char
    }

    /// Write dirent to a writer, returning the number of bytes written
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize> {
        if self.parameter.len() > u8::MAX as usize {
            return Err(ZimError::ContractViolation(format!(
                "dirent parameter too long for {}",
                self.path
            )));
        }
        if self.path.contains('\0') || self.title.contains('\0') {
            return Err(ZimError::ContractViolation(format!(
                "NUL byte in path or title of {}",
                self.path
            )));
        }

        let mut written = 0;
        writer.write_all(&self.mime_index.to_le_bytes())?;
        writer.write_all(&[self.parameter.len() as u8, self.namespace])?;
        writer.write_all(&self.revision.to_le_bytes())?;
        written += PLACEHOLDER_FIXED_SIZE;

        match self.target {
            DirentTarget::Content { cluster, blob } => {
                writer.write_all(&cluster.to_le_bytes())?;
                writer.write_all(&blob.to_le_bytes())?;
                written += 8;
            }
            DirentTarget::Redirect(index) => {
                writer.write_all(&index.to_le_bytes())?;
                written += 4;
            }
            DirentTarget::Placeholder => {}
        }

        writer.write_all(self.path.as_bytes())?;
        writer.write_all(&[0])?;
        writer.write_all(self.title.as_bytes())?;
        writer.write_all(&[0])?;
        writer.write_all(&self.parameter)?;
        written += self.path.len() + self.title.len() + 2 + self.parameter.len();

        Ok(written)
    }

    /// Parse the dirent starting at `pos` in `data`
    pub fn parse(data: &[u8], pos: usize) -> Result<Self> {
        let fixed = data
            .get(pos..pos + PLACEHOLDER_FIXED_SIZE)
            .ok_or_else(|| ZimError::corrupt(format!("dirent at {} truncated", pos)))?;
        let mime_index = u16::from_le_bytes([fixed[0], fixed[1]]);
        let parameter_len = fixed[2] as usize;
        let namespace = fixed[3];
        let revision = u32::from_le_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);

        let (target, strings_pos) = match mime_index {
            REDIRECT_MIME => (
                DirentTarget::Redirect(u32_at(data, pos + 8)?),
                pos + REDIRECT_FIXED_SIZE,
            ),
            LINKTARGET_MIME | DELETED_MIME => {
                (DirentTarget::Placeholder, pos + PLACEHOLDER_FIXED_SIZE)
            }
            _ => (
                DirentTarget::Content {
                    cluster: u32_at(data, pos + 8)?,
                    blob: u32_at(data, pos + 12)?,
                },
                pos + CONTENT_FIXED_SIZE,
            ),
        };

        let (path, after_path) = cstr_at(data, strings_pos)?;
        let (title, after_title) = cstr_at(data, after_path)?;
        let parameter = data
            .get(after_title..after_title + parameter_len)
            .ok_or_else(|| ZimError::corrupt(format!("dirent parameter of {} truncated", path)))?
            .to_vec();

        Ok(Self {
            mime_index,
            namespace,
            revision,
            path,
            title,
            parameter,
            target,
        })
    }
}

fn stored_title(path: &str, title: &str) -> String {
    if title == path {
        String::new()
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_dirent_layout() {
        let dirent = Dirent::content(b'C', "home", "Welcome", 2, 7, 3);
        let mut buf = Vec::new();
        let written = dirent.write_to(&mut buf).unwrap();
        assert_eq!(written, buf.len());
        assert_eq!(&buf[0..2], &2u16.to_le_bytes());
        assert_eq!(buf[3], b'C');
        assert_eq!(&buf[8..12], &7u32.to_le_bytes());
        assert_eq!(&buf[12..16], &3u32.to_le_bytes());
        assert_eq!(&buf[16..], b"home\0Welcome\0");

        let parsed = Dirent::parse(&buf, 0).unwrap();
        assert_eq!(parsed, dirent);
        assert_eq!(parsed.title(), "Welcome");
    }

    #[test]
    fn test_redirect_dirent_title_defaults_to_path() {
        let dirent = Dirent::redirect(b'W', "mainPage", "mainPage", 4);
        assert!(dirent.title.is_empty());

        let mut buf = vec![0xAA; 5];
        dirent.write_to(&mut buf).unwrap();
        let parsed = Dirent::parse(&buf, 5).unwrap();
        assert!(parsed.is_redirect());
        assert_eq!(parsed.target, DirentTarget::Redirect(4));
        assert_eq!(parsed.title(), "mainPage");
    }

    #[test]
    fn test_truncated_dirent_rejected() {
        let dirent = Dirent::content(b'C', "page", "", 0, 0, 0);
        let mut buf = Vec::new();
        dirent.write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(Dirent::parse(&buf, 0).is_err());
        assert!(Dirent::parse(&buf[..6], 0).is_err());
    }

    #[test]
    fn test_nul_in_path_rejected() {
        let dirent = Dirent::content(b'C', "bad\0path", "", 0, 0, 0);
        assert!(dirent.write_to(Vec::new()).is_err());
    }
}
