use crate::error::{Result, ZimError};
use std::io::{Read, Write};

/// Magic number: "ZIM\x04" read as a little-endian u32
pub const MAGIC_NUMBER: u32 = 0x044D_495A;

/// Version written by this crate
pub const FORMAT_VERSION_MAJOR: u16 = 6;
pub const FORMAT_VERSION_MINOR: u16 = 1;

/// Oldest major version still readable
pub const MIN_VERSION_MAJOR: u16 = 5;

/// Header size in bytes
pub const HEADER_SIZE: usize = 80;

/// First byte available for cluster data; the mime list must fit below it
pub const CLUSTER_BASE_OFFSET: u64 = 2048;

/// Size of the trailing MD5 checksum
pub const CHECKSUM_SIZE: usize = 16;

/// Sentinel for "no page" in the main/layout page fields
pub const NO_PAGE: u32 = u32::MAX;

/// Archive header at the beginning of the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version_major: u16,
    pub version_minor: u16,
    pub uuid: [u8; 16],
    pub entry_count: u32,
    pub cluster_count: u32,
    pub path_ptr_pos: u64,
    pub title_ptr_pos: u64,
    pub cluster_ptr_pos: u64,
    pub mime_list_pos: u64,
    pub main_page: u32,
    pub layout_page: u32,
    pub checksum_pos: u64,
}

impl Header {
    pub fn new() -> Self {
        Self {
            version_major: FORMAT_VERSION_MAJOR,
            version_minor: FORMAT_VERSION_MINOR,
            uuid: [0u8; 16],
            entry_count: 0,
            cluster_count: 0,
            path_ptr_pos: 0,
            title_ptr_pos: 0,
            cluster_ptr_pos: 0,
            mime_list_pos: HEADER_SIZE as u64,
            main_page: NO_PAGE,
            layout_page: NO_PAGE,
            checksum_pos: 0,
        }
    }

    /// Minor version 1 and above use the flat C/M/W/X namespace scheme
    pub fn has_new_namespace_scheme(&self) -> bool {
        self.version_major >= FORMAT_VERSION_MAJOR && self.version_minor >= 1
    }

    pub fn main_page(&self) -> Option<u32> {
        (self.main_page != NO_PAGE).then_some(self.main_page)
    }

    /// Write header to a writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&MAGIC_NUMBER.to_le_bytes())?;
        writer.write_all(&self.version_major.to_le_bytes())?;
        writer.write_all(&self.version_minor.to_le_bytes())?;
        writer.write_all(&self.uuid)?;
        writer.write_all(&self.entry_count.to_le_bytes())?;
        writer.write_all(&self.cluster_count.to_le_bytes())?;
        writer.write_all(&self.path_ptr_pos.to_le_bytes())?;
        writer.write_all(&self.title_ptr_pos.to_le_bytes())?;
        writer.write_all(&self.cluster_ptr_pos.to_le_bytes())?;
        writer.write_all(&self.mime_list_pos.to_le_bytes())?;
        writer.write_all(&self.main_page.to_le_bytes())?;
        writer.write_all(&self.layout_page.to_le_bytes())?;
        writer.write_all(&self.checksum_pos.to_le_bytes())?;
        Ok(())
    }

    /// Read header from a reader
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let magic = read_u32(&mut reader)?;
        if magic != MAGIC_NUMBER {
            return Err(ZimError::InvalidMagic);
        }

        let version_major = read_u16(&mut reader)?;
        let version_minor = read_u16(&mut reader)?;
        let mut uuid = [0u8; 16];
        reader.read_exact(&mut uuid)?;

        Ok(Self {
            version_major,
            version_minor,
            uuid,
            entry_count: read_u32(&mut reader)?,
            cluster_count: read_u32(&mut reader)?,
            path_ptr_pos: read_u64(&mut reader)?,
            title_ptr_pos: read_u64(&mut reader)?,
            cluster_ptr_pos: read_u64(&mut reader)?,
            mime_list_pos: read_u64(&mut reader)?,
            main_page: read_u32(&mut reader)?,
            layout_page: read_u32(&mut reader)?,
            checksum_pos: read_u64(&mut reader)?,
        })
    }

    /// Validate version compatibility
    pub fn validate_version(&self) -> Result<()> {
        if self.version_major < MIN_VERSION_MAJOR || self.version_major > FORMAT_VERSION_MAJOR {
            return Err(ZimError::UnsupportedVersion(self.version_major));
        }
        Ok(())
    }

    /// Check that every table pointer lies inside a file of `file_size` bytes
    pub fn validate_layout(&self, file_size: u64) -> Result<()> {
        let entries = self.entry_count as u64;
        let clusters = self.cluster_count as u64;
        check_table("path pointer list", self.path_ptr_pos, entries * 8, file_size)?;
        check_table("title pointer list", self.title_ptr_pos, entries * 4, file_size)?;
        check_table("cluster pointer list", self.cluster_ptr_pos, clusters * 8, file_size)?;
        if self.mime_list_pos < HEADER_SIZE as u64 || self.mime_list_pos >= file_size {
            return Err(ZimError::corrupt("mime list position outside file"));
        }
        if self.checksum_pos != 0 {
            check_table("checksum", self.checksum_pos, CHECKSUM_SIZE as u64, file_size)?;
        }
        if let Some(main) = self.main_page() {
            if main >= self.entry_count {
                return Err(ZimError::corrupt("main page index out of range"));
            }
        }
        Ok(())
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

fn check_table(name: &str, pos: u64, len: u64, file_size: u64) -> Result<()> {
    match pos.checked_add(len) {
        Some(end) if end <= file_size => Ok(()),
        _ => Err(ZimError::corrupt(format!("{} extends past end of file", name))),
    }
}

// Helper functions for reading primitive types
pub(crate) fn read_u16<R: Read>(mut reader: R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32<R: Read>(mut reader: R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64<R: Read>(mut reader: R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read a u32 at `pos` in a byte slice, failing on truncation
pub(crate) fn u32_at(data: &[u8], pos: usize) -> Result<u32> {
    data.get(pos..pos.saturating_add(4))
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| ZimError::corrupt(format!("truncated u32 at offset {}", pos)))
}

/// Read a u64 at `pos` in a byte slice, failing on truncation
pub(crate) fn u64_at(data: &[u8], pos: usize) -> Result<u64> {
    data.get(pos..pos.saturating_add(8))
        .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .ok_or_else(|| ZimError::corrupt(format!("truncated u64 at offset {}", pos)))
}

/// Read a NUL-terminated UTF-8 string at `pos`; returns the string and the position after the NUL
pub(crate) fn cstr_at(data: &[u8], pos: usize) -> Result<(String, usize)> {
    let rest = data
        .get(pos..)
        .ok_or_else(|| ZimError::corrupt(format!("string offset {} past end", pos)))?;
    let len = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ZimError::corrupt("unterminated string"))?;
    let s = std::str::from_utf8(&rest[..len])
        .map_err(|e| ZimError::corrupt(format!("invalid UTF-8 in string: {}", e)))?;
    Ok((s.to_string(), pos + len + 1))
}
