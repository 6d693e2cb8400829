//! Sequential on-disk layout writer
//!
//! Clusters are streamed first, starting at [`CLUSTER_BASE_OFFSET`]. The
//! mime list, dirents, pointer lists, header and checksum are written once
//! the directory is complete.

use crate::archive::dirent::Dirent;
use crate::archive::format::{Header, CHECKSUM_SIZE, CLUSTER_BASE_OFFSET, HEADER_SIZE};
use crate::archive::mimetypes::MimeList;
use crate::error::{Result, ZimError};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use tracing::debug;

/// Space reserved for the mime list between the header and the first cluster
pub const MIME_LIST_CAPACITY: usize = CLUSTER_BASE_OFFSET as usize - HEADER_SIZE;

/// Writes the archive file front to back
pub struct LayoutWriter {
    writer: BufWriter<File>,
    position: u64,
    cluster_ptrs: Vec<u64>,
}

impl LayoutWriter {
    /// Start a layout on an empty file, reserving the header and mime list area
    pub fn new(file: File) -> Result<Self> {
        let mut writer = BufWriter::new(file);
        writer.write_all(&[0u8; CLUSTER_BASE_OFFSET as usize])?;
        Ok(Self {
            writer,
            position: CLUSTER_BASE_OFFSET,
            cluster_ptrs: Vec::new(),
        })
    }

    /// Append an encoded cluster, returning its cluster number
    pub fn write_cluster(&mut self, raw: &[u8]) -> Result<u32> {
        let number = self.cluster_ptrs.len() as u32;
        self.cluster_ptrs.push(self.position);
        self.writer.write_all(raw)?;
        self.position += raw.len() as u64;
        Ok(number)
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_ptrs.len() as u32
    }

    /// Write the directory and trailer, then checksum the file
    ///
    /// `dirents` must already be sorted by namespace then path, and dirent
    /// indexes inside them (redirect targets) must refer to that order.
    /// `title_order` lists dirent indexes sorted by namespace then title.
    pub fn finish(
        mut self,
        mut header: Header,
        mimes: &MimeList,
        dirents: &[Dirent],
        title_order: &[u32],
    ) -> Result<File> {
        if title_order.len() != dirents.len() {
            return Err(ZimError::InvalidState(format!(
                "title order has {} entries for {} dirents",
                title_order.len(),
                dirents.len()
            )));
        }

        let mut mime_bytes = Vec::new();
        mimes.write_to(&mut mime_bytes)?;
        if mime_bytes.len() > MIME_LIST_CAPACITY {
            return Err(ZimError::ContractViolation(format!(
                "mime list needs {} bytes, only {} available",
                mime_bytes.len(),
                MIME_LIST_CAPACITY
            )));
        }

        // Dirents
        let mut dirent_ptrs = Vec::with_capacity(dirents.len());
        for dirent in dirents {
            dirent_ptrs.push(self.position);
            self.position += dirent.write_to(&mut self.writer)? as u64;
        }

        // Path pointer list
        header.path_ptr_pos = self.position;
        for ptr in &dirent_ptrs {
            self.writer.write_all(&ptr.to_le_bytes())?;
        }
        self.position += dirent_ptrs.len() as u64 * 8;

        // Title pointer list
        header.title_ptr_pos = self.position;
        for index in title_order {
            self.writer.write_all(&index.to_le_bytes())?;
        }
        self.position += title_order.len() as u64 * 4;

        // Cluster pointer list
        header.cluster_ptr_pos = self.position;
        for ptr in &self.cluster_ptrs {
            self.writer.write_all(&ptr.to_le_bytes())?;
        }
        self.position += self.cluster_ptrs.len() as u64 * 8;

        header.entry_count = dirents.len() as u32;
        header.cluster_count = self.cluster_ptrs.len() as u32;
        header.mime_list_pos = HEADER_SIZE as u64;
        header.checksum_pos = self.position;

        // Header and mime list go back into the reserved area
        self.writer.seek(SeekFrom::Start(0))?;
        header.write_to(&mut self.writer)?;
        self.writer.write_all(&mime_bytes)?;
        self.writer.flush()?;

        let mut file = self.writer.into_inner().map_err(|e| e.into_error())?;
        let digest = checksum_file(&file, header.checksum_pos)?;
        file.seek(SeekFrom::Start(header.checksum_pos))?;
        file.write_all(&digest)?;
        file.sync_all()?;

        debug!(
            entries = header.entry_count,
            clusters = header.cluster_count,
            size = header.checksum_pos + CHECKSUM_SIZE as u64,
            "Archive layout written"
        );
        Ok(file)
    }
}

/// MD5 of the first `len` bytes of `file`
fn checksum_file(file: &File, len: u64) -> Result<[u8; CHECKSUM_SIZE]> {
    // SAFETY: the file is exclusively owned by the writer and not resized while mapped
    let map = unsafe { Mmap::map(file)? };
    let data = map
        .get(..len as usize)
        .ok_or_else(|| ZimError::InvalidState("file shorter than checksum position".into()))?;
    Ok(md5::compute(data).0)
}
