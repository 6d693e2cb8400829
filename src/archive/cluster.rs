use crate::config::Compression;
use crate::error::{Result, ZimError};
use bytes::Bytes;
use std::io::{Read, Write};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// Info-byte flag for clusters with 64-bit blob offsets
pub const EXTENDED_FLAG: u8 = 0x10;

/// zstd level used for cluster compression
pub const ZSTD_LEVEL: i32 = 19;

/// xz preset used for cluster compression
pub const XZ_PRESET: u32 = 6;

/// Compression identifiers found in the low nibble of the cluster info byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClusterCompression {
    /// 0 and 1 both mean uncompressed
    None = 1,
    Zlib = 2,
    Bzip2 = 3,
    Lzma = 4,
    Zstd = 5,
}

impl ClusterCompression {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 | 1 => Ok(Self::None),
            2 => Ok(Self::Zlib),
            3 => Ok(Self::Bzip2),
            4 => Ok(Self::Lzma),
            5 => Ok(Self::Zstd),
            _ => Err(ZimError::InvalidCompression(value)),
        }
    }

    pub fn is_compressed(self) -> bool {
        self != Self::None
    }
}

impl From<Compression> for ClusterCompression {
    fn from(c: Compression) -> Self {
        match c {
            Compression::None => Self::None,
            Compression::Lzma => Self::Lzma,
            Compression::Zstd => Self::Zstd,
        }
    }
}

/// Serialize blobs into a complete cluster (info byte followed by the payload)
pub fn encode_cluster<B: AsRef<[u8]>>(blobs: &[B], compression: Compression) -> Result<Vec<u8>> {
    let data_size: u64 = blobs.iter().map(|b| b.as_ref().len() as u64).sum();
    let count = blobs.len() as u64 + 1;
    let extended = data_size + count * 4 > u32::MAX as u64;
    let offset_size: u64 = if extended { 8 } else { 4 };

    let mut payload = Vec::with_capacity((count * offset_size + data_size) as usize);
    let mut offset = count * offset_size;
    write_offset(&mut payload, offset, extended)?;
    for blob in blobs {
        offset += blob.as_ref().len() as u64;
        write_offset(&mut payload, offset, extended)?;
    }
    for blob in blobs {
        payload.write_all(blob.as_ref())?;
    }

    let mut info = ClusterCompression::from(compression) as u8;
    if extended {
        info |= EXTENDED_FLAG;
    }

    let mut out = vec![info];
    match compression {
        Compression::None => out.extend_from_slice(&payload),
        Compression::Zstd => {
            let compressed = zstd::stream::encode_all(&payload[..], ZSTD_LEVEL)
                .map_err(|e| ZimError::CompressionFailed(format!("zstd: {}", e)))?;
            out.extend_from_slice(&compressed);
        }
        Compression::Lzma => {
            let mut encoder = XzEncoder::new(out, XZ_PRESET);
            encoder
                .write_all(&payload)
                .map_err(|e| ZimError::CompressionFailed(format!("xz: {}", e)))?;
            out = encoder
                .finish()
                .map_err(|e| ZimError::CompressionFailed(format!("xz: {}", e)))?;
        }
    }
    Ok(out)
}

fn write_offset(buf: &mut Vec<u8>, offset: u64, extended: bool) -> Result<()> {
    if extended {
        buf.write_all(&offset.to_le_bytes())?;
    } else {
        buf.write_all(&(offset as u32).to_le_bytes())?;
    }
    Ok(())
}

/// A decoded cluster: its uncompressed payload plus the blob offset table
///
/// Blobs are handed out as `Bytes` slices of the payload, so they keep the
/// buffer alive on their own.
#[derive(Debug, Clone)]
pub struct Cluster {
    payload: Bytes,
    offsets: Vec<u64>,
    compression: ClusterCompression,
    extended: bool,
}

impl Cluster {
    /// Decode a cluster from its raw bytes, starting at the info byte
    ///
    /// `raw` may extend past the end of the cluster; compressed streams
    /// stop at their own end marker.
    pub fn decode(raw: Bytes) -> Result<Self> {
        let info = *raw
            .first()
            .ok_or_else(|| ZimError::corrupt("empty cluster"))?;
        let compression = ClusterCompression::from_u8(info & 0x0F)?;
        let extended = info & EXTENDED_FLAG != 0;
        let body = raw.slice(1..);

        let payload = match compression {
            ClusterCompression::None => body,
            ClusterCompression::Zstd => {
                let mut decoder = zstd::stream::read::Decoder::new(&body[..])
                    .map_err(|e| ZimError::DecompressionFailed(format!("zstd: {}", e)))?
                    .single_frame();
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| ZimError::DecompressionFailed(format!("zstd: {}", e)))?;
                Bytes::from(out)
            }
            ClusterCompression::Lzma => {
                let mut decoder = XzDecoder::new(&body[..]);
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| ZimError::DecompressionFailed(format!("xz: {}", e)))?;
                Bytes::from(out)
            }
            ClusterCompression::Zlib | ClusterCompression::Bzip2 => {
                return Err(ZimError::DecompressionFailed(format!(
                    "unsupported cluster compression {:?}",
                    compression
                )))
            }
        };

        let offsets = parse_offsets(&payload, extended)?;
        Ok(Self {
            payload,
            offsets,
            compression,
            extended,
        })
    }

    pub fn blob_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn compression(&self) -> ClusterCompression {
        self.compression
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Offset of blob `index` relative to the start of the payload
    pub fn blob_offset(&self, index: usize) -> Result<u64> {
        self.check_index(index)?;
        Ok(self.offsets[index])
    }

    pub fn blob_size(&self, index: usize) -> Result<u64> {
        self.check_index(index)?;
        Ok(self.offsets[index + 1] - self.offsets[index])
    }

    /// Zero-copy view of blob `index`
    pub fn blob(&self, index: usize) -> Result<Bytes> {
        self.check_index(index)?;
        let start = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        Ok(self.payload.slice(start..end))
    }

    /// Uncompressed size of the payload in use
    pub fn size(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.blob_count() {
            return Err(ZimError::corrupt(format!(
                "blob {} out of range (cluster has {})",
                index,
                self.blob_count()
            )));
        }
        Ok(())
    }
}

fn parse_offsets(payload: &[u8], extended: bool) -> Result<Vec<u64>> {
    let offset_size = if extended { 8 } else { 4 };
    let read = |i: usize| -> Result<u64> {
        let start = i * offset_size;
        let bytes = payload
            .get(start..start + offset_size)
            .ok_or_else(|| ZimError::corrupt("cluster offset table truncated"))?;
        Ok(if extended {
            let mut b = [0u8; 8];
            b.copy_from_slice(bytes);
            u64::from_le_bytes(b)
        } else {
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64
        })
    };

    let first = read(0)?;
    if first == 0 || first % offset_size as u64 != 0 {
        return Err(ZimError::corrupt(format!("invalid first blob offset {}", first)));
    }
    let count = (first / offset_size as u64) as usize;
    if first as usize > payload.len() {
        return Err(ZimError::corrupt("cluster offset table larger than cluster"));
    }

    let mut offsets = Vec::with_capacity(count);
    let mut previous = 0;
    for i in 0..count {
        let offset = read(i)?;
        if offset < previous || offset as usize > payload.len() {
            return Err(ZimError::corrupt(format!("invalid blob offset {}", offset)));
        }
        previous = offset;
        offsets.push(offset);
    }
    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_blobs() -> Vec<Vec<u8>> {
        vec![
            b"first blob".to_vec(),
            Vec::new(),
            b"<html>third</html>".repeat(50),
        ]
    }

    #[test]
    fn test_uncompressed_layout() {
        let blobs = sample_blobs();
        let raw = encode_cluster(&blobs, Compression::None).unwrap();
        assert_eq!(raw[0], 1);
        // 4 offsets of 4 bytes each
        assert_eq!(&raw[1..5], &16u32.to_le_bytes());

        let cluster = Cluster::decode(Bytes::from(raw)).unwrap();
        assert_eq!(cluster.blob_count(), 3);
        assert_eq!(cluster.blob_offset(0).unwrap(), 16);
        assert_eq!(cluster.blob_size(1).unwrap(), 0);
    }

    #[test]
    fn test_all_codecs_decode() {
        let blobs = sample_blobs();
        for compression in [Compression::None, Compression::Zstd, Compression::Lzma] {
            let mut raw = encode_cluster(&blobs, compression).unwrap();
            // trailing bytes belong to whatever follows the cluster
            raw.extend_from_slice(b"trailing garbage");
            let cluster = Cluster::decode(Bytes::from(raw)).unwrap();
            assert_eq!(cluster.blob_count(), blobs.len());
            for (i, blob) in blobs.iter().enumerate() {
                assert_eq!(&cluster.blob(i).unwrap()[..], &blob[..]);
            }
        }
    }

    #[test]
    fn test_compression_shrinks_repetitive_data() {
        let blobs = vec![b"<p>repeat me</p>".repeat(500)];
        let plain = encode_cluster(&blobs, Compression::None).unwrap();
        let zstd = encode_cluster(&blobs, Compression::Zstd).unwrap();
        let xz = encode_cluster(&blobs, Compression::Lzma).unwrap();
        assert!(zstd.len() < plain.len());
        assert!(xz.len() < plain.len());
    }

    #[test]
    fn test_blob_outlives_cluster() {
        let raw = encode_cluster(&[b"kept alive".to_vec()], Compression::Zstd).unwrap();
        let blob = {
            let cluster = Cluster::decode(Bytes::from(raw)).unwrap();
            cluster.blob(0).unwrap()
        };
        assert_eq!(&blob[..], b"kept alive");
    }

    #[test]
    fn test_corrupt_clusters_rejected() {
        assert!(Cluster::decode(Bytes::new()).is_err());
        assert!(Cluster::decode(Bytes::from_static(&[9, 0, 0])).is_err());
        assert!(Cluster::decode(Bytes::from_static(&[2, 0, 0, 0, 0])).is_err());
        // first offset not a multiple of the offset size
        assert!(Cluster::decode(Bytes::from_static(&[1, 3, 0, 0, 0])).is_err());
        // offset beyond payload
        assert!(Cluster::decode(Bytes::from_static(&[1, 8, 0, 0, 0, 99, 0, 0, 0])).is_err());

        let empty = Cluster::decode(Bytes::from_static(&[1, 4, 0, 0, 0])).unwrap();
        assert_eq!(empty.blob_count(), 0);
    }
}
