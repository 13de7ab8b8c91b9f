//! ZIP Handler Module
//!
//! This module recovers the report XML from the single-entry ZIP archives that
//! DMARC report generators attach to mail. It is deliberately not a general ZIP
//! reader: it parses one local file header, requires a deflate entry, rebuilds a
//! zlib stream around the raw deflate payload, and inflates it in memory. The
//! entry filename is read only for its length; nothing touches the filesystem.
//!
//! All header fields are read through `ByteCursor`, so malformed length fields
//! are rejected instead of being followed out of bounds.

use crate::cursor::ByteCursor;
use crate::error::{PipelineError, Result};
use flate2::{Crc, Decompress, FlushDecompress};

const LOCAL_HEADER_LEN: usize = 30;
const LOCAL_HEADER_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const METHOD_DEFLATE: u16 = 8;

/// CMF/FLG pair for a standard zlib stream: deflate with a 32K window,
/// default compression level, no preset dictionary.
const ZLIB_HEADER: [u8; 2] = [0x78, 0x9c];

/// The fixed 30-byte ZIP local file header, little-endian throughout.
#[derive(Debug)]
pub struct LocalFileHeader {
    pub version: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub filename_len: u16,
    pub extra_len: u16,
}

impl LocalFileHeader {
    fn parse(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let magic = cur.read_bytes(4)?;
        if magic != LOCAL_HEADER_MAGIC {
            return Err(PipelineError::UnsupportedFormat);
        }
        let version = cur.read_u16_le()?;
        let flags = cur.read_u16_le()?;
        let method = cur.read_u16_le()?;
        if method != METHOD_DEFLATE {
            return Err(PipelineError::UnsupportedCompression);
        }
        Ok(LocalFileHeader {
            version,
            flags,
            method,
            mod_time: cur.read_u16_le()?,
            mod_date: cur.read_u16_le()?,
            crc32: cur.read_u32_le()?,
            compressed_size: cur.read_u32_le()?,
            uncompressed_size: cur.read_u32_le()?,
            filename_len: cur.read_u16_le()?,
            extra_len: cur.read_u16_le()?,
        })
    }
}

/// Extracts the report text from a single-entry deflate archive.
///
/// `max_decompressed_size` caps the declared uncompressed size before any
/// inflation happens, so a forged header cannot force a huge allocation.
pub fn extract_report(data: &[u8], max_decompressed_size: usize) -> Result<String> {
    if data.len() < LOCAL_HEADER_LEN {
        return Err(PipelineError::TruncatedArchive(format!(
            "{} bytes, local file header needs {}",
            data.len(),
            LOCAL_HEADER_LEN
        )));
    }

    let mut cur = ByteCursor::new(data);
    let header = LocalFileHeader::parse(&mut cur)?;

    // The variable-length regions and the payload must all fit in the buffer.
    // Widened arithmetic, the three fields can sum past u32.
    let need =
        header.filename_len as u64 + header.extra_len as u64 + header.compressed_size as u64;
    if need > cur.remaining() as u64 {
        return Err(PipelineError::TruncatedArchive(format!(
            "header declares {} bytes past the local header, only {} present",
            need,
            cur.remaining()
        )));
    }

    let uncompressed_size = header.uncompressed_size as usize;
    if uncompressed_size > max_decompressed_size {
        return Err(PipelineError::DecompressionError(format!(
            "declared uncompressed size {} exceeds the {} byte limit",
            uncompressed_size, max_decompressed_size
        )));
    }

    cur.read_bytes(header.filename_len as usize)?;
    cur.read_bytes(header.extra_len as usize)?;
    let payload = cur.read_bytes(header.compressed_size as usize)?;

    // The payload is a raw deflate stream; frame it as zlib so a standard
    // inflater accepts it. No Adler-32 trailer exists, so the stream never
    // reaches StreamEnd: completion is judged by byte counts instead.
    let mut stream = Vec::with_capacity(ZLIB_HEADER.len() + payload.len());
    stream.extend_from_slice(&ZLIB_HEADER);
    stream.extend_from_slice(payload);

    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(uncompressed_size);
    inflater
        .decompress_vec(&stream, &mut out, FlushDecompress::Finish)
        .map_err(|e| PipelineError::DecompressionError(e.to_string()))?;

    if out.len() != uncompressed_size {
        return Err(PipelineError::DecompressionError(format!(
            "produced {} bytes, header declared {}",
            out.len(),
            uncompressed_size
        )));
    }
    if inflater.total_in() != stream.len() as u64 {
        return Err(PipelineError::DecompressionError(format!(
            "{} compressed bytes left unconsumed",
            stream.len() as u64 - inflater.total_in()
        )));
    }

    let mut crc = Crc::new();
    crc.update(&out);
    if crc.sum() != header.crc32 {
        return Err(PipelineError::IntegrityError {
            expected: header.crc32,
            actual: crc.sum(),
        });
    }

    String::from_utf8(out)
        .map_err(|_| PipelineError::DecompressionError("payload is not valid UTF-8".into()))
}
