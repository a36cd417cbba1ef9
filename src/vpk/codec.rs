//! Per-chunk block codecs.
//!
//! Chunks are stored in one of three forms: raw, a marker-prefixed zstd
//! frame, or a marker-less zlib stream. Decode detection is a pure function
//! of the stored size relation and the first eight bytes.

use std::io::{Read, Write};

use crate::vpk::error::{Result, VpkError};

/// 8-byte little-endian marker prefixed to zstd-compressed chunks.
pub const ZSTD_MARKER: u64 = 0x5244315F5F4D4150;
pub const ZSTD_MARKER_LEN: usize = 8;

const ZSTD_LEVEL: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Zlib { level: u32 },
    Zstd,
}

impl Default for CompressionMethod {
    fn default() -> Self {
        CompressionMethod::Zlib { level: 9 }
    }
}

impl CompressionMethod {
    /// Maps a CLI level token onto a method. The literal token `zstd`
    /// selects zstd at a fixed level; everything else selects the
    /// marker-less codec at the named effort.
    pub fn from_level_token(token: &str) -> Self {
        match token {
            "zstd" => CompressionMethod::Zstd,
            "fastest" => CompressionMethod::Zlib { level: 1 },
            "faster" => CompressionMethod::Zlib { level: 3 },
            "better" => CompressionMethod::Zlib { level: 7 },
            "uber" => CompressionMethod::Zlib { level: 9 },
            _ => CompressionMethod::Zlib { level: 6 },
        }
    }

    /// Compresses one chunk, returning `None` when the encoded form
    /// (marker included) is not strictly smaller than the raw bytes.
    pub fn compress_chunk(&self, raw: &[u8]) -> Result<Option<Vec<u8>>> {
        let encoded = match *self {
            CompressionMethod::Zstd => {
                let mut out = Vec::with_capacity(ZSTD_MARKER_LEN + raw.len() / 2);
                out.extend_from_slice(&ZSTD_MARKER.to_le_bytes());
                let mut encoder = zstd::stream::Encoder::new(out, ZSTD_LEVEL)
                    .map_err(|e| VpkError::Codec(e.to_string()))?;
                encoder
                    .write_all(raw)
                    .map_err(|e| VpkError::Codec(e.to_string()))?;
                encoder
                    .finish()
                    .map_err(|e| VpkError::Codec(e.to_string()))?
            }
            CompressionMethod::Zlib { level } => {
                let mut encoder = flate2::write::ZlibEncoder::new(
                    Vec::new(),
                    flate2::Compression::new(level),
                );
                encoder
                    .write_all(raw)
                    .map_err(|e| VpkError::Codec(e.to_string()))?;
                encoder
                    .finish()
                    .map_err(|e| VpkError::Codec(e.to_string()))?
            }
        };

        if encoded.len() < raw.len() {
            Ok(Some(encoded))
        } else {
            Ok(None)
        }
    }
}

/// Returns true when the stored bytes begin with the zstd chunk marker.
pub fn has_zstd_marker(stored: &[u8]) -> bool {
    stored.len() >= ZSTD_MARKER_LEN && stored[..ZSTD_MARKER_LEN] == ZSTD_MARKER.to_le_bytes()
}

/// Decodes one stored chunk back to its original bytes. Raw chunks are
/// recognized by `stored.len() == uncompressed_size`, zstd chunks by the
/// marker, and everything else is treated as a zlib stream.
pub fn decode_chunk(stored: &[u8], uncompressed_size: u64) -> Result<Vec<u8>> {
    if stored.len() as u64 == uncompressed_size {
        return Ok(stored.to_vec());
    }

    if has_zstd_marker(stored) {
        let mut decoder = zstd::stream::Decoder::new(&stored[ZSTD_MARKER_LEN..])
            .map_err(|e| VpkError::Codec(e.to_string()))?;
        let mut out = Vec::with_capacity(uncompressed_size as usize);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| VpkError::Codec(e.to_string()))?;
        return Ok(out);
    }

    let mut decoder = flate2::read::ZlibDecoder::new(stored);
    let mut out = Vec::with_capacity(uncompressed_size as usize);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| VpkError::Codec(e.to_string()))?;
    Ok(out)
}
