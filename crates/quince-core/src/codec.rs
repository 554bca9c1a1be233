//! Value Codec: byte encodings for object and zblob columns.
//!
//! Object columns are stored as JSON bytes, optionally zlib-compressed.
//! Zblob columns store the zlib encoding of the caller's bytes and always
//! decompress exactly once on read, so bytes that were already compressed
//! before being written come back unchanged.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::CoreError;

/// How a payload is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Stored verbatim.
    #[default]
    Plain,
    /// zlib-compressed.
    Zlib,
}

/// Compresses `data` with zlib at the default level.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CoreError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inverse of [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CoreError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Applies `encoding` to raw bytes.
pub fn encode_bytes(data: &[u8], encoding: Encoding) -> Result<Vec<u8>, CoreError> {
    match encoding {
        Encoding::Plain => Ok(data.to_vec()),
        Encoding::Zlib => compress(data),
    }
}

/// Reverses [`encode_bytes`].
pub fn decode_bytes(data: &[u8], encoding: Encoding) -> Result<Vec<u8>, CoreError> {
    match encoding {
        Encoding::Plain => Ok(data.to_vec()),
        Encoding::Zlib => decompress(data),
    }
}

/// Serializes an object value to bytes.
pub fn encode_object(value: &serde_json::Value, encoding: Encoding) -> Result<Vec<u8>, CoreError> {
    let json = serde_json::to_vec(value)?;
    match encoding {
        Encoding::Plain => Ok(json),
        Encoding::Zlib => compress(&json),
    }
}

/// Deserializes bytes produced by [`encode_object`].
pub fn decode_object(data: &[u8], encoding: Encoding) -> Result<serde_json::Value, CoreError> {
    match encoding {
        Encoding::Plain => Ok(serde_json::from_slice(data)?),
        Encoding::Zlib => Ok(serde_json::from_slice(&decompress(data)?)?),
    }
}
