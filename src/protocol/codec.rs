//! Whole-stream payload compression.
//!
//! Every byte payload is gzip-compressed in one shot at the fastest level
//! before it is sent, and fully decompressed before use.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::RelayError;

/// Compresses `data` as a single gzip member at the fastest level.
///
/// # Errors
///
/// Returns [`RelayError::Codec`] if the encoder fails.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, RelayError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), Compression::fast());
    encoder
        .write_all(data)
        .map_err(|e| RelayError::Codec(format!("compress: {e}")))?;
    encoder
        .finish()
        .map_err(|e| RelayError::Codec(format!("compress: {e}")))
}

/// Fully decompresses a gzip payload.
///
/// # Errors
///
/// Returns [`RelayError::Codec`] if `data` is not a valid gzip stream.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, RelayError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len().saturating_mul(2));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| RelayError::Codec(format!("decompress: {e}")))?;
    Ok(out)
}

/// Compresses a text payload (UI description markup).
///
/// # Errors
///
/// Returns [`RelayError::Codec`] if the encoder fails.
pub fn compress_text(text: &str) -> Result<Vec<u8>, RelayError> {
    compress(text.as_bytes())
}

/// Decompresses a payload and decodes it as text.
///
/// # Errors
///
/// Returns [`RelayError::Codec`] if the stream is invalid or the content is
/// not valid UTF-8.
pub fn decompress_text(data: &[u8]) -> Result<String, RelayError> {
    String::from_utf8(decompress(data)?)
        .map_err(|e| RelayError::Codec(format!("payload is not text: {e}")))
}
