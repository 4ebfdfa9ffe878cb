//! Content fingerprints and payload encoding.
//!
//! A chunk's id is the SHA-256 of its UTF-8 text, so identical chunks collapse
//! to one record no matter which file produced them. Payloads are stored
//! zlib-compressed and base64-encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

use crate::error::CodecError;

/// Hex-encoded SHA-256 of the chunk text.
pub fn fingerprint(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Compress and encode chunk text for storage.
pub fn encode_payload(text: &str) -> Result<String, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    Ok(STANDARD.encode(encoder.finish()?))
}

/// Reverse [`encode_payload`].
pub fn decode_payload(payload: &str) -> Result<String, CodecError> {
    let compressed = STANDARD.decode(payload.trim())?;
    let mut decoder = ZlibDecoder::new(compressed.as_slice());
    let mut bytes = Vec::new();
    decoder.read_to_end(&mut bytes)?;
    Ok(String::from_utf8(bytes)?)
}
