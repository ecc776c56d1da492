use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::FormatError;

/// Inflates a zlib stream whose decompressed size is known up front.
pub fn inflate(compressed: &[u8], decompressed_size: usize) -> Result<Vec<u8>, FormatError> {
    let mut out = Vec::with_capacity(decompressed_size);
    ZlibDecoder::new(compressed)
        .take(decompressed_size as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|err| FormatError::Decompress(err.to_string()))?;

    if out.len() != decompressed_size {
        return Err(FormatError::Decompress(format!(
            "expected {decompressed_size} bytes, stream produced {}",
            out.len()
        )));
    }
    Ok(out)
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail.
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}
