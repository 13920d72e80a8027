//! zlib helpers for RZX blocks and SZX RAM pages.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::{Result, SimError};

/// Inflate a zlib stream, naming `format` in the error if it is corrupt.
pub fn inflate(data: &[u8], format: &'static str) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| SimError::invalid(format, format!("bad zlib data: {e}")))?;
    Ok(out)
}

/// Deflate at the highest compression level.
pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
