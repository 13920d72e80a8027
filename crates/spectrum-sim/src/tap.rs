//! TAP tape images.
//!
//! A TAP file is a run of blocks, each preceded by a 2-byte little-endian
//! length. A block holds a flag byte, the data and a checksum byte (XOR of
//! the flag and data). Every block plays with standard ROM timings and a
//! one-second pause after it.

use log::warn;

use crate::error::{Result, SimError};
use crate::pulses::Segment;

const PAUSE_MS: u32 = 1000;

/// One block of a TAP file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapBlock {
    /// Flag, data and checksum, exactly as recorded.
    pub bytes: Vec<u8>,
}

impl TapBlock {
    #[must_use]
    pub fn flag(&self) -> u8 {
        self.bytes.first().copied().unwrap_or(0)
    }

    /// True when the XOR of every byte, checksum included, is zero.
    #[must_use]
    pub fn checksum_ok(&self) -> bool {
        self.bytes.iter().fold(0, |acc, &b| acc ^ b) == 0
    }
}

/// A parsed TAP file.
#[derive(Debug, Clone, Default)]
pub struct TapFile {
    pub blocks: Vec<TapBlock>,
}

impl TapFile {
    /// Parse a TAP file. A bad checksum is logged, not rejected: the loader
    /// running against the tape decides what to make of it.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut blocks = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            let Some(len) = data.get(offset..offset + 2) else {
                return Err(SimError::invalid("TAP", format!("truncated block length at offset {offset}")));
            };
            let len = usize::from(u16::from_le_bytes([len[0], len[1]]));
            let start = offset + 2;
            let Some(bytes) = data.get(start..start + len) else {
                return Err(SimError::invalid(
                    "TAP",
                    format!("block at offset {offset} needs {len} bytes, {} remain", data.len() - start),
                ));
            };

            let block = TapBlock { bytes: bytes.to_vec() };
            if !block.checksum_ok() {
                warn!("TAP block {} at offset {offset}: checksum mismatch", blocks.len());
            }
            blocks.push(block);
            offset = start + len;
        }

        Ok(Self { blocks })
    }

    /// The tape's signal.
    #[must_use]
    pub fn segments(&self) -> Vec<Segment> {
        self.blocks
            .iter()
            .flat_map(|block| Segment::standard_block(block.bytes.clone(), PAUSE_MS))
            .collect()
    }
}
