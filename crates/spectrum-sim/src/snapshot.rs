//! Machine-state snapshots and format dispatch.
//!
//! A [`Snapshot`] is the format-neutral middle ground: decoders in
//! [`crate::sna`], [`crate::z80`] and [`crate::szx`] produce one, a
//! [`crate::Spectrum`] is seeded from one and can render itself back into
//! one for an encoder.

use std::fmt;
use std::fs;
use std::path::Path;

use log::debug;
use zilog_z80::Registers;

use crate::config::{SpectrumModel, read_file};
use crate::error::{Result, SimError};
use crate::memory::PAGE_SIZE;
use crate::{sna, szx, z80};

/// Snapshot container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Sna,
    Z80,
    Szx,
}

impl SnapshotFormat {
    /// Format for a file extension (case-insensitive, without the dot).
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "sna" => Some(Self::Sna),
            "z80" => Some(Self::Z80),
            "szx" => Some(Self::Szx),
            _ => None,
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Sna => "sna",
            Self::Z80 => "z80",
            Self::Szx => "szx",
        }
    }
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Why a decoded snapshot cannot be run faithfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsupported {
    /// Hardware the machine model does not cover.
    Machine,
    /// SZX blocks describing peripherals that are not emulated.
    Blocks(Vec<String>),
}

/// A decoded machine state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub format: SnapshotFormat,
    pub model: SpectrumModel,
    pub registers: Registers,
    /// 16K RAM pages: `$4000`, `$8000`, `$C000` on 48K; banks 0-7 on 128K.
    pub ram: Vec<Vec<u8>>,
    pub border: u8,
    /// Last value written to `$7FFD` (128K only).
    pub out7ffd: u8,
    pub tstates: u64,
    /// The instruction before the snapshot was EI.
    pub ei_last: bool,
    /// Human-readable hardware description.
    pub machine: String,
    pub unsupported: Option<Unsupported>,
}

impl Snapshot {
    /// A snapshot with zeroed RAM and power-on registers.
    #[must_use]
    pub fn new(format: SnapshotFormat, model: SpectrumModel) -> Self {
        let pages = if model.is_128k() { 8 } else { 3 };
        Self {
            format,
            model,
            registers: Registers::default(),
            ram: vec![vec![0; PAGE_SIZE]; pages],
            border: 0,
            out7ffd: 0,
            tstates: 0,
            ei_last: false,
            machine: match model {
                SpectrumModel::Spectrum48K => "48K Spectrum".to_string(),
                SpectrumModel::Spectrum128K => "128K Spectrum".to_string(),
            },
            unsupported: None,
        }
    }

    /// Fail if the snapshot describes hardware that cannot be emulated.
    pub fn check_supported(&self) -> Result<()> {
        match &self.unsupported {
            None => Ok(()),
            Some(Unsupported::Machine) => Err(SimError::UnsupportedMachine),
            Some(Unsupported::Blocks(ids)) => Err(SimError::UnsupportedSzxBlocks(ids.clone())),
        }
    }

    /// RAM page and offset holding `addr`, or `None` for ROM.
    fn locate(&self, addr: u16) -> Option<(usize, usize)> {
        let offset = usize::from(addr) % PAGE_SIZE;
        let slot = usize::from(addr) / PAGE_SIZE;
        let page = match (self.model.is_128k(), slot) {
            (_, 0) => return None,
            (false, slot) => slot - 1,
            (true, 1) => 5,
            (true, 2) => 2,
            (true, _) => usize::from(self.out7ffd & 0x07),
        };
        Some((page, offset))
    }

    /// Byte at `addr` as currently paged in. ROM reads as 0.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        self.locate(addr)
            .and_then(|(page, offset)| self.ram.get(page).map(|p| p[offset]))
            .unwrap_or(0)
    }

    /// Store a byte at `addr`; ROM addresses are ignored.
    pub fn poke(&mut self, addr: u16, value: u8) {
        if let Some((page, offset)) = self.locate(addr) {
            if let Some(p) = self.ram.get_mut(page) {
                p[offset] = value;
            }
        }
    }
}

/// Decode snapshot bytes of the given format.
pub fn decode(format: SnapshotFormat, data: &[u8]) -> Result<Snapshot> {
    let snapshot = match format {
        SnapshotFormat::Sna => sna::decode(data)?,
        SnapshotFormat::Z80 => z80::decode(data)?,
        SnapshotFormat::Szx => szx::decode(data)?,
    };
    debug!(
        "decoded {format} snapshot: {}, PC=${:04X}, T={}",
        snapshot.machine, snapshot.registers.pc, snapshot.tstates
    );
    Ok(snapshot)
}

/// Encode a snapshot in the given format.
pub fn encode(snapshot: &Snapshot, format: SnapshotFormat) -> Result<Vec<u8>> {
    match format {
        SnapshotFormat::Sna => sna::encode(snapshot),
        SnapshotFormat::Z80 => Ok(z80::encode(snapshot)),
        SnapshotFormat::Szx => szx::encode(snapshot),
    }
}

/// Lowercased extension of `path`, or an empty string.
#[must_use]
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Format implied by a path's extension.
pub fn format_of(path: &Path) -> Result<SnapshotFormat> {
    let ext = extension_of(path);
    SnapshotFormat::from_extension(&ext).ok_or(SimError::UnknownFileType(ext))
}

/// Read and decode a snapshot file, choosing the format by extension.
pub fn read(path: &Path) -> Result<Snapshot> {
    let format = format_of(path)?;
    let data = read_file(path)?;
    decode(format, &data)
}

/// Encode a snapshot by the path's extension and write it out.
pub fn write(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let format = format_of(path)?;
    fs::write(path, encode(snapshot, format)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions() {
        assert_eq!(SnapshotFormat::from_extension("Z80"), Some(SnapshotFormat::Z80));
        assert_eq!(SnapshotFormat::from_extension("szx"), Some(SnapshotFormat::Szx));
        assert_eq!(SnapshotFormat::from_extension("slt"), None);
        let err = format_of(Path::new("out.bin")).unwrap_err();
        assert_eq!(err.to_string(), "Unknown file type: bin");
    }

    #[test]
    fn peek_follows_128k_paging() {
        let mut snapshot = Snapshot::new(SnapshotFormat::Z80, SpectrumModel::Spectrum128K);
        snapshot.out7ffd = 3;
        snapshot.poke(0x4000, 5);
        snapshot.poke(0x8000, 2);
        snapshot.poke(0xC000, 3);
        snapshot.poke(0x0000, 9);
        assert_eq!(snapshot.ram[5][0], 5);
        assert_eq!(snapshot.ram[2][0], 2);
        assert_eq!(snapshot.ram[3][0], 3);
        assert_eq!(snapshot.peek(0x0000), 0);
    }

    #[test]
    fn peek_48k_pages_in_address_order() {
        let mut snapshot = Snapshot::new(SnapshotFormat::Sna, SpectrumModel::Spectrum48K);
        snapshot.poke(0xFFFF, 0xAB);
        assert_eq!(snapshot.ram[2][0x3FFF], 0xAB);
        assert_eq!(snapshot.peek(0xFFFF), 0xAB);
    }

    #[test]
    fn unsupported_verdicts() {
        let mut snapshot = Snapshot::new(SnapshotFormat::Szx, SpectrumModel::Spectrum48K);
        assert!(snapshot.check_supported().is_ok());
        snapshot.unsupported = Some(Unsupported::Machine);
        assert_eq!(snapshot.check_supported().unwrap_err().to_string(), "Unsupported machine type");
    }
}
