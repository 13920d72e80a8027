//! Machine models and run options.

use std::fmt;
use std::fs;
use std::path::Path;

use log::warn;
use zilog_z80::Registers;

use crate::accelerator::{self, Accelerator};
use crate::error::{Result, SimError};

/// Supported Spectrum models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrumModel {
    Spectrum48K,
    Spectrum128K,
}

impl SpectrumModel {
    /// T-states between frame interrupts.
    #[must_use]
    pub const fn frame_duration(self) -> u64 {
        match self {
            Self::Spectrum48K => 69_888,
            Self::Spectrum128K => 70_908,
        }
    }

    /// T-states at the start of each frame during which INT is held low.
    #[must_use]
    pub const fn int_active(self) -> u64 {
        match self {
            Self::Spectrum48K => 32,
            Self::Spectrum128K => 36,
        }
    }

    #[must_use]
    pub const fn cpu_freq(self) -> u64 {
        match self {
            Self::Spectrum48K => 3_500_000,
            Self::Spectrum128K => 3_546_900,
        }
    }

    /// Size of the ROM image: one 16K page on 48K, two on 128K.
    #[must_use]
    pub const fn rom_size(self) -> usize {
        match self {
            Self::Spectrum48K => 0x4000,
            Self::Spectrum128K => 0x8000,
        }
    }

    #[must_use]
    pub const fn is_128k(self) -> bool {
        matches!(self, Self::Spectrum128K)
    }
}

impl fmt::Display for SpectrumModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Spectrum48K => "48K",
            Self::Spectrum128K => "128K",
        })
    }
}

/// Configuration for creating a Spectrum instance.
pub struct SpectrumConfig {
    pub model: SpectrumModel,
    /// ROM data. Short images are zero-padded to the model's ROM size.
    pub rom: Vec<u8>,
}

/// ROM images available to a run, one per model.
#[derive(Debug, Clone, Default)]
pub struct RomSet {
    rom48: Option<Vec<u8>>,
    rom128: Option<Vec<u8>>,
}

impl RomSet {
    #[must_use]
    pub fn blank() -> Self {
        Self::default()
    }

    /// Read the ROM for `model` from `path`.
    pub fn load(self, model: SpectrumModel, path: &Path) -> Result<Self> {
        let data = read_file(path)?;
        if data.len() != model.rom_size() {
            warn!(
                "{}: expected {} bytes for a {model} ROM, got {}",
                path.display(),
                model.rom_size(),
                data.len()
            );
        }
        Ok(self.with_rom(model, data))
    }

    /// Use `data` as the ROM for `model`.
    #[must_use]
    pub fn with_rom(mut self, model: SpectrumModel, data: Vec<u8>) -> Self {
        match model {
            SpectrumModel::Spectrum48K => self.rom48 = Some(data),
            SpectrumModel::Spectrum128K => self.rom128 = Some(data),
        }
        self
    }

    /// Build the machine configuration for `model`.
    #[must_use]
    pub fn config(&self, model: SpectrumModel) -> SpectrumConfig {
        let rom = match model {
            SpectrumModel::Spectrum48K => self.rom48.clone(),
            SpectrumModel::Spectrum128K => self.rom128.clone(),
        };
        let rom = rom.unwrap_or_else(|| {
            warn!("No {model} ROM supplied; running with a blank ROM");
            vec![0; model.rom_size()]
        });
        SpectrumConfig { model, rom }
    }
}

/// Options for the RZX player.
#[derive(Debug, Clone, Default)]
pub struct PlayerOptions {
    /// Stop after this many frames.
    pub stop: Option<usize>,
    /// Suppress the progress indicator.
    pub quiet: bool,
    /// Skip the supported-machine check.
    pub force: bool,
    /// Write a per-instruction trace.
    pub trace: bool,
    /// Collect the addresses of executed instructions.
    pub map: bool,
}

/// Options for the tape-load simulation.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Loader profiles tried when PC lands on a sampling loop.
    pub accelerators: Vec<&'static Accelerator>,
    pub fast_load: bool,
    /// Pause the tape between blocks until the loader reads the port again.
    pub pause: bool,
    /// Simulation budget in T-states.
    pub timeout: u64,
    /// Tape time of the leading edge of the first block.
    pub first_edge: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            accelerators: accelerator::distinct().collect(),
            fast_load: true,
            pause: true,
            timeout: 900 * 3_500_000,
            first_edge: 0,
        }
    }
}

impl LoadOptions {
    /// Select accelerators from a comma-separated list of names.
    ///
    /// `none` selects nothing; `auto` (or an empty list) selects every
    /// distinct profile.
    pub fn set_accelerators(&mut self, names: &str) -> Result<()> {
        let names: Vec<&str> = names.split(',').map(str::trim).filter(|n| !n.is_empty()).collect();
        self.accelerators = match names.as_slice() {
            [] | ["auto"] => accelerator::distinct().collect(),
            ["none"] => Vec::new(),
            _ => {
                let mut selected: Vec<&'static Accelerator> = Vec::new();
                for name in names {
                    let profile = accelerator::find(name)
                        .ok_or_else(|| SimError::UnknownAccelerator(name.to_string()))?;
                    if !selected.iter().any(|p| std::ptr::eq(*p, profile)) {
                        selected.push(profile);
                    }
                }
                selected
            }
        };
        Ok(())
    }
}

/// Options for the instruction tracer.
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    pub start: Option<u16>,
    pub stop: Option<u16>,
    /// Zero means no limit.
    pub max_operations: u64,
    /// Zero means no limit.
    pub max_tstates: u64,
    pub no_interrupts: bool,
    pub verbose: bool,
}

/// Parse a decimal, `$`-prefixed hex or `0x`-prefixed hex integer.
pub fn parse_int(text: &str) -> Result<u32> {
    let text = text.trim();
    let parsed = if let Some(hex) = text.strip_prefix('$') {
        u32::from_str_radix(hex, 16)
    } else if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|_| SimError::BadInteger(text.to_string()))
}

/// Apply `name=value` register assignments.
pub fn apply_register_specs<S: AsRef<str>>(regs: &mut Registers, specs: &[S]) -> Result<()> {
    for spec in specs {
        let spec = spec.as_ref();
        let (name, value) = spec
            .split_once('=')
            .ok_or_else(|| SimError::BadRegisterValue(spec.to_string()))?;
        let value = parse_int(value).map_err(|_| SimError::BadRegisterValue(spec.to_string()))?;
        if !regs.set_named(name.trim(), value as u16) {
            return Err(SimError::InvalidRegister(name.trim().to_string()));
        }
    }
    Ok(())
}

/// Read a whole file, mapping a missing file to [`SimError::FileNotFound`].
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SimError::FileNotFound(path.to_path_buf()),
        _ => SimError::Io(e),
    })
}
