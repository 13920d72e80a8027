//! ZX Spectrum execution for offline tools.
//!
//! A 48K/128K Spectrum built on the `zilog-z80` core, with pluggable port
//! sources so the same machine can replay an RZX input recording, load a
//! tape against its own loader, or simply trace code. Snapshot codecs
//! (SNA, Z80, SZX), the RZX container and TAP/TZX tape images live here
//! too, along with the pieces the `rzxplay`, `rzxinfo`, `tapsim` and
//! `z80trace` binaries share.

pub mod accelerator;
mod bus;
pub mod cli;
pub mod config;
mod error;
pub mod loader;
mod memory;
pub mod player;
mod port;
pub mod pulses;
pub mod rzx;
mod sna;
pub mod snapshot;
mod spectrum;
mod szx;
pub mod tap;
pub mod tape;
pub mod trace;
pub mod tzx;
mod z80;
mod zlib;

pub use bus::SpectrumBus;
pub use config::{LoadOptions, PlayerOptions, RomSet, SpectrumConfig, SpectrumModel, TraceOptions};
pub use error::{Result, SimError};
pub use loader::{LoadSimulation, StopReason};
pub use memory::{Memory48K, Memory128K, PAGE_SIZE, SpectrumMemory};
pub use player::{Output, Player};
pub use port::{IdlePorts, PortSource, RecordedPorts};
pub use rzx::RzxFile;
pub use snapshot::{Snapshot, SnapshotFormat};
pub use spectrum::Spectrum;
pub use tape::LiveTape;
pub use trace::StopCondition;
