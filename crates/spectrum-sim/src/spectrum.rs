//! ZX Spectrum system.
//!
//! Owns the CPU and the bus. The bus is generic over the port source so
//! each front-end (RZX replay, tape loading, plain tracing) plugs in its
//! own idea of what `IN` returns.

use log::info;
use zilog_z80::{Registers, Z80, disassemble};

use crate::bus::SpectrumBus;
use crate::config::{RomSet, SpectrumConfig, SpectrumModel};
use crate::error::Result;
use crate::memory::{Memory48K, Memory128K, SpectrumMemory};
use crate::port::PortSource;
use crate::snapshot::{Snapshot, SnapshotFormat};

/// ZX Spectrum system.
pub struct Spectrum<P> {
    cpu: Z80,
    bus: SpectrumBus<P>,
    model: SpectrumModel,
}

impl<P: PortSource> Spectrum<P> {
    /// Create a powered-on Spectrum from the given configuration.
    #[must_use]
    pub fn new(config: &SpectrumConfig, ports: P) -> Self {
        let memory: Box<dyn SpectrumMemory> = match config.model {
            SpectrumModel::Spectrum48K => Box::new(Memory48K::new(&config.rom)),
            SpectrumModel::Spectrum128K => Box::new(Memory128K::new(&config.rom)),
        };
        info!("created {} Spectrum", config.model);
        Self {
            cpu: Z80::new(),
            bus: SpectrumBus::new(memory, ports),
            model: config.model,
        }
    }

    /// Create a Spectrum in the state a snapshot describes.
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot, roms: &RomSet, ports: P) -> Self {
        let mut spectrum = Self::new(&roms.config(snapshot.model), ports);
        for (page, data) in snapshot.ram.iter().enumerate() {
            spectrum.bus.memory.load_ram_page(page, data);
        }
        if snapshot.model.is_128k() {
            spectrum.bus.memory.write_bank_register(snapshot.out7ffd);
        }
        spectrum.bus.border = snapshot.border & 0x07;
        spectrum.cpu = Z80::with_registers(snapshot.registers, snapshot.tstates);
        spectrum.cpu.set_interrupts_blocked(snapshot.ei_last);
        spectrum
    }

    /// Capture the current state for a snapshot encoder.
    #[must_use]
    pub fn to_snapshot(&self, format: SnapshotFormat) -> Snapshot {
        let mut snapshot = Snapshot::new(format, self.model);
        for (page, data) in self.bus.memory.ram_pages().into_iter().enumerate() {
            snapshot.ram[page].copy_from_slice(data);
        }
        snapshot.registers = *self.cpu.regs();
        snapshot.border = self.bus.border;
        snapshot.out7ffd = self.bus.memory.bank_register();
        snapshot.tstates = self.cpu.tstates() % self.model.frame_duration();
        snapshot.ei_last = self.cpu.interrupts_blocked();
        snapshot
    }

    /// Execute one instruction.
    pub fn step(&mut self) -> Result<u32> {
        self.cpu.step(&mut self.bus)
    }

    /// Accept an interrupt if the CPU allows it.
    pub fn accept_interrupt(&mut self) -> Option<u32> {
        self.cpu.accept_interrupt(&mut self.bus)
    }

    /// Accept an interrupt whenever IFF1 is set, ignoring a preceding EI.
    pub fn force_interrupt(&mut self) -> Option<u32> {
        self.cpu.force_interrupt(&mut self.bus)
    }

    /// Read memory without side effects.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        self.bus.memory.read(addr)
    }

    pub fn poke(&mut self, addr: u16, value: u8) {
        self.bus.memory.write(addr, value);
    }

    /// Mnemonic of the instruction at `addr`.
    #[must_use]
    pub fn disassemble(&self, addr: u16) -> String {
        disassemble(|a| self.peek(a), addr).0
    }

    #[must_use]
    pub fn model(&self) -> SpectrumModel {
        self.model
    }

    #[must_use]
    pub fn cpu(&self) -> &Z80 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Z80 {
        &mut self.cpu
    }

    #[must_use]
    pub fn regs(&self) -> &Registers {
        self.cpu.regs()
    }

    pub fn regs_mut(&mut self) -> &mut Registers {
        self.cpu.regs_mut()
    }

    #[must_use]
    pub fn bus(&self) -> &SpectrumBus<P> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SpectrumBus<P> {
        &mut self.bus
    }

    #[must_use]
    pub fn ports(&self) -> &P {
        &self.bus.ports
    }

    pub fn ports_mut(&mut self) -> &mut P {
        &mut self.bus.ports
    }
}
