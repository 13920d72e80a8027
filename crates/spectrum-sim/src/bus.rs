//! Spectrum bus: memory and I/O routing.
//!
//! Reads of any port go to the attached [`PortSource`]. Writes decode two
//! ports: the ULA (any even port) for the border, and `$7FFD` (bits 1 and
//! 15 clear) for 128K paging.

use emu_core::Bus;

use crate::error::SimError;
use crate::memory::SpectrumMemory;
use crate::port::PortSource;

/// The Spectrum bus, implementing `emu_core::Bus`.
pub struct SpectrumBus<P> {
    pub memory: Box<dyn SpectrumMemory>,
    pub ports: P,
    /// Border colour (bits 0-2 of the last ULA write).
    pub border: u8,
    /// Last value written to an even port.
    pub last_fe_write: u8,
}

impl<P: PortSource> SpectrumBus<P> {
    #[must_use]
    pub fn new(memory: Box<dyn SpectrumMemory>, ports: P) -> Self {
        Self {
            memory,
            ports,
            border: 7,
            last_fe_write: 0,
        }
    }
}

impl<P: PortSource> Bus for SpectrumBus<P> {
    type Error = SimError;

    fn read(&mut self, address: u16) -> u8 {
        self.memory.read(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory.write(address, value);
    }

    fn io_read(&mut self, port: u16, clock: u64) -> Result<u8, SimError> {
        self.ports.read_port(port, clock)
    }

    fn io_write(&mut self, port: u16, value: u8) {
        if port & 0x0001 == 0 {
            self.border = value & 0x07;
            self.last_fe_write = value;
        }
        if port & 0x8002 == 0 {
            self.memory.write_bank_register(value);
        }
    }
}
