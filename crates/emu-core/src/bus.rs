//! Memory and I/O bus interface.

use std::convert::Infallible;

/// Memory and I/O bus interface.
///
/// Components access memory and peripherals through this trait. The bus
/// handles address decoding and routing to the appropriate device.
pub trait Bus {
    /// Error raised when a port read cannot be satisfied.
    type Error;

    /// Read a byte from the given address.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to the given address.
    fn write(&mut self, address: u16, value: u8);

    /// Read a byte from an I/O port.
    ///
    /// `clock` is the CPU's T-state counter at the moment of the read, so
    /// time-driven sources (tape signals) can sample themselves.
    fn io_read(&mut self, port: u16, clock: u64) -> Result<u8, Self::Error>;

    /// Write a byte to an I/O port.
    fn io_write(&mut self, port: u16, value: u8);
}

/// Flat 64K RAM with a fixed port value, for tests.
///
/// Every address is writable. Port reads return `port_value` and port
/// writes are recorded in `out_log`.
pub struct SimpleBus {
    pub memory: Box<[u8; 0x10000]>,
    pub port_value: u8,
    pub out_log: Vec<(u16, u8)>,
}

impl SimpleBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: Box::new([0; 0x10000]),
            port_value: 0xFF,
            out_log: Vec::new(),
        }
    }

    /// Copy `data` into memory starting at `address`, wrapping at $FFFF.
    pub fn load(&mut self, address: u16, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.memory[usize::from(address.wrapping_add(i as u16))] = byte;
        }
    }
}

impl Default for SimpleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimpleBus {
    type Error = Infallible;

    fn read(&mut self, address: u16) -> u8 {
        self.memory[usize::from(address)]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory[usize::from(address)] = value;
    }

    fn io_read(&mut self, _port: u16, _clock: u64) -> Result<u8, Infallible> {
        Ok(self.port_value)
    }

    fn io_write(&mut self, port: u16, value: u8) {
        self.out_log.push((port, value));
    }
}
