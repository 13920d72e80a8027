//! Sources of values for hardware input reads.

use crate::error::{Result, SimError};

/// Supplies the byte returned by every `IN` instruction.
///
/// `clock` is the CPU T-state counter at the moment of the read.
pub trait PortSource {
    fn read_port(&mut self, port: u16, clock: u64) -> Result<u8>;
}

/// Reads with nothing attached: every port floats high.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdlePorts;

impl PortSource for IdlePorts {
    fn read_port(&mut self, _port: u16, _clock: u64) -> Result<u8> {
        Ok(0xFF)
    }
}

/// Port values recorded frame by frame, replayed in order.
#[derive(Debug, Default)]
pub struct RecordedPorts {
    frame: usize,
    readings: Vec<u8>,
    next: usize,
}

impl RecordedPorts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the readings for frame `frame`, discarding anything left over.
    pub fn load_frame(&mut self, frame: usize, readings: &[u8]) {
        self.frame = frame;
        self.readings.clear();
        self.readings.extend_from_slice(readings);
        self.next = 0;
    }

    /// Readings not yet consumed in the current frame.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.readings.len() - self.next
    }

    /// Fail if the current frame has unconsumed readings.
    pub fn finish_frame(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            left => Err(SimError::PortReadingsLeft {
                left,
                frame: self.frame,
            }),
        }
    }
}

impl PortSource for RecordedPorts {
    fn read_port(&mut self, _port: u16, _clock: u64) -> Result<u8> {
        let value = *self
            .readings
            .get(self.next)
            .ok_or(SimError::PortReadingsExhausted(self.frame))?;
        self.next += 1;
        Ok(value)
    }
}
