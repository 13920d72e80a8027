//! TZX tape images.
//!
//! A 10-byte header (`"ZXTape!" + 0x1A + major + minor`) followed by blocks,
//! each introduced by an id byte that decides its layout. Signal blocks turn
//! into [`Segment`]s; metadata blocks are skipped over.
//!
//! Reference: <https://worldofspectrum.net/TZXformat.html>

use log::{debug, warn};

use crate::config::SpectrumModel;
use crate::error::{Result, SimError};
use crate::pulses::Segment;

const MAGIC: &[u8; 8] = b"ZXTape!\x1A";

/// A single TZX block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TzxBlock {
    /// $10: data with ROM timings.
    StandardSpeed { pause_ms: u16, data: Vec<u8> },
    /// $11: data with custom timings.
    TurboSpeed {
        pilot_pulse: u16,
        sync1: u16,
        sync2: u16,
        zero_pulse: u16,
        one_pulse: u16,
        pilot_count: u16,
        used_bits: u8,
        pause_ms: u16,
        data: Vec<u8>,
    },
    /// $12
    PureTone { pulse_len: u16, count: u16 },
    /// $13
    PulseSequence(Vec<u16>),
    /// $14: data bits without pilot or sync.
    PureData {
        zero_pulse: u16,
        one_pulse: u16,
        used_bits: u8,
        pause_ms: u16,
        data: Vec<u8>,
    },
    /// $15: sampled levels.
    DirectRecording {
        sample: u16,
        pause_ms: u16,
        used_bits: u8,
        data: Vec<u8>,
    },
    /// $20: a pause, or a tape stop when zero.
    Pause(u16),
    /// $21
    GroupStart(String),
    /// $22
    GroupEnd,
    /// $24
    LoopStart(u16),
    /// $25
    LoopEnd,
    /// $2A
    StopIf48K,
    /// Anything else; its body has been skipped.
    Skipped(u8),
}

/// A parsed TZX file.
#[derive(Debug, Clone)]
pub struct TzxFile {
    pub major: u8,
    pub minor: u8,
    pub blocks: Vec<TzxBlock>,
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos + n).ok_or_else(|| {
            SimError::invalid(
                "TZX",
                format!(
                    "truncated {what} at offset {}: need {n} bytes, {} remain",
                    self.pos,
                    self.data.len() - self.pos
                ),
            )
        })?;
        self.pos += n;
        Ok(bytes)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u24(&mut self, what: &str) -> Result<usize> {
        let b = self.take(3, what)?;
        Ok(usize::from(b[0]) | usize::from(b[1]) << 8 | usize::from(b[2]) << 16)
    }

    fn u32(&mut self, what: &str) -> Result<usize> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }

    fn bytes(&mut self, n: usize, what: &str) -> Result<Vec<u8>> {
        self.take(n, what).map(<[u8]>::to_vec)
    }

    fn skip(&mut self, n: usize, what: &str) -> Result<()> {
        self.take(n, what).map(|_| ())
    }

    fn block(&mut self, id: u8) -> Result<TzxBlock> {
        Ok(match id {
            0x10 => {
                let pause_ms = self.u16("standard speed header")?;
                let len = usize::from(self.u16("standard speed header")?);
                TzxBlock::StandardSpeed {
                    pause_ms,
                    data: self.bytes(len, "standard speed data")?,
                }
            }
            0x11 => {
                let what = "turbo speed header";
                let pilot_pulse = self.u16(what)?;
                let sync1 = self.u16(what)?;
                let sync2 = self.u16(what)?;
                let zero_pulse = self.u16(what)?;
                let one_pulse = self.u16(what)?;
                let pilot_count = self.u16(what)?;
                let used_bits = self.u8(what)?;
                let pause_ms = self.u16(what)?;
                let len = self.u24(what)?;
                TzxBlock::TurboSpeed {
                    pilot_pulse,
                    sync1,
                    sync2,
                    zero_pulse,
                    one_pulse,
                    pilot_count,
                    used_bits,
                    pause_ms,
                    data: self.bytes(len, "turbo speed data")?,
                }
            }
            0x12 => TzxBlock::PureTone {
                pulse_len: self.u16("pure tone")?,
                count: self.u16("pure tone")?,
            },
            0x13 => {
                let count = self.u8("pulse sequence")?;
                let pulses = (0..count)
                    .map(|_| self.u16("pulse sequence"))
                    .collect::<Result<Vec<_>>>()?;
                TzxBlock::PulseSequence(pulses)
            }
            0x14 => {
                let what = "pure data header";
                let zero_pulse = self.u16(what)?;
                let one_pulse = self.u16(what)?;
                let used_bits = self.u8(what)?;
                let pause_ms = self.u16(what)?;
                let len = self.u24(what)?;
                TzxBlock::PureData {
                    zero_pulse,
                    one_pulse,
                    used_bits,
                    pause_ms,
                    data: self.bytes(len, "pure data")?,
                }
            }
            0x15 => {
                let what = "direct recording header";
                let sample = self.u16(what)?;
                let pause_ms = self.u16(what)?;
                let used_bits = self.u8(what)?;
                let len = self.u24(what)?;
                TzxBlock::DirectRecording {
                    sample,
                    pause_ms,
                    used_bits,
                    data: self.bytes(len, "direct recording data")?,
                }
            }
            0x20 => TzxBlock::Pause(self.u16("pause")?),
            0x21 => {
                let len = usize::from(self.u8("group name")?);
                let name = self.take(len, "group name")?;
                TzxBlock::GroupStart(String::from_utf8_lossy(name).into_owned())
            }
            0x22 => TzxBlock::GroupEnd,
            0x24 => TzxBlock::LoopStart(self.u16("loop start")?),
            0x25 => TzxBlock::LoopEnd,
            0x2A => {
                self.skip(4, "stop if 48K")?;
                TzxBlock::StopIf48K
            }
            _ => {
                let len = self.skipped_len(id)?;
                self.skip(len, &format!("block ${id:02X}"))?;
                TzxBlock::Skipped(id)
            }
        })
    }

    /// Length of the rest of a block the simulation ignores.
    fn skipped_len(&mut self, id: u8) -> Result<usize> {
        Ok(match id {
            0x23 => 2,
            0x26 => 2 * usize::from(self.u16("call sequence")?),
            0x27 => 0,
            0x28 | 0x32 => usize::from(self.u16("block length")?),
            0x30 => usize::from(self.u8("text description")?),
            0x31 => {
                self.skip(1, "message")?;
                usize::from(self.u8("message")?)
            }
            0x33 => 3 * usize::from(self.u8("hardware type")?),
            0x35 => {
                self.skip(16, "custom info")?;
                self.u32("custom info")?
            }
            0x5A => 9,
            // 0x18, 0x19, 0x2B and any later block carry a 4-byte length.
            _ => self.u32("block length")?,
        })
    }
}

impl TzxFile {
    /// Parse a TZX file.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 10 || &data[..8] != MAGIC {
            return Err(SimError::invalid("TZX", "bad header"));
        }
        let mut reader = Reader { data, pos: 10 };
        let mut blocks = Vec::new();
        while reader.pos < data.len() {
            let id = reader.u8("block id")?;
            let block = reader.block(id)?;
            match block {
                TzxBlock::Skipped(id @ (0x2B | 0x30..=0x35 | 0x5A)) => debug!("skipping TZX block ${id:02X}"),
                TzxBlock::Skipped(id) => warn!("unsupported TZX block ${id:02X} skipped"),
                _ => {}
            }
            blocks.push(block);
        }
        Ok(Self {
            major: data[8],
            minor: data[9],
            blocks,
        })
    }

    /// The tape's signal as played on `model`, with loops expanded.
    #[must_use]
    pub fn segments(&self, model: SpectrumModel) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut loops: Vec<(usize, u16)> = Vec::new();
        for block in &self.blocks {
            match block {
                TzxBlock::StandardSpeed { pause_ms, data } => {
                    segments.extend(Segment::standard_block(data.clone(), u32::from(*pause_ms)));
                }
                TzxBlock::TurboSpeed {
                    pilot_pulse,
                    sync1,
                    sync2,
                    zero_pulse,
                    one_pulse,
                    pilot_count,
                    used_bits,
                    pause_ms,
                    data,
                } => {
                    segments.push(Segment::Tone {
                        pulse: u32::from(*pilot_pulse),
                        count: u32::from(*pilot_count),
                    });
                    segments.push(Segment::Pulses(vec![u32::from(*sync1), u32::from(*sync2)]));
                    segments.push(Segment::Data {
                        zero: u32::from(*zero_pulse),
                        one: u32::from(*one_pulse),
                        used_bits: *used_bits,
                        bytes: data.clone(),
                    });
                    push_pause(&mut segments, *pause_ms);
                }
                TzxBlock::PureTone { pulse_len, count } => segments.push(Segment::Tone {
                    pulse: u32::from(*pulse_len),
                    count: u32::from(*count),
                }),
                TzxBlock::PulseSequence(pulses) => {
                    segments.push(Segment::Pulses(pulses.iter().copied().map(u32::from).collect()));
                }
                TzxBlock::PureData {
                    zero_pulse,
                    one_pulse,
                    used_bits,
                    pause_ms,
                    data,
                } => {
                    segments.push(Segment::Data {
                        zero: u32::from(*zero_pulse),
                        one: u32::from(*one_pulse),
                        used_bits: *used_bits,
                        bytes: data.clone(),
                    });
                    push_pause(&mut segments, *pause_ms);
                }
                TzxBlock::DirectRecording {
                    sample,
                    pause_ms,
                    used_bits,
                    data,
                } => {
                    segments.push(Segment::Direct {
                        sample: u32::from(*sample),
                        used_bits: *used_bits,
                        bytes: data.clone(),
                    });
                    push_pause(&mut segments, *pause_ms);
                }
                TzxBlock::Pause(0) => segments.push(Segment::Stop),
                TzxBlock::Pause(ms) => segments.push(Segment::Pause(u32::from(*ms))),
                TzxBlock::StopIf48K if model == SpectrumModel::Spectrum48K => segments.push(Segment::Stop),
                TzxBlock::LoopStart(count) => loops.push((segments.len(), *count)),
                TzxBlock::LoopEnd => match loops.pop() {
                    Some((start, count)) => {
                        let body = segments[start..].to_vec();
                        for _ in 1..count {
                            segments.extend_from_slice(&body);
                        }
                    }
                    None => warn!("TZX loop end without a loop start"),
                },
                TzxBlock::StopIf48K | TzxBlock::GroupStart(_) | TzxBlock::GroupEnd | TzxBlock::Skipped(_) => {}
            }
        }
        segments
    }
}

fn push_pause(segments: &mut Vec<Segment>, pause_ms: u16) {
    if pause_ms > 0 {
        segments.push(Segment::Pause(u32::from(pause_ms)));
    }
}
