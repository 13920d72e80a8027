//! Tape signal timeline.
//!
//! Tape containers describe their contents as [`Segment`]s (pilot tones,
//! sync pulses, data bits, pauses). [`Timeline::build`] lays those out as
//! a list of edge times: every pulse ends with an edge that toggles the EAR
//! level, which starts low. The timeline also records where each logical
//! block's pilot, sync and data begin so the tape driver can report
//! progress and fast-load data.

use log::debug;

/// Standard ROM loader timings, in T-states.
pub const PILOT_PULSE: u32 = 2168;
pub const SYNC1_PULSE: u32 = 667;
pub const SYNC2_PULSE: u32 = 735;
pub const ZERO_PULSE: u32 = 855;
pub const ONE_PULSE: u32 = 1710;
pub const HEADER_PILOT_COUNT: u32 = 8063;
pub const DATA_PILOT_COUNT: u32 = 3223;

/// T-states per millisecond of tape time.
pub const MS: u64 = 3500;

/// One piece of a tape's signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A pilot tone: `count` pulses of equal length.
    Tone { pulse: u32, count: u32 },
    /// Sync pulses, or any other explicit pulse sequence.
    Pulses(Vec<u32>),
    /// Data bits, MSB first, two pulses per bit. Only `used_bits` of the
    /// last byte are played.
    Data {
        zero: u32,
        one: u32,
        used_bits: u8,
        bytes: Vec<u8>,
    },
    /// Sampled levels (one bit per sample, MSB first, 1 = high).
    Direct {
        sample: u32,
        used_bits: u8,
        bytes: Vec<u8>,
    },
    /// Silence, in milliseconds.
    Pause(u32),
    /// The tape stops until the loader reads the port again.
    Stop,
}

impl Segment {
    /// The segments of a block written with standard ROM timings.
    #[must_use]
    pub fn standard_block(bytes: Vec<u8>, pause_ms: u32) -> Vec<Self> {
        let pilot_count = match bytes.first() {
            Some(&flag) if flag < 0x80 => HEADER_PILOT_COUNT,
            _ => DATA_PILOT_COUNT,
        };
        let mut segments = vec![
            Self::Tone {
                pulse: PILOT_PULSE,
                count: pilot_count,
            },
            Self::Pulses(vec![SYNC1_PULSE, SYNC2_PULSE]),
            Self::Data {
                zero: ZERO_PULSE,
                one: ONE_PULSE,
                used_bits: 8,
                bytes,
            },
        ];
        if pause_ms > 0 {
            segments.push(Self::Pause(pause_ms));
        }
        segments
    }
}

/// Where a block's data sits on the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSpan {
    /// Index of the edge just before the first data edge.
    pub start: usize,
    pub bytes: Vec<u8>,
}

impl DataSpan {
    /// Index of the byte whose first edge follows edge `edge`, if `edge`
    /// is a byte boundary.
    #[must_use]
    pub fn byte_after(&self, edge: usize) -> Option<usize> {
        let offset = edge.checked_sub(self.start)?;
        (offset % 16 == 0).then_some(offset / 16)
    }

    /// A 19-byte block with flag 0.
    #[must_use]
    pub fn is_header(&self) -> bool {
        self.bytes.len() == 19 && self.bytes[0] == 0
    }

    /// A standard header's type and name, e.g. `("Bytes", "screen")`.
    #[must_use]
    pub fn header(&self) -> Option<(&'static str, String)> {
        if !self.is_header() {
            return None;
        }
        let kind = match self.bytes[1] {
            0 => "Program",
            1 => "Number array",
            2 => "Character array",
            3 => "Bytes",
            _ => return None,
        };
        let name: String = self.bytes[2..12].iter().map(|&b| char::from(b)).collect();
        Some((kind, name.trim_end().to_string()))
    }
}

/// A logical block: pilot, sync and data played without a pause between.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSpan {
    /// Tape time at which the block begins.
    pub start: u64,
    /// Tape time of the block's last edge.
    pub end: u64,
    /// Index of the first pilot edge (the block's leading edge, if any).
    pub pilot: Option<usize>,
    /// Index of the first sync edge.
    pub sync: Option<usize>,
    pub data: Option<DataSpan>,
    /// Index of the block's last edge.
    pub last_edge: usize,
    /// The tape stops after this block.
    pub stop: bool,
}

/// Something that happens as the tape plays past an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeEvent {
    PilotStart(usize),
    SyncStart(usize),
    BlockEnd(usize),
    Finished,
}

/// Edge times of a whole tape.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub edges: Vec<u64>,
    pub blocks: Vec<BlockSpan>,
    /// Events keyed by the index of the edge that triggers them, in order.
    pub markers: Vec<(usize, TapeEvent)>,
}

struct Builder {
    timeline: Timeline,
    time: u64,
    /// The next segment starts with an edge of its own.
    leading_edge: bool,
    open: Option<BlockSpan>,
}

impl Builder {
    fn level_high(&self) -> bool {
        self.timeline.edges.len() % 2 == 1
    }

    fn edge(&mut self) {
        self.timeline.edges.push(self.time);
    }

    fn pulse(&mut self, len: u32) {
        self.time += u64::from(len);
        self.edge();
    }

    /// The open block, starting one (with its leading edge) if needed.
    fn block(&mut self) -> &mut BlockSpan {
        if self.open.is_none() && self.leading_edge {
            self.edge();
            self.leading_edge = false;
        }
        let start = self.time;
        self.open.get_or_insert_with(|| BlockSpan {
            start,
            ..BlockSpan::default()
        })
    }

    fn close_data_block(&mut self) {
        if self.open.as_ref().is_some_and(|b| b.data.is_some()) {
            self.close();
        }
    }

    fn close(&mut self) {
        if let Some(mut block) = self.open.take() {
            block.end = self.time;
            block.last_edge = self.timeline.edges.len().saturating_sub(1);
            self.timeline.blocks.push(block);
        }
    }

    fn add(&mut self, segment: &Segment) {
        match segment {
            Segment::Tone { pulse, count } => {
                self.close_data_block();
                let first = self.timeline.edges.len();
                self.block().pilot.get_or_insert(first);
                for _ in 0..*count {
                    self.pulse(*pulse);
                }
            }
            Segment::Pulses(pulses) => {
                self.close_data_block();
                let first = self.timeline.edges.len();
                self.block().sync.get_or_insert(first);
                for &len in pulses {
                    self.pulse(len);
                }
            }
            Segment::Data {
                zero,
                one,
                used_bits,
                bytes,
            } => {
                self.block();
                let start = self.timeline.edges.len().saturating_sub(1);
                for (i, &byte) in bytes.iter().enumerate() {
                    let bits = if i + 1 == bytes.len() { (*used_bits).clamp(1, 8) } else { 8 };
                    for bit in 0..bits {
                        let len = if byte & (0x80 >> bit) != 0 { *one } else { *zero };
                        self.pulse(len);
                        self.pulse(len);
                    }
                }
                if let Some(block) = &mut self.open {
                    block.data = Some(DataSpan {
                        start,
                        bytes: bytes.clone(),
                    });
                }
                self.close();
            }
            Segment::Direct {
                sample,
                used_bits,
                bytes,
            } => {
                self.block();
                for (i, &byte) in bytes.iter().enumerate() {
                    let bits = if i + 1 == bytes.len() { (*used_bits).clamp(1, 8) } else { 8 };
                    for bit in 0..bits {
                        if (byte & (0x80 >> bit) != 0) != self.level_high() {
                            self.edge();
                        }
                        self.time += u64::from(*sample);
                    }
                }
            }
            Segment::Pause(ms) => {
                self.close();
                if self.level_high() {
                    self.time += MS;
                    self.edge();
                    self.time += u64::from(*ms) * MS - MS;
                } else {
                    self.time += u64::from(*ms) * MS;
                }
                self.leading_edge = true;
            }
            Segment::Stop => {
                self.close();
                if let Some(block) = self.timeline.blocks.last_mut() {
                    block.stop = true;
                }
                self.leading_edge = true;
            }
        }
    }
}

impl Timeline {
    /// Lay out `segments`, with the first block's leading edge at tape time
    /// `first_edge`.
    #[must_use]
    pub fn build(segments: &[Segment], first_edge: u64) -> Self {
        let mut builder = Builder {
            timeline: Self::default(),
            time: first_edge,
            leading_edge: true,
            open: None,
        };
        for segment in segments {
            builder.add(segment);
        }
        builder.close();

        let mut timeline = builder.timeline;
        let mut markers = Vec::new();
        for (i, block) in timeline.blocks.iter().enumerate() {
            if let Some(edge) = block.pilot {
                markers.push((edge, TapeEvent::PilotStart(i)));
            }
            if let Some(edge) = block.sync {
                markers.push((edge, TapeEvent::SyncStart(i)));
            }
            markers.push((block.last_edge, TapeEvent::BlockEnd(i)));
        }
        markers.push((timeline.edges.len().saturating_sub(1), TapeEvent::Finished));
        markers.sort_by_key(|&(edge, _)| edge);
        timeline.markers = markers;
        debug!(
            "tape timeline: {} block(s), {} edge(s), {} T-states",
            timeline.blocks.len(),
            timeline.edges.len(),
            timeline.edges.last().copied().unwrap_or(0)
        );
        timeline
    }

    /// The block and byte index of data whose first edge follows edge
    /// `edge`.
    #[must_use]
    pub fn data_byte_after(&self, edge: usize) -> Option<(usize, usize)> {
        self.blocks.iter().enumerate().find_map(|(i, block)| {
            let data = block.data.as_ref()?;
            if edge < data.start || edge >= block.last_edge {
                return None;
            }
            data.byte_after(edge).map(|k| (i, k))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_block_layout() {
        let timeline = Timeline::build(&Segment::standard_block(vec![0xFF, 0x80, 0x7F], 1000), 0);
        // Leading edge, pilot, two sync pulses, 24 bits of data.
        assert_eq!(timeline.edges.len(), 1 + 3223 + 2 + 48);
        assert_eq!(timeline.edges[0], 0);
        assert_eq!(timeline.edges[1], 2168);

        let block = &timeline.blocks[0];
        assert_eq!(block.pilot, Some(0));
        assert_eq!(block.sync, Some(3224));
        let data = block.data.as_ref().unwrap();
        assert_eq!(data.start, 3225);
        assert_eq!(block.last_edge, 3225 + 48);
        assert_eq!(block.end, timeline.edges[block.last_edge]);

        // $FF flag: eight one bits.
        let t = timeline.edges[data.start];
        assert_eq!(timeline.edges[data.start + 2], t + 2 * 1710);
        assert_eq!(timeline.edges[data.start + 16], t + 16 * 1710);

        // $80: a one bit then seven zero bits.
        let t = timeline.edges[data.start + 16];
        assert_eq!(timeline.edges[data.start + 18], t + 2 * 1710);
        assert_eq!(timeline.edges[data.start + 20], t + 2 * 1710 + 2 * 855);
        assert_eq!(timeline.edges[data.start + 32], t + 2 * 1710 + 14 * 855);
    }

    #[test]
    fn header_pilot_is_longer() {
        let timeline = Timeline::build(&Segment::standard_block(vec![0x00; 19], 0), 0);
        assert_eq!(timeline.blocks[0].sync, Some(1 + 8063));
    }

    #[test]
    fn pause_drops_a_high_level() {
        // One pilot pulse after the leading edge leaves the level low; a
        // second leaves it high.
        let segments = [
            Segment::Tone { pulse: 100, count: 2 },
            Segment::Pause(2),
            Segment::Tone { pulse: 100, count: 1 },
        ];
        let timeline = Timeline::build(&segments, 50);
        assert_eq!(timeline.edges, [50, 150, 250, 250 + MS, 250 + 2 * MS, 250 + 2 * MS + 100]);
        assert_eq!(timeline.blocks.len(), 2);
        assert_eq!(timeline.blocks[1].start, 250 + 2 * MS);
    }

    #[test]
    fn separate_tone_sync_and_data_form_one_block() {
        let segments = [
            Segment::Tone { pulse: 2168, count: 10 },
            Segment::Pulses(vec![667, 735]),
            Segment::Data {
                zero: 855,
                one: 1710,
                used_bits: 8,
                bytes: vec![1, 2],
            },
            Segment::Tone { pulse: 2168, count: 10 },
        ];
        let timeline = Timeline::build(&segments, 0);
        assert_eq!(timeline.blocks.len(), 2);
        assert!(timeline.blocks[0].data.is_some());
        assert_eq!(timeline.blocks[1].pilot, Some(timeline.blocks[0].last_edge + 1));
    }

    #[test]
    fn used_bits_trim_the_last_byte() {
        let segments = [Segment::Data {
            zero: 855,
            one: 1710,
            used_bits: 3,
            bytes: vec![0xFF, 0xFF],
        }];
        let timeline = Timeline::build(&segments, 0);
        assert_eq!(timeline.edges.len(), 1 + 16 + 6);
    }

    #[test]
    fn direct_recording_edges_on_level_changes() {
        let segments = [Segment::Direct {
            sample: 10,
            used_bits: 8,
            bytes: vec![0b1100_0110],
        }];
        let timeline = Timeline::build(&segments, 0);
        // Leading edge (high), then low at 20, high at 50, low at 70.
        assert_eq!(timeline.edges, [0, 20, 50, 70]);
    }

    #[test]
    fn byte_boundaries() {
        let timeline = Timeline::build(&Segment::standard_block(vec![0xFF, 1, 2, 3], 0), 0);
        let start = timeline.blocks[0].data.as_ref().unwrap().start;
        assert_eq!(timeline.data_byte_after(start + 16), Some((0, 1)));
        assert_eq!(timeline.data_byte_after(start + 17), None);
        assert_eq!(timeline.data_byte_after(start - 1), None);
    }

    #[test]
    fn header_names() {
        let mut bytes = vec![0, 3];
        bytes.extend_from_slice(b"simloadbyt");
        bytes.extend_from_slice(&[0; 7]);
        let span = DataSpan { start: 0, bytes };
        assert_eq!(span.header(), Some(("Bytes", "simloadbyt".to_string())));
    }

    #[test]
    fn markers_in_edge_order() {
        let timeline = Timeline::build(&Segment::standard_block(vec![0xFF, 1], 0), 0);
        let events: Vec<TapeEvent> = timeline.markers.iter().map(|&(_, e)| e).collect();
        assert_eq!(
            events,
            [
                TapeEvent::PilotStart(0),
                TapeEvent::SyncStart(0),
                TapeEvent::BlockEnd(0),
                TapeEvent::Finished
            ]
        );
    }
}
