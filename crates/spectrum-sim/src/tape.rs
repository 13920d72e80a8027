//! The tape deck as seen through port `$FE`.
//!
//! [`LiveTape`] plays a [`Timeline`] against the CPU clock. Tape time runs
//! while the deck is playing and freezes while it is paused; the deck
//! starts paused and plays from the first `IN A,(n)` read of an even port,
//! which is how a loader announces it is listening.

use log::debug;

use crate::error::Result;
use crate::port::PortSource;
use crate::pulses::{TapeEvent, Timeline};

/// Port `$FE` with the EAR bit high and no keys pressed.
const EAR_HIGH: u8 = 0xFF;
const EAR_LOW: u8 = 0xBF;

/// A tape playing into the EAR bit.
#[derive(Debug)]
pub struct LiveTape {
    timeline: Timeline,
    /// Edges already passed; odd means the signal is high.
    pos: usize,
    /// Tape time is `clock - shift` while playing.
    shift: u64,
    running: bool,
    paused_at: u64,
    /// Pause after every block that has a successor.
    pause_between_blocks: bool,
    /// Next block whose end may pause the tape.
    next_stop: usize,
    next_marker: usize,
    /// The instruction being executed is `IN A,(n)`.
    in_n: bool,
    last_read: Option<usize>,
    events: Vec<TapeEvent>,
}

impl LiveTape {
    #[must_use]
    pub fn new(timeline: Timeline, pause_between_blocks: bool) -> Self {
        Self {
            timeline,
            pos: 0,
            shift: 0,
            running: false,
            paused_at: 0,
            pause_between_blocks,
            next_stop: 0,
            next_marker: 0,
            in_n: false,
            last_read: None,
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Number of edges already played.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn finished(&self) -> bool {
        self.pos >= self.timeline.edges.len()
    }

    /// Edge position sampled by the most recent port read.
    #[must_use]
    pub fn last_read(&self) -> Option<usize> {
        self.last_read
    }

    /// Value port $FE reads at the current position.
    #[must_use]
    pub fn ear_level(&self) -> u8 {
        if self.pos % 2 == 1 { EAR_HIGH } else { EAR_LOW }
    }

    /// Tell the deck whether the next instruction is `IN A,(n)`.
    pub fn begin_instruction(&mut self, in_n: bool) {
        self.in_n = in_n;
    }

    /// Tape time of edge `index`.
    #[must_use]
    pub fn edge_time(&self, index: usize) -> Option<u64> {
        self.timeline.edges.get(index).copied()
    }

    /// CPU clock at which the next edge arrives, if the tape is playing.
    #[must_use]
    pub fn next_edge_clock(&self) -> Option<u64> {
        if !self.running {
            return None;
        }
        self.edge_time(self.pos).map(|t| t + self.shift)
    }

    /// Play the tape up to CPU clock `clock`.
    pub fn update(&mut self, clock: u64) {
        if self.running {
            let time = clock.saturating_sub(self.shift);
            if !self.reach_stop(time) {
                self.advance(time);
            }
        }
        self.fire_markers();
    }

    /// Jump over edges, e.g. after data has been copied straight to memory.
    pub fn skip_to(&mut self, pos: usize) {
        self.pos = pos.min(self.timeline.edges.len());
        self.fire_markers();
    }

    pub fn drain_events(&mut self) -> Vec<TapeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Pause at the end of the current block if tape time has passed it.
    fn reach_stop(&mut self, time: u64) -> bool {
        let blocks = &self.timeline.blocks;
        while let Some(block) = blocks.get(self.next_stop) {
            if time < block.end {
                return false;
            }
            self.next_stop += 1;
            let has_next = self.next_stop < blocks.len();
            if block.stop || (self.pause_between_blocks && has_next) {
                let end = block.end;
                self.pos = self.pos.max(block.last_edge + 1);
                self.running = false;
                self.paused_at = end;
                debug!("tape paused at {end}");
                return true;
            }
        }
        false
    }

    fn advance(&mut self, time: u64) {
        let edges = &self.timeline.edges;
        while self.pos < edges.len() && edges[self.pos] <= time {
            self.pos += 1;
        }
    }

    fn fire_markers(&mut self) {
        let finished = self.finished();
        while let Some(&(edge, event)) = self.timeline.markers.get(self.next_marker) {
            if edge >= self.pos && !finished {
                break;
            }
            self.events.push(event);
            self.next_marker += 1;
        }
    }
}

impl PortSource for LiveTape {
    fn read_port(&mut self, port: u16, clock: u64) -> Result<u8> {
        if port & 0x0001 != 0 {
            return Ok(0xFF);
        }
        if !self.running && self.in_n && !self.finished() {
            self.running = true;
            self.shift = clock.saturating_sub(self.paused_at);
            debug!("tape playing from {} at clock {clock}", self.paused_at);
        }
        self.update(clock);
        self.last_read = Some(self.pos);
        Ok(self.ear_level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulses::Segment;

    fn tape(segments: &[Segment], pause: bool) -> LiveTape {
        LiveTape::new(Timeline::build(segments, 0), pause)
    }

    fn read_in_n(tape: &mut LiveTape, clock: u64) -> u8 {
        tape.begin_instruction(true);
        tape.read_port(0xFE, clock).unwrap()
    }

    #[test]
    fn starts_paused_until_in_a_n() {
        let mut tape = tape(&[Segment::Tone { pulse: 100, count: 4 }], false);
        tape.begin_instruction(false);
        assert_eq!(tape.read_port(0xFE, 1000).unwrap(), EAR_LOW);
        assert!(!tape.running());

        // Tape time 0 maps to clock 2000; the leading edge is at 0.
        assert_eq!(read_in_n(&mut tape, 2000), EAR_HIGH);
        assert!(tape.running());
        assert_eq!(tape.next_edge_clock(), Some(2100));
        assert_eq!(read_in_n(&mut tape, 2099), EAR_HIGH);
        assert_eq!(read_in_n(&mut tape, 2100), EAR_LOW);
        assert_eq!(tape.last_read(), Some(2));
    }

    #[test]
    fn odd_ports_float() {
        let mut tape = tape(&[Segment::Tone { pulse: 100, count: 4 }], false);
        tape.begin_instruction(true);
        assert_eq!(tape.read_port(0x00FF, 0).unwrap(), 0xFF);
        assert!(!tape.running());
    }

    #[test]
    fn pauses_between_blocks() {
        let segments = [
            Segment::Tone { pulse: 100, count: 2 },
            Segment::Pause(1),
            Segment::Tone { pulse: 100, count: 2 },
        ];
        let mut tape = tape(&segments, true);
        read_in_n(&mut tape, 0);
        tape.update(10_000);
        assert!(!tape.running());
        // Leading edge and two pulses, but not the pause's falling edge.
        assert_eq!(tape.position(), 3);
        assert_eq!(tape.next_edge_clock(), None);

        // Plays again from the block end, so the pause comes first.
        read_in_n(&mut tape, 50_000);
        // The falling edge lands 1 ms after the block end.
        assert_eq!(tape.next_edge_clock(), Some(53_500));
        tape.update(60_000);
        assert!(tape.finished());
    }

    #[test]
    fn plays_through_without_pauses() {
        let segments = [
            Segment::Tone { pulse: 100, count: 2 },
            Segment::Pause(1),
            Segment::Tone { pulse: 100, count: 2 },
        ];
        let mut tape = tape(&segments, false);
        read_in_n(&mut tape, 0);
        tape.update(10_000);
        assert!(tape.running());
        assert!(tape.finished());
    }

    #[test]
    fn stop_blocks_always_stop() {
        let segments = [
            Segment::Tone { pulse: 100, count: 2 },
            Segment::Stop,
            Segment::Tone { pulse: 100, count: 2 },
        ];
        let mut tape = tape(&segments, false);
        read_in_n(&mut tape, 0);
        tape.update(10_000);
        assert!(!tape.running());
        assert!(!tape.finished());
    }

    #[test]
    fn events_follow_the_signal() {
        let mut tape = tape(&Segment::standard_block(vec![0xFF, 0x00], 0), false);
        read_in_n(&mut tape, 0);
        assert_eq!(tape.drain_events(), [TapeEvent::PilotStart(0)]);
        tape.update(3223 * 2168 + 667);
        assert_eq!(tape.drain_events(), [TapeEvent::SyncStart(0)]);
        let data_start = tape.timeline().blocks[0].data.as_ref().unwrap().start;
        tape.skip_to(data_start + 32);
        assert_eq!(tape.drain_events(), []);
        tape.update(u64::MAX / 2);
        assert_eq!(tape.drain_events(), [TapeEvent::BlockEnd(0), TapeEvent::Finished]);
    }

    #[test]
    fn empty_tape_is_finished() {
        let mut tape = tape(&[], true);
        tape.update(0);
        assert!(tape.finished());
        assert_eq!(tape.drain_events(), [TapeEvent::Finished]);
    }
}
