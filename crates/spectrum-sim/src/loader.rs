//! Tape-load simulation.
//!
//! Runs a Spectrum against a [`LiveTape`] until the loader is done with
//! the tape. Two shortcuts keep long tapes fast without changing what the
//! loader sees:
//!
//! - *fast load*: when a recognised edge-sampling loop is waiting for the
//!   first bit of a byte, the rest of the block's data is copied straight
//!   into memory and the loader's registers are advanced as if it had read
//!   the bytes itself;
//! - *edge acceleration*: while such a loop waits for an edge, whole
//!   iterations are skipped up to the one that will see it.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::path::Path;

use log::{debug, info};

use crate::accelerator::Accelerator;
use crate::config::{LoadOptions, SpectrumModel, read_file};
use crate::error::{Result, SimError};
use crate::pulses::{Segment, TapeEvent, Timeline};
use crate::snapshot::extension_of;
use crate::spectrum::Spectrum;
use crate::tap::TapFile;
use crate::tape::LiveTape;
use crate::tzx::TzxFile;

/// T-states the simulation keeps running after the tape has finished.
const AFTER_TAPE: u64 = 3_500_000;

/// `IN A,(n)`
const IN_A_N: u8 = 0xDB;

/// Why a load simulation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TimedOut,
    EndOfTape,
    PcInRam,
    TapeEnded,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TimedOut => "timed out",
            Self::EndOfTape => "end of tape",
            Self::PcInRam => "PC in RAM",
            Self::TapeEnded => "tape ended 1 second ago",
        })
    }
}

/// Read a TAP or TZX file into signal segments.
pub fn read_tape(path: &Path, model: SpectrumModel) -> Result<Vec<Segment>> {
    let data = read_file(path)?;
    match extension_of(path).as_str() {
        "tap" => Ok(TapFile::parse(&data)?.segments()),
        "tzx" => Ok(TzxFile::parse(&data)?.segments(model)),
        ext => Err(SimError::UnknownFileType(ext.to_string())),
    }
}

/// A tape-load simulation in progress.
pub struct LoadSimulation {
    spectrum: Spectrum<LiveTape>,
    options: LoadOptions,
    finish_clock: Option<u64>,
    stop: Option<StopReason>,
    /// Milestones of the current block, shown unless it is fast loaded.
    pending: Vec<&'static str>,
    fast_loaded: BTreeSet<usize>,
}

impl LoadSimulation {
    #[must_use]
    pub fn new(spectrum: Spectrum<LiveTape>, options: LoadOptions) -> Self {
        Self {
            spectrum,
            options,
            finish_clock: None,
            stop: None,
            pending: Vec::new(),
            fast_loaded: BTreeSet::new(),
        }
    }

    /// A tape built from `segments` for a machine, with the deck paused
    /// at its start.
    #[must_use]
    pub fn tape(segments: &[Segment], options: &LoadOptions) -> LiveTape {
        LiveTape::new(Timeline::build(segments, options.first_edge), options.pause)
    }

    #[must_use]
    pub fn spectrum(&self) -> &Spectrum<LiveTape> {
        &self.spectrum
    }

    pub fn spectrum_mut(&mut self) -> &mut Spectrum<LiveTape> {
        &mut self.spectrum
    }

    /// Run until a stop condition holds, reporting tape milestones to
    /// `out`.
    pub fn run(&mut self, out: &mut impl Write) -> Result<StopReason> {
        let reason = loop {
            if let Some(reason) = self.check_stop() {
                break reason;
            }
            let clock = self.spectrum.cpu().tstates();
            let model = self.spectrum.model();
            if clock % model.frame_duration() < model.int_active() && self.spectrum.accept_interrupt().is_some() {
                continue;
            }
            self.spectrum.ports_mut().update(clock);
            if !self.accelerate(out)? {
                let in_n = self.spectrum.peek(self.spectrum.regs().pc) == IN_A_N;
                self.spectrum.ports_mut().begin_instruction(in_n);
                self.spectrum.step()?;
                let clock = self.spectrum.cpu().tstates();
                self.spectrum.ports_mut().update(clock);
            }
            self.report(out)?;
        };
        writeln!(out, "Simulation stopped ({reason}): PC={}", self.spectrum.regs().pc)?;
        Ok(reason)
    }

    fn check_stop(&mut self) -> Option<StopReason> {
        let clock = self.spectrum.cpu().tstates();
        if clock >= self.options.timeout {
            return Some(StopReason::TimedOut);
        }
        if let Some(reason) = self.stop.take() {
            return Some(reason);
        }
        let finish = self.finish_clock?;
        if self.spectrum.regs().pc >= 0x4000 {
            Some(StopReason::PcInRam)
        } else if clock >= finish + AFTER_TAPE {
            Some(StopReason::TapeEnded)
        } else {
            None
        }
    }

    /// Try each accelerator at PC. True if the simulation moved on without
    /// executing an instruction.
    fn accelerate(&mut self, out: &mut impl Write) -> Result<bool> {
        let pc = self.spectrum.regs().pc;
        let Some(profile) = self
            .options
            .accelerators
            .iter()
            .copied()
            .find(|a| a.matches(|addr| self.spectrum.peek(addr), pc))
        else {
            return Ok(false);
        };
        if self.options.fast_load && self.fast_load(profile, out)? {
            return Ok(true);
        }
        Ok(self.skip_iterations(profile))
    }

    /// Copy the rest of a data block into memory when the tape sits on a
    /// byte boundary past the flag byte.
    fn fast_load(&mut self, profile: &Accelerator, out: &mut impl Write) -> Result<bool> {
        let tape = self.spectrum.ports();
        let pos = tape.position();
        if !tape.running() || pos == 0 {
            return Ok(false);
        }
        let Some((block, k)) = tape.timeline().data_byte_after(pos - 1) else {
            return Ok(false);
        };
        let Some(data) = tape.timeline().blocks[block].data.as_ref() else {
            return Ok(false);
        };
        let len = data.bytes.len();
        if k == 0 || k + 1 >= len {
            return Ok(false);
        }
        let regs = self.spectrum.regs();
        let (ix, de) = (regs.ix, regs.de());
        let count = usize::from(de).min(len - 1 - k);
        if count == 0 {
            return Ok(false);
        }
        let bytes = data.bytes[k..k + count].to_vec();
        let header = data.is_header();
        let new_pos = pos + 16 * count;
        let (Some(from), Some(to)) = (tape.edge_time(pos - 1), tape.edge_time(new_pos - 1)) else {
            return Ok(false);
        };
        if self.spectrum.cpu().tstates() + (to - from) > self.options.timeout {
            return Ok(false);
        }

        if !header {
            writeln!(out, "Fast loading data block: {ix},{de}")?;
        }
        info!("fast loaded {count} byte(s) of block {block} at {ix}");

        let mut checksum = 0;
        for (i, &byte) in bytes.iter().enumerate() {
            self.spectrum.poke(ix.wrapping_add(i as u16), byte);
            checksum ^= byte;
        }
        let elapsed = to - from;
        let regs = self.spectrum.regs_mut();
        regs.ix = ix.wrapping_add(count as u16);
        regs.set_de(de.wrapping_sub(count as u16));
        regs.h ^= checksum;
        let cpu = self.spectrum.cpu_mut();
        cpu.add_tstates(elapsed);
        cpu.add_r((elapsed / profile.loop_time) as u32 * profile.r_inc);
        self.spectrum.ports_mut().skip_to(new_pos);
        self.fast_loaded.insert(block);
        Ok(true)
    }

    /// Skip loop iterations that cannot see an edge yet.
    fn skip_iterations(&mut self, profile: &Accelerator) -> bool {
        let tape = self.spectrum.ports();
        if tape.last_read() != Some(tape.position()) {
            return false;
        }
        if !profile.keeps_waiting(tape.ear_level(), self.spectrum.regs().c) {
            return false;
        }
        let clock = self.spectrum.cpu().tstates();
        let b = self.spectrum.regs().b;
        let limit = profile.counter_limit(b);
        let wanted = match tape.next_edge_clock() {
            Some(edge) => {
                let wait = edge.saturating_sub(clock + profile.in_time);
                wait.div_ceil(profile.loop_time)
            }
            None => limit,
        };
        let budget = self.options.timeout.saturating_sub(clock) / profile.loop_time;
        let n = wanted.min(limit).min(budget);
        if n == 0 {
            return false;
        }
        debug!("skipping {n} iteration(s) of {} at {clock}", profile.name);
        let regs = self.spectrum.regs_mut();
        regs.b = profile.advance_counter(b, n);
        let cpu = self.spectrum.cpu_mut();
        cpu.add_tstates(n * profile.loop_time);
        cpu.add_r(n as u32 * profile.r_inc);
        true
    }

    fn report(&mut self, out: &mut impl Write) -> Result<()> {
        for event in self.spectrum.ports_mut().drain_events() {
            match event {
                TapeEvent::PilotStart(_) => self.pending.push("Pilot tone"),
                TapeEvent::SyncStart(_) => self.pending.push("Sync pulses"),
                TapeEvent::BlockEnd(block) => self.end_block(block, out)?,
                TapeEvent::Finished => {
                    writeln!(out, "Tape finished")?;
                    self.finish_clock = Some(self.spectrum.cpu().tstates());
                    if self.spectrum.regs().pc >= 0x4000 {
                        self.stop = Some(StopReason::EndOfTape);
                    }
                }
            }
        }
        Ok(())
    }

    fn end_block(&mut self, block: usize, out: &mut impl Write) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        let data = self.spectrum.ports().timeline().blocks[block].data.as_ref();
        if let Some((kind, name)) = data.and_then(|d| d.header()) {
            writeln!(out, "{kind}: {name}")?;
        } else if self.fast_loaded.contains(&block) {
            writeln!(out)?;
        } else if data.is_some() || !pending.is_empty() {
            for line in pending {
                writeln!(out, "{line}")?;
            }
            if let Some(data) = data {
                writeln!(out, "Data ({} bytes)", data.bytes.len())?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}
