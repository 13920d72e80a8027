//! RZX playback.
//!
//! Replays input recordings against the snapshot that precedes them. Each
//! frame runs until its recorded opcode-fetch count is used up, consuming
//! exactly the port readings recorded for it; any mismatch is a desync and
//! ends playback with an error naming the frame.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use log::{debug, info};
use zilog_z80::PF;

use crate::config::{PlayerOptions, RomSet};
use crate::error::{Result, SimError};
use crate::port::RecordedPorts;
use crate::rzx::{self, Block, BlockBody, Frame, InputRecording, RzxFile, SnapshotBlock};
use crate::snapshot::{self, Snapshot, SnapshotFormat};
use crate::spectrum::Spectrum;

const LD_A_I: u16 = 0xED57;
const LD_A_R: u16 = 0xED5F;

/// What playback writes when it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Snapshot(SnapshotFormat),
    Rzx,
}

impl Output {
    /// Output kind for a file name. SNA is not a valid target.
    pub fn for_path(path: &Path) -> Result<Self> {
        let ext = snapshot::extension_of(path);
        match ext.as_str() {
            "z80" => Ok(Self::Snapshot(SnapshotFormat::Z80)),
            "szx" => Ok(Self::Snapshot(SnapshotFormat::Szx)),
            "rzx" => Ok(Self::Rzx),
            _ => Err(SimError::UnknownFileType(ext)),
        }
    }
}

/// RZX frame player.
///
/// `O` receives the progress indicator.
pub struct Player<O: Write> {
    options: PlayerOptions,
    roms: RomSet,
    out: O,
    trace: Option<Box<dyn Write>>,
    exec_map: BTreeSet<u16>,
    snapshot: Option<Snapshot>,
    machine: Option<Spectrum<RecordedPorts>>,
    total_frames: usize,
    frames_played: usize,
    stopped: bool,
    /// Frames of the current recording not yet played when playback stopped.
    unplayed: Vec<Frame>,
    /// Blocks not yet processed when playback stopped.
    remaining: Vec<Block>,
}

impl<O: Write> Player<O> {
    pub fn new(options: PlayerOptions, roms: RomSet, out: O) -> Self {
        Self {
            options,
            roms,
            out,
            trace: None,
            exec_map: BTreeSet::new(),
            snapshot: None,
            machine: None,
            total_frames: 0,
            frames_played: 0,
            stopped: false,
            unplayed: Vec::new(),
            remaining: Vec::new(),
        }
    }

    /// Write one line per executed instruction to `trace`.
    #[must_use]
    pub fn with_trace(mut self, trace: Box<dyn Write>) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Play every input recording in `rzx`.
    ///
    /// `initial` is a snapshot to start from ahead of the file's own blocks.
    pub fn play(&mut self, rzx: RzxFile, initial: Option<Snapshot>) -> Result<()> {
        let last_input = rzx.blocks.iter().rposition(|b| matches!(b.body, BlockBody::Input(_)));
        let blocks: Vec<Block> = rzx
            .blocks
            .into_iter()
            .enumerate()
            .filter(|(i, b)| {
                !matches!(b.body, BlockBody::Snapshot(_)) || last_input.is_some_and(|last| *i < last)
            })
            .map(|(_, b)| b)
            .collect();
        let first = blocks
            .iter()
            .find(|b| matches!(b.body, BlockBody::Snapshot(_) | BlockBody::Input(_)));
        if initial.is_none() && first.is_some_and(|b| matches!(b.body, BlockBody::Input(_))) {
            return Err(SimError::MissingSnapshot);
        }

        let total: usize = blocks
            .iter()
            .map(|b| match &b.body {
                BlockBody::Input(input) => input.frames.len(),
                _ => 0,
            })
            .sum();
        self.total_frames = match self.options.stop {
            Some(stop) if stop > 0 => stop.min(total),
            _ => total,
        };
        debug!("{} block(s), {} frame(s) to play", blocks.len(), self.total_frames);

        if let Some(snapshot) = initial {
            self.use_snapshot(snapshot)?;
        }
        let mut blocks = blocks.into_iter();
        while let Some(block) = blocks.next() {
            match &block.body {
                BlockBody::Snapshot(snapshot) => self.load_snapshot(snapshot)?,
                BlockBody::Input(input) => self.play_recording(input)?,
                _ => {}
            }
            if self.stopped {
                break;
            }
        }
        self.remaining = blocks.collect();
        if let Some(trace) = &mut self.trace {
            trace.flush()?;
        }
        Ok(())
    }

    fn load_snapshot(&mut self, block: &SnapshotBlock) -> Result<()> {
        if block.external {
            return Err(SimError::ExternalSnapshot);
        }
        let format = SnapshotFormat::from_extension(&block.extension)
            .ok_or(SimError::UnsupportedSnapshotType)?;
        self.use_snapshot(snapshot::decode(format, &block.data)?)
    }

    fn use_snapshot(&mut self, snapshot: Snapshot) -> Result<()> {
        if !self.options.force {
            snapshot.check_supported()?;
        }
        debug!("{} snapshot ({})", snapshot.format, snapshot.machine);
        self.snapshot = Some(snapshot);
        self.machine = None;
        Ok(())
    }

    fn play_recording(&mut self, input: &InputRecording) -> Result<()> {
        let mut machine = match self.machine.take() {
            Some(machine) => machine,
            None => {
                let snapshot = self.snapshot.as_ref().ok_or(SimError::MissingSnapshot)?;
                let mut machine = Spectrum::from_snapshot(snapshot, &self.roms, RecordedPorts::new());
                machine.cpu_mut().set_tstates(u64::from(input.tstates));
                info!("starting {} playback at T-state {}", machine.model(), input.tstates);
                machine
            }
        };
        let result = self.play_frames(&mut machine, &input.frames);
        self.machine = Some(machine);
        result
    }

    /// Play `frames` from the current recording. Frame numbers count across
    /// every recording played so far.
    fn play_frames(&mut self, machine: &mut Spectrum<RecordedPorts>, frames: &[Frame]) -> Result<()> {
        let width = self.total_frames.to_string().len();
        let mut index = self.skip_empty(frames, 0);
        loop {
            if self.frames_played >= self.total_frames {
                self.unplayed = frames[index..].to_vec();
                self.stopped = true;
                return Ok(());
            }
            let Some(frame) = frames.get(index) else {
                return Ok(());
            };
            let number = self.frames_played;
            machine.ports_mut().load_frame(number, &frame.readings);
            let mut quota = u64::from(frame.fetch_count);
            while quota > 0 {
                let pc = machine.regs().pc;
                if let Some(trace) = &mut self.trace {
                    writeln!(
                        trace,
                        "F:{number:0width$} T:{:05} C:{quota:05} I:{:05} ${pc:04X} {}",
                        machine.cpu().tstates(),
                        machine.ports().remaining(),
                        machine.disassemble(pc)
                    )?;
                }
                if self.options.map {
                    self.exec_map.insert(pc);
                }
                let fetches = machine.cpu().fetches();
                machine.step()?;
                quota = quota.saturating_sub(machine.cpu().fetches() - fetches);
            }
            end_frame(machine)?;

            self.frames_played += 1;
            index = self.skip_empty(frames, index + 1);
            if !self.options.quiet {
                self.show_progress()?;
            }
        }
    }

    /// Index of the first frame at or after `index` with a non-zero fetch
    /// count. Skipped frames still count as played.
    fn skip_empty(&mut self, frames: &[Frame], mut index: usize) -> usize {
        while frames.get(index).is_some_and(|f| f.fetch_count == 0) {
            index += 1;
            self.frames_played += 1;
        }
        index
    }

    /// `[ pp.p%]` followed by enough backspaces to overwrite it next time.
    fn show_progress(&mut self) -> Result<()> {
        let percent = self.frames_played as f64 * 100.0 / self.total_frames as f64;
        write!(self.out, "[{percent:5.1}%]{}", "\x08".repeat(8))?;
        self.out.flush()?;
        Ok(())
    }

    /// Addresses of every instruction executed, in order.
    #[must_use]
    pub fn exec_map(&self) -> &BTreeSet<u16> {
        &self.exec_map
    }

    /// Write the execution map, one `$XXXX` address per line.
    pub fn write_map(&self, out: &mut impl Write) -> Result<()> {
        for addr in &self.exec_map {
            writeln!(out, "${addr:04X}")?;
        }
        Ok(())
    }

    /// The machine as playback left it.
    #[must_use]
    pub fn machine(&self) -> Option<&Spectrum<RecordedPorts>> {
        self.machine.as_ref()
    }

    /// Write the final state to `path`.
    ///
    /// An RZX output carries a snapshot of the current state followed by
    /// whatever playback did not reach.
    pub fn save(&self, path: &Path, output: Output) -> Result<()> {
        let machine = self.machine.as_ref().ok_or(SimError::MissingSnapshot)?;
        match output {
            Output::Snapshot(format) => snapshot::write(path, &machine.to_snapshot(format)),
            Output::Rzx => {
                let format = match self.snapshot.as_ref().map(|s| s.format) {
                    Some(SnapshotFormat::Szx) => SnapshotFormat::Szx,
                    _ => SnapshotFormat::Z80,
                };
                let data = snapshot::encode(&machine.to_snapshot(format), format)?;
                let rzx = rzx::write_rzx(&data, format, &self.unplayed, &self.remaining)?;
                std::fs::write(path, rzx)?;
                Ok(())
            }
        }
    }
}

/// Frame boundary: check every reading was used, rebase the clock and take
/// the frame interrupt.
fn end_frame(machine: &mut Spectrum<RecordedPorts>) -> Result<()> {
    machine.ports().finish_frame()?;
    machine.cpu_mut().set_tstates(0);
    if machine.regs().iff1 {
        let last = machine.cpu().last_opcode();
        if last == LD_A_I || last == LD_A_R {
            machine.regs_mut().f &= !PF;
        }
        machine.force_interrupt();
    }
    Ok(())
}
