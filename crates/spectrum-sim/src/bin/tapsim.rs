//! Load a TAP or TZX file by running the machine's own loader against it.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use spectrum_sim::config::apply_register_specs;
use spectrum_sim::{
    LoadOptions, LoadSimulation, Result, Spectrum, SpectrumModel, accelerator, cli, loader, snapshot,
};

/// Z80 T-states per second of simulated time.
const CLOCK: u64 = 3_500_000;

#[derive(Parser)]
#[command(about = "Simulate loading a tape and optionally save the result as a snapshot")]
struct Args {
    /// TAP or TZX file
    tape: PathBuf,

    /// Write the final state to this snapshot (z80, szx, sna)
    outfile: Option<PathBuf>,

    /// Comma-separated loader profiles to accelerate, 'none', or 'list' to
    /// show the names
    #[arg(long, value_name = "NAMES")]
    accelerator: Option<String>,

    /// Tape time (T-states) of the first block's leading edge
    #[arg(long, value_name = "N", value_parser = cli::parse_u64, default_value = "0")]
    first_edge: u64,

    /// Machine to start when no snapshot is given
    #[arg(long, value_parser = cli::parse_model, default_value = "48")]
    model: SpectrumModel,

    /// Run every byte through the loader
    #[arg(long)]
    no_fast_load: bool,

    /// Keep the tape running between blocks
    #[arg(long)]
    no_pause: bool,

    /// Set a register before the simulation starts
    #[arg(long = "reg", value_name = "NAME=VALUE")]
    regs: Vec<String>,

    /// ROM image to use (16K for 48K, 32K for 128K)
    #[arg(long, value_name = "FILE")]
    rom: Vec<PathBuf>,

    /// Start from this snapshot
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Start executing at this address
    #[arg(long, value_name = "ADDR", value_parser = cli::parse_u16)]
    start: Option<u16>,

    /// Give up after this many seconds of Z80 time
    #[arg(long, value_name = "SECS", value_parser = cli::parse_u64, default_value = "900")]
    timeout: u64,
}

fn simulate(args: Args) -> Result<()> {
    let mut out = io::stdout().lock();
    if args.accelerator.as_deref() == Some("list") {
        for name in accelerator::all() {
            writeln!(out, "{name}")?;
        }
        return Ok(());
    }

    let mut options = LoadOptions {
        fast_load: !args.no_fast_load,
        pause: !args.no_pause,
        timeout: args.timeout.saturating_mul(CLOCK),
        first_edge: args.first_edge,
        ..LoadOptions::default()
    };
    if let Some(names) = &args.accelerator {
        options.set_accelerators(names)?;
    }
    if let Some(path) = &args.outfile {
        snapshot::format_of(path)?;
    }

    let roms = cli::load_roms(&args.rom)?;
    let start_state = args.snapshot.as_deref().map(snapshot::read).transpose()?;
    let model = start_state.as_ref().map_or(args.model, |s| s.model);
    let tape = LoadSimulation::tape(&loader::read_tape(&args.tape, model)?, &options);
    let mut spectrum = match &start_state {
        Some(state) => Spectrum::from_snapshot(state, &roms, tape),
        None => Spectrum::new(&roms.config(model), tape),
    };
    if let Some(start) = args.start {
        spectrum.cpu_mut().set_pc(start);
    }
    apply_register_specs(spectrum.regs_mut(), &args.regs)?;

    let mut simulation = LoadSimulation::new(spectrum, options);
    simulation.run(&mut out)?;
    for line in simulation.spectrum().regs().dump() {
        writeln!(out, "{line}")?;
    }

    if let Some(path) = &args.outfile {
        let format = snapshot::format_of(path)?;
        snapshot::write(path, &simulation.spectrum().to_snapshot(format))?;
        writeln!(out, "Wrote {}", path.display())?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    cli::run(|| simulate(args))
}
