//! Run Z80 code from a snapshot or a fresh machine until a stop condition.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use spectrum_sim::config::apply_register_specs;
use spectrum_sim::{IdlePorts, Result, Spectrum, TraceOptions, cli, snapshot, trace};

#[derive(Parser)]
#[command(about = "Trace Z80 machine code in a snapshot or on a blank 48K/128K machine")]
struct Args {
    /// Snapshot file (sna, z80, szx), or 48/128 for a blank machine
    input: String,

    /// Write the final state to this snapshot
    outfile: Option<PathBuf>,

    /// Start executing at this address
    #[arg(long, value_name = "ADDR", value_parser = cli::parse_u16)]
    start: Option<u16>,

    /// Stop when PC reaches this address
    #[arg(long, value_name = "ADDR", value_parser = cli::parse_u16)]
    stop: Option<u16>,

    /// Stop after this many instructions
    #[arg(long, value_name = "N", value_parser = cli::parse_u64, default_value = "0")]
    max_operations: u64,

    /// Stop after this many T-states
    #[arg(long, value_name = "N", value_parser = cli::parse_u64, default_value = "0")]
    max_tstates: u64,

    /// Don't execute interrupt routines
    #[arg(long)]
    no_interrupts: bool,

    /// Set a register before tracing starts
    #[arg(long = "reg", value_name = "NAME=VALUE")]
    regs: Vec<String>,

    /// ROM image to use (16K for 48K, 32K for 128K)
    #[arg(long, value_name = "FILE")]
    rom: Vec<PathBuf>,

    /// Show execution time statistics
    #[arg(long)]
    stats: bool,

    /// Print each instruction as it runs
    #[arg(short, long)]
    verbose: bool,
}

fn machine(args: &Args) -> Result<Spectrum<IdlePorts>> {
    let roms = cli::load_roms(&args.rom)?;
    if let Ok(model) = cli::parse_model(&args.input) {
        return Ok(Spectrum::new(&roms.config(model), IdlePorts));
    }
    let state = snapshot::read(Path::new(&args.input))?;
    Ok(Spectrum::from_snapshot(&state, &roms, IdlePorts))
}

fn run(args: Args) -> Result<()> {
    let mut spectrum = machine(&args)?;
    if let Some(path) = &args.outfile {
        snapshot::format_of(path)?;
    }
    apply_register_specs(spectrum.regs_mut(), &args.regs)?;
    let options = TraceOptions {
        start: args.start,
        stop: args.stop,
        max_operations: args.max_operations,
        max_tstates: args.max_tstates,
        no_interrupts: args.no_interrupts,
        verbose: args.verbose,
    };

    let mut out = io::stdout().lock();
    let begun = Instant::now();
    let summary = trace::run(&mut spectrum, &options, &mut out)?;
    let wall = begun.elapsed().as_secs_f64();
    writeln!(out, "{}", summary.condition.message(spectrum.regs().pc))?;

    if args.stats {
        let z80_time = summary.tstates as f64 / spectrum.model().cpu_freq() as f64;
        writeln!(out, "Z80 execution time: {} T-states ({z80_time:.3}s)", summary.tstates)?;
        writeln!(out, "Instructions executed: {}", summary.operations)?;
        let speed = if wall > 0.0 { z80_time / wall } else { 0.0 };
        writeln!(out, "Simulation time: {wall:.3}s (x{speed:.2})")?;
    }

    if let Some(path) = &args.outfile {
        let format = snapshot::format_of(path)?;
        snapshot::write(path, &spectrum.to_snapshot(format))?;
        writeln!(out, "Wrote {}", path.display())?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    cli::run(|| run(args))
}
