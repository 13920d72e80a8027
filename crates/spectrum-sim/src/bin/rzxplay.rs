//! Play an RZX input recording.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use spectrum_sim::config::read_file;
use spectrum_sim::{Output, Player, PlayerOptions, Result, RzxFile, cli, snapshot};

#[derive(Parser)]
#[command(about = "Play an RZX file and optionally save the final state")]
struct Args {
    /// RZX file to play
    rzxfile: PathBuf,

    /// Write a snapshot (z80, szx) or an RZX file with the rest of the recording
    outfile: Option<PathBuf>,

    /// Replay snapshots of unsupported machines anyway
    #[arg(long)]
    force: bool,

    /// Log the address of every executed instruction to this file
    #[arg(long, value_name = "FILE")]
    map: Option<PathBuf>,

    /// Don't print the progress indicator
    #[arg(short, long)]
    quiet: bool,

    /// ROM image to use (16K for 48K, 32K for 128K)
    #[arg(long, value_name = "FILE")]
    rom: Vec<PathBuf>,

    /// Start from this snapshot ahead of the file's own
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long, value_name = "FRAMES")]
    stop: Option<usize>,

    /// Log every executed instruction to this file
    #[arg(long, value_name = "FILE")]
    trace: Option<PathBuf>,
}

fn play(args: Args) -> Result<()> {
    let output = args.outfile.as_deref().map(Output::for_path).transpose()?;
    let rzx = RzxFile::parse(&read_file(&args.rzxfile)?)?;
    let initial = args.snapshot.as_deref().map(snapshot::read).transpose()?;
    let options = PlayerOptions {
        stop: args.stop,
        quiet: args.quiet,
        force: args.force,
        trace: args.trace.is_some(),
        map: args.map.is_some(),
    };

    let mut player = Player::new(options, cli::load_roms(&args.rom)?, io::stdout());
    if let Some(path) = &args.trace {
        player = player.with_trace(Box::new(BufWriter::new(File::create(path)?)));
    }
    let played = player.play(rzx, initial);
    if let Some(path) = &args.map {
        player.write_map(&mut BufWriter::new(File::create(path)?))?;
    }
    played?;

    if let (Some(path), Some(output)) = (&args.outfile, output) {
        player.save(path, output)?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    cli::run(|| play(args))
}
