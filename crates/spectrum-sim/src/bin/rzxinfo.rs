//! Show the blocks of an RZX file, or extract its snapshots.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use spectrum_sim::config::read_file;
use spectrum_sim::rzx::{self, BlockBody};
use spectrum_sim::{Result, RzxFile, cli};

#[derive(Parser)]
#[command(about = "Show the blocks in or extract the snapshots from an RZX file")]
struct Args {
    rzxfile: PathBuf,

    /// Extract the embedded snapshots
    #[arg(long)]
    extract: bool,

    /// Show the frames of each input recording
    #[arg(long)]
    frames: bool,
}

fn info(args: Args) -> Result<()> {
    let rzx = RzxFile::parse(&read_file(&args.rzxfile)?)?;
    if !args.extract {
        for line in rzx::info_lines(&rzx, args.frames) {
            println!("{line}");
        }
        return Ok(());
    }

    let snapshots = rzx.blocks.iter().filter_map(|block| match &block.body {
        BlockBody::Snapshot(snapshot) if !snapshot.external => Some(snapshot),
        _ => None,
    });
    let mut extracted = 0;
    for (i, snapshot) in snapshots.enumerate() {
        let path = format!("{}.{:03}.{}", args.rzxfile.display(), i + 1, snapshot.extension);
        std::fs::write(&path, &snapshot.data)?;
        println!("Extracted {path}");
        extracted += 1;
    }
    if extracted == 0 {
        println!("No snapshots found");
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    cli::run(|| info(args))
}
