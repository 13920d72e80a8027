//! Plumbing shared by the command-line front-ends.

use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::{RomSet, SpectrumModel, parse_int, read_file};
use crate::error::Result;

/// Log to stderr at `warn` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();
}

/// Run a front-end, reporting any error as `ERROR: message`.
pub fn run(main: impl FnOnce() -> Result<()>) -> ExitCode {
    init_logging();
    match main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Load ROM images, telling 48K from 128K by size.
pub fn load_roms(paths: &[PathBuf]) -> Result<RomSet> {
    let mut roms = RomSet::blank();
    for path in paths {
        let data = read_file(path)?;
        let model = if data.len() > SpectrumModel::Spectrum48K.rom_size() {
            SpectrumModel::Spectrum128K
        } else {
            SpectrumModel::Spectrum48K
        };
        roms = roms.with_rom(model, data);
    }
    Ok(roms)
}

/// `clap` parser for a 16-bit address or value.
pub fn parse_u16(text: &str) -> std::result::Result<u16, String> {
    match parse_int(text) {
        Ok(n) if n <= 0xFFFF => Ok(n as u16),
        Ok(_) => Err(format!("{text} does not fit in 16 bits")),
        Err(e) => Err(e.to_string()),
    }
}

/// `clap` parser for a non-negative integer.
pub fn parse_u64(text: &str) -> std::result::Result<u64, String> {
    parse_int(text).map(u64::from).map_err(|e| e.to_string())
}

/// `clap` parser for `48` or `128`.
pub fn parse_model(text: &str) -> std::result::Result<SpectrumModel, String> {
    match text {
        "48" | "48k" | "48K" => Ok(SpectrumModel::Spectrum48K),
        "128" | "128k" | "128K" => Ok(SpectrumModel::Spectrum128K),
        _ => Err(format!("unknown model: {text}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses() {
        assert_eq!(parse_u16("$8000"), Ok(0x8000));
        assert_eq!(parse_u16("0x38"), Ok(0x38));
        assert_eq!(parse_u16("65535"), Ok(0xFFFF));
        assert_eq!(parse_u16("65536"), Err("65536 does not fit in 16 bits".to_string()));
        assert_eq!(parse_u16("x"), Err("Invalid integer: x".to_string()));
    }

    #[test]
    fn models() {
        assert_eq!(parse_model("128"), Ok(SpectrumModel::Spectrum128K));
        assert!(parse_model("16").is_err());
    }
}
