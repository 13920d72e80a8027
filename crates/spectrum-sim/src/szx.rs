//! SZX (ZX-State) snapshots.
//!
//! An 8-byte `ZXST` header followed by tagged blocks: a 4-byte ASCII id,
//! a 32-bit length, then the body. Only the blocks describing the CPU
//! (`Z80R`), the ULA and paging (`SPCR`) and RAM (`RAMP`) carry state the
//! machine model uses; a handful of others describe harmless peripherals
//! and are tolerated.

use log::debug;
use zilog_z80::Registers;

use crate::config::SpectrumModel;
use crate::error::{Result, SimError};
use crate::memory::PAGE_SIZE;
use crate::snapshot::{Snapshot, SnapshotFormat, Unsupported};
use crate::zlib;

const MAGIC: &[u8; 4] = b"ZXST";
const HEADER_SIZE: usize = 8;
const Z80R_LEN: usize = 37;

/// Blocks whose presence does not change how the snapshot runs.
const TOLERATED: [&str; 8] = ["AY", "CRTR", "KEYB", "JOY", "RAMP", "SPCR", "TAPE", "Z80R"];

const EILAST: u8 = 0x01;
const HALTED: u8 = 0x02;
const RAMP_COMPRESSED: u16 = 0x0001;

fn machine_name(id: u8) -> String {
    match id {
        0 => "16K ZX Spectrum".to_string(),
        1 => "48K ZX Spectrum".to_string(),
        2 => "ZX Spectrum 128".to_string(),
        3 => "ZX Spectrum +2".to_string(),
        4 => "ZX Spectrum +2A/+2B".to_string(),
        5 => "ZX Spectrum +3".to_string(),
        6 => "ZX Spectrum +3e".to_string(),
        n => format!("Unknown machine ({n})"),
    }
}

fn word(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

/// RAM page index in [`Snapshot::ram`] for an SZX page number.
fn page_index(model: SpectrumModel, page: u8) -> Option<usize> {
    match (model, page) {
        (SpectrumModel::Spectrum128K, 0..=7) => Some(usize::from(page)),
        (SpectrumModel::Spectrum48K, 5) => Some(0),
        (SpectrumModel::Spectrum48K, 2) => Some(1),
        (SpectrumModel::Spectrum48K, 0) => Some(2),
        _ => None,
    }
}

fn read_z80r(body: &[u8], snapshot: &mut Snapshot) -> Result<()> {
    if body.len() < Z80R_LEN {
        return Err(SimError::invalid("SZX", "Z80R block truncated"));
    }
    let mut regs = Registers {
        ix: word(body, 16),
        iy: word(body, 18),
        sp: word(body, 20),
        pc: word(body, 22),
        i: body[24],
        r: body[25],
        iff1: body[26] != 0,
        iff2: body[27] != 0,
        im: body[28] & 0x03,
        halted: body[34] & HALTED != 0,
        ..Registers::default()
    };
    regs.set_af(word(body, 0));
    regs.set_bc(word(body, 2));
    regs.set_de(word(body, 4));
    regs.set_hl(word(body, 6));
    regs.set_af_alt(word(body, 8));
    regs.set_bc_alt(word(body, 10));
    regs.set_de_alt(word(body, 12));
    regs.set_hl_alt(word(body, 14));
    snapshot.registers = regs;
    snapshot.tstates = u64::from(u32::from_le_bytes([body[29], body[30], body[31], body[32]]));
    snapshot.ei_last = body[34] & EILAST != 0;
    Ok(())
}

fn read_ramp(body: &[u8], snapshot: &mut Snapshot) -> Result<()> {
    if body.len() < 3 {
        return Err(SimError::invalid("SZX", "RAMP block truncated"));
    }
    let flags = word(body, 0);
    let page = body[2];
    let data = if flags & RAMP_COMPRESSED != 0 {
        zlib::inflate(&body[3..], "SZX")?
    } else {
        body[3..].to_vec()
    };
    if data.len() != PAGE_SIZE {
        return Err(SimError::invalid("SZX", format!("RAM page {page} is {} bytes", data.len())));
    }
    match page_index(snapshot.model, page) {
        Some(index) => snapshot.ram[index].copy_from_slice(&data),
        None => debug!("ignoring SZX RAM page {page}"),
    }
    Ok(())
}

/// Decode an SZX snapshot.
pub fn decode(data: &[u8]) -> Result<Snapshot> {
    if data.len() < HEADER_SIZE || &data[..4] != MAGIC {
        return Err(SimError::NotSzx);
    }
    let machine_id = data[6];
    let model = if machine_id <= 1 {
        SpectrumModel::Spectrum48K
    } else {
        SpectrumModel::Spectrum128K
    };
    let mut snapshot = Snapshot::new(SnapshotFormat::Szx, model);
    snapshot.machine = machine_name(machine_id);

    let mut foreign: Vec<String> = Vec::new();
    let mut pos = HEADER_SIZE;
    while pos < data.len() {
        let header = data
            .get(pos..pos + 8)
            .ok_or_else(|| SimError::invalid("SZX", "block header truncated"))?;
        let id = String::from_utf8_lossy(&header[..4]).trim_end_matches('\0').to_string();
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        pos += 8;
        let body = data
            .get(pos..pos + len)
            .ok_or_else(|| SimError::invalid("SZX", format!("{id} block truncated")))?;
        pos += len;
        debug!("SZX block {id} ({len} bytes)");

        match id.as_str() {
            "Z80R" => read_z80r(body, &mut snapshot)?,
            "SPCR" if len >= 2 => {
                snapshot.border = body[0] & 0x07;
                snapshot.out7ffd = if model.is_128k() { body[1] } else { 0 };
            }
            "RAMP" => read_ramp(body, &mut snapshot)?,
            _ => {}
        }
        if !TOLERATED.contains(&id.as_str()) && !foreign.contains(&id) {
            foreign.push(id);
        }
    }

    if !foreign.is_empty() {
        snapshot.unsupported = Some(Unsupported::Blocks(foreign));
    } else if machine_id > 2 {
        snapshot.unsupported = Some(Unsupported::Machine);
    }
    Ok(snapshot)
}

fn push_block(out: &mut Vec<u8>, id: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(id);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
}

/// Encode a snapshot as SZX with compressed RAM pages.
pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let regs = &snapshot.registers;
    let is_128k = snapshot.model.is_128k();
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 4, if is_128k { 2 } else { 1 }, 0]);

    let mut z80r = Vec::with_capacity(Z80R_LEN);
    for pair in [
        regs.af(),
        regs.bc(),
        regs.de(),
        regs.hl(),
        regs.af_alt(),
        regs.bc_alt(),
        regs.de_alt(),
        regs.hl_alt(),
        regs.ix,
        regs.iy,
        regs.sp,
        regs.pc,
    ] {
        z80r.extend_from_slice(&pair.to_le_bytes());
    }
    z80r.extend_from_slice(&[regs.i, regs.r, u8::from(regs.iff1), u8::from(regs.iff2), regs.im]);
    z80r.extend_from_slice(&(snapshot.tstates as u32).to_le_bytes());
    let mut flags = 0;
    if snapshot.ei_last {
        flags |= EILAST;
    }
    if regs.halted {
        flags |= HALTED;
    }
    z80r.extend_from_slice(&[0, flags, 0, 0]);
    push_block(&mut out, b"Z80R", &z80r);

    let out7ffd = if is_128k { snapshot.out7ffd } else { 0 };
    push_block(&mut out, b"SPCR", &[snapshot.border & 0x07, out7ffd, 0, 0, 0, 0, 0, 0]);

    let pages: &[u8] = if is_128k { &[0, 1, 2, 3, 4, 5, 6, 7] } else { &[5, 2, 0] };
    for &page in pages {
        let Some(index) = page_index(snapshot.model, page) else { continue };
        let mut ramp = RAMP_COMPRESSED.to_le_bytes().to_vec();
        ramp.push(page);
        ramp.extend_from_slice(&zlib::deflate(&snapshot.ram[index])?);
        push_block(&mut out, b"RAMP", &ramp);
    }
    Ok(out)
}
