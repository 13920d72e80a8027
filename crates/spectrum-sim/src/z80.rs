//! .Z80 snapshots (v1, v2, v3).
//!
//! **Version 1** (offset 6–7 PC ≠ 0): 30-byte header + one 48K memory
//! block, optionally compressed.
//!
//! **Version 2/3** (offset 6–7 PC = 0): 30-byte base header + extended
//! header + page-based memory blocks. Snapshots are always written as
//! version 3.

use zilog_z80::Registers;

use crate::config::SpectrumModel;
use crate::error::{Result, SimError};
use crate::memory::PAGE_SIZE;
use crate::snapshot::{Snapshot, SnapshotFormat, Unsupported};

const V1_HEADER_SIZE: usize = 30;
const V3_EXT_LEN: u16 = 54;

fn word(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

/// Decode a .Z80 snapshot.
pub fn decode(data: &[u8]) -> Result<Snapshot> {
    if data.len() < V1_HEADER_SIZE {
        return Err(SimError::invalid("Z80", "header truncated"));
    }
    if word(data, 6) != 0 {
        decode_v1(data)
    } else {
        decode_v2v3(data)
    }
}

/// Registers from the 30-byte base header, and the flags byte at offset 12.
fn read_base_header(data: &[u8]) -> (Registers, u8) {
    // Some writers store 255 here; treat it as 1.
    let flags1 = if data[12] == 255 { 1 } else { data[12] };
    let regs = Registers {
        a: data[0],
        f: data[1],
        c: data[2],
        b: data[3],
        l: data[4],
        h: data[5],
        pc: word(data, 6),
        sp: word(data, 8),
        i: data[10],
        r: (data[11] & 0x7F) | ((flags1 & 0x01) << 7),
        e: data[13],
        d: data[14],
        c_alt: data[15],
        b_alt: data[16],
        e_alt: data[17],
        d_alt: data[18],
        l_alt: data[19],
        h_alt: data[20],
        a_alt: data[21],
        f_alt: data[22],
        iy: word(data, 23),
        ix: word(data, 25),
        iff1: data[27] != 0,
        iff2: data[28] != 0,
        im: data[29] & 0x03,
        ..Registers::default()
    };
    (regs, flags1)
}

fn decode_v1(data: &[u8]) -> Result<Snapshot> {
    let (regs, flags1) = read_base_header(data);
    let mut snapshot = Snapshot::new(SnapshotFormat::Z80, SpectrumModel::Spectrum48K);

    let body = &data[V1_HEADER_SIZE..];
    let mut ram = vec![0u8; 3 * PAGE_SIZE];
    if flags1 & 0x20 != 0 {
        decompress(body, &mut ram);
    } else {
        let len = body.len().min(ram.len());
        ram[..len].copy_from_slice(&body[..len]);
    }
    for (page, chunk) in ram.chunks(PAGE_SIZE).enumerate() {
        snapshot.ram[page].copy_from_slice(chunk);
    }

    snapshot.registers = regs;
    snapshot.border = (flags1 >> 1) & 0x07;
    Ok(snapshot)
}

/// Hardware description for a v2/v3 hardware id.
fn machine_name(version: u8, hw: u8) -> String {
    let name = match (version, hw) {
        (_, 0) => "48K Spectrum",
        (_, 1) => "48K Spectrum + IF1",
        (_, 2) => "SamRam",
        (2, 3) | (3, 4) => "128K Spectrum",
        (2, 4) | (3, 5) => "128K Spectrum + IF1",
        (3, 3) => "48K Spectrum + MGT",
        (3, 6) => "128K Spectrum + MGT",
        (_, 7 | 8) => "Spectrum +3",
        (_, 9) => "Pentagon",
        (_, 12) => "Spectrum +2",
        (_, 13) => "Spectrum +2A",
        _ => return format!("Unknown machine ({hw})"),
    };
    name.to_string()
}

fn decode_v2v3(data: &[u8]) -> Result<Snapshot> {
    let (mut regs, flags1) = read_base_header(data);
    if data.len() < 32 {
        return Err(SimError::invalid("Z80", "extended header truncated"));
    }
    let ext_len = word(data, 30);
    let header_end = 32 + usize::from(ext_len);
    if ext_len < 6 || data.len() < header_end {
        return Err(SimError::invalid("Z80", "extended header truncated"));
    }
    let version = if ext_len == 23 { 2 } else { 3 };

    regs.pc = word(data, 32);
    let hw = data[34];
    let out7ffd = data[35];
    let modified = data[37] & 0x80 != 0;

    let is_128k = if version == 2 {
        matches!(hw, 3 | 4)
    } else {
        matches!(hw, 4..=9 | 12 | 13)
    };
    let model = if is_128k {
        SpectrumModel::Spectrum128K
    } else {
        SpectrumModel::Spectrum48K
    };
    let mut snapshot = Snapshot::new(SnapshotFormat::Z80, model);
    snapshot.machine = machine_name(version, hw);
    let supported_hw: &[u8] = if version == 2 { &[0, 3] } else { &[0, 4, 12] };
    if modified || !supported_hw.contains(&hw) {
        snapshot.unsupported = Some(Unsupported::Machine);
    }

    if version == 3 && header_end >= 58 {
        let frame = model.frame_duration();
        let quarter = frame / 4;
        let low = u64::from(word(data, 55));
        let high = u64::from(data[57] & 0x03);
        let quarters = (6 - high) % 4;
        snapshot.tstates = (frame - 1).saturating_sub(quarters * quarter + low % quarter);
    }

    let mut pos = header_end;
    while pos + 3 <= data.len() {
        let block_len = word(data, pos);
        let page = data[pos + 2];
        pos += 3;
        let len = if block_len == 0xFFFF {
            PAGE_SIZE
        } else {
            usize::from(block_len)
        };
        let block = data
            .get(pos..pos + len)
            .ok_or_else(|| SimError::invalid("Z80", format!("page {page} truncated")))?;
        pos += len;

        let target = if is_128k {
            (3..=10).contains(&page).then(|| usize::from(page - 3))
        } else {
            match page {
                8 => Some(0),
                4 => Some(1),
                5 => Some(2),
                _ => None,
            }
        };
        let Some(target) = target else { continue };
        if block_len == 0xFFFF {
            snapshot.ram[target].copy_from_slice(block);
        } else {
            decompress(block, &mut snapshot.ram[target]);
        }
    }

    snapshot.registers = regs;
    snapshot.border = (flags1 >> 1) & 0x07;
    snapshot.out7ffd = if is_128k { out7ffd } else { 0 };
    Ok(snapshot)
}

/// Expand `ED ED n b` runs into `dst`, stopping when it is full.
fn decompress(src: &[u8], dst: &mut [u8]) {
    let mut si = 0;
    let mut di = 0;
    while si < src.len() && di < dst.len() {
        if si + 3 < src.len() && src[si] == 0xED && src[si + 1] == 0xED {
            let count = usize::from(src[si + 2]).min(dst.len() - di);
            dst[di..di + count].fill(src[si + 3]);
            di += count;
            si += 4;
        } else {
            dst[di] = src[si];
            di += 1;
            si += 1;
        }
    }
}

/// Compress a page: runs of five or more bytes, and runs of two or more
/// `ED`s, become `ED ED n b`. The byte after a lone `ED` is never the start
/// of a run.
fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        let run = data[i..].iter().take(255).take_while(|&&x| x == b).count();
        if run >= 5 || (b == 0xED && run >= 2) {
            out.extend_from_slice(&[0xED, 0xED, run as u8, b]);
            i += run;
        } else if b == 0xED {
            out.push(b);
            out.extend(data.get(i + 1));
            i += 2;
        } else {
            out.extend(std::iter::repeat_n(b, run));
            i += run;
        }
    }
    out
}

/// Encode a snapshot as a version 3 .Z80 file.
#[must_use]
pub fn encode(snapshot: &Snapshot) -> Vec<u8> {
    let regs = &snapshot.registers;
    let mut out = Vec::with_capacity(0x4000);
    out.extend_from_slice(&[regs.a, regs.f, regs.c, regs.b, regs.l, regs.h, 0, 0]);
    out.extend_from_slice(&regs.sp.to_le_bytes());
    out.extend_from_slice(&[
        regs.i,
        regs.r & 0x7F,
        (regs.r >> 7) | ((snapshot.border & 0x07) << 1),
        regs.e,
        regs.d,
        regs.c_alt,
        regs.b_alt,
        regs.e_alt,
        regs.d_alt,
        regs.l_alt,
        regs.h_alt,
        regs.a_alt,
        regs.f_alt,
    ]);
    out.extend_from_slice(&regs.iy.to_le_bytes());
    out.extend_from_slice(&regs.ix.to_le_bytes());
    out.extend_from_slice(&[u8::from(regs.iff1), u8::from(regs.iff2), regs.im & 0x03]);

    let is_128k = snapshot.model.is_128k();
    let mut ext = vec![0u8; usize::from(V3_EXT_LEN)];
    ext[0..2].copy_from_slice(&regs.pc.to_le_bytes());
    ext[2] = if is_128k { 4 } else { 0 };
    ext[3] = if is_128k { snapshot.out7ffd } else { 0 };
    let frame = snapshot.model.frame_duration();
    let quarter = frame / 4;
    let x = frame - 1 - snapshot.tstates % frame;
    ext[23..25].copy_from_slice(&((x % quarter) as u16).to_le_bytes());
    ext[25] = (2 - (x / quarter) as i64).rem_euclid(4) as u8;
    out.extend_from_slice(&V3_EXT_LEN.to_le_bytes());
    out.extend_from_slice(&ext);

    let pages: Vec<(u8, usize)> = if is_128k {
        (0..8).map(|bank| (bank as u8 + 3, bank)).collect()
    } else {
        vec![(8, 0), (4, 1), (5, 2)]
    };
    for (page, index) in pages {
        let raw = &snapshot.ram[index];
        let packed = compress(raw);
        if packed.len() >= PAGE_SIZE {
            out.extend_from_slice(&0xFFFFu16.to_le_bytes());
            out.push(page);
            out.extend_from_slice(raw);
        } else {
            out.extend_from_slice(&(packed.len() as u16).to_le_bytes());
            out.push(page);
            out.extend_from_slice(&packed);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal v1 uncompressed .Z80 snapshot.
    fn make_v1_uncompressed(pc: u16) -> Vec<u8> {
        let mut data = vec![0u8; V1_HEADER_SIZE + 0xC000];
        data[0] = 0xAA; // A
        data[1] = 0xFF; // F
        data[2] = 0x34; // C
        data[3] = 0x12; // B
        data[6] = pc as u8;
        data[7] = (pc >> 8) as u8;
        data[9] = 0x80; // SP=$8000
        data[11] = 0x42; // R
        data[12] = 0x05; // border 2, R bit 7
        data[27] = 1;
        data[28] = 1;
        data[29] = 1; // IM 1
        data[V1_HEADER_SIZE] = 0x55;
        data[V1_HEADER_SIZE + 0x4000] = 0x88;
        data[V1_HEADER_SIZE + 0x8000] = 0xCC;
        data
    }

    /// Build a v3 header with the given hardware id and pages.
    fn make_v3(hw: u8, out7ffd: u8, pages: &[(u8, &[u8])]) -> Vec<u8> {
        let mut data = vec![0u8; 86];
        data[30] = 54;
        data[32] = 0x00; // PC=$C000
        data[33] = 0xC0;
        data[34] = hw;
        data[35] = out7ffd;
        for (page, body) in pages {
            data.extend_from_slice(&(body.len() as u16).to_le_bytes());
            data.push(*page);
            data.extend_from_slice(body);
        }
        data
    }

    #[test]
    fn v1_uncompressed() {
        let snapshot = decode(&make_v1_uncompressed(0xABCD)).expect("valid Z80");
        let regs = snapshot.registers;
        assert_eq!(regs.a, 0xAA);
        assert_eq!(regs.bc(), 0x1234);
        assert_eq!(regs.pc, 0xABCD);
        assert_eq!(regs.sp, 0x8000);
        assert_eq!(regs.r, 0xC2);
        assert_eq!(regs.im, 1);
        assert!(regs.iff1);
        assert_eq!(snapshot.border, 2);
        assert_eq!(snapshot.peek(0x4000), 0x55);
        assert_eq!(snapshot.peek(0x8000), 0x88);
        assert_eq!(snapshot.peek(0xC000), 0xCC);
    }

    #[test]
    fn v1_compressed() {
        let mut data = make_v1_uncompressed(0x8000);
        data.truncate(V1_HEADER_SIZE);
        data[12] |= 0x20;
        data.extend_from_slice(&[0x01, 0xED, 0xED, 0x04, 0x77]);
        data.extend_from_slice(&[0x00, 0xED, 0xED, 0x00]);
        let snapshot = decode(&data).expect("valid Z80");
        assert_eq!(snapshot.peek(0x4000), 0x01);
        assert_eq!(snapshot.peek(0x4004), 0x77);
        assert_eq!(snapshot.peek(0x4005), 0x00);
    }

    #[test]
    fn v3_128k_pages_map_to_banks() {
        let bank7 = [0xED, 0xED, 0x10, 0xAF];
        let snapshot = decode(&make_v3(4, 0x07, &[(10, &bank7), (8, &[0x55])])).expect("valid Z80");
        assert_eq!(snapshot.model, SpectrumModel::Spectrum128K);
        assert_eq!(snapshot.machine, "128K Spectrum");
        assert_eq!(snapshot.out7ffd, 7);
        assert_eq!(snapshot.ram[7][15], 0xAF);
        assert_eq!(snapshot.peek(0xC000), 0xAF);
        assert_eq!(snapshot.peek(0x4000), 0x55);
        assert!(snapshot.check_supported().is_ok());
    }

    #[test]
    fn unsupported_hardware() {
        let snapshot = decode(&make_v3(5, 0, &[])).expect("valid Z80");
        assert_eq!(snapshot.machine, "128K Spectrum + IF1");
        assert_eq!(snapshot.check_supported().unwrap_err().to_string(), "Unsupported machine type");

        let mut data = make_v3(0, 0, &[]);
        data[37] = 0x80;
        let snapshot = decode(&data).expect("valid Z80");
        assert!(snapshot.check_supported().is_err());
    }

    #[test]
    fn v3_plus_2_plays_as_a_128k() {
        let snapshot = decode(&make_v3(12, 0x10, &[(8, &[0x55])])).expect("valid Z80");
        assert_eq!(snapshot.machine, "Spectrum +2");
        assert_eq!(snapshot.model, SpectrumModel::Spectrum128K);
        assert_eq!(snapshot.peek(0x4000), 0x55);
        assert!(snapshot.check_supported().is_ok());

        let snapshot = decode(&make_v3(13, 0, &[])).expect("valid Z80");
        assert_eq!(snapshot.machine, "Spectrum +2A");
        assert!(snapshot.check_supported().is_err());
    }

    #[test]
    fn v2_hardware_ids() {
        let mut data = make_v3(3, 0, &[]);
        data[30] = 23;
        data.truncate(32 + 23);
        let snapshot = decode(&data).expect("valid Z80");
        assert_eq!(snapshot.model, SpectrumModel::Spectrum128K);
        assert!(snapshot.check_supported().is_ok());
    }

    #[test]
    fn truncated_page_is_invalid() {
        let mut data = make_v3(0, 0, &[(8, &[1, 2, 3])]);
        data.pop();
        let err = decode(&data).unwrap_err();
        assert_eq!(err.to_string(), "Invalid Z80 file: page 8 truncated");
    }

    #[test]
    fn compress_rules() {
        assert_eq!(compress(&[1, 1, 1, 1]), [1, 1, 1, 1]);
        assert_eq!(compress(&[1; 5]), [0xED, 0xED, 5, 1]);
        assert_eq!(compress(&[0xED, 0xED]), [0xED, 0xED, 2, 0xED]);
        assert_eq!(compress(&[0xED, 0, 0, 0, 0, 0]), [0xED, 0, 0, 0, 0, 0]);
        assert_eq!(compress(&[0xED, 0, 0, 0, 0, 0, 0]), [0xED, 0, 0xED, 0xED, 5, 0]);
        assert_eq!(compress(&[7; 300]), [0xED, 0xED, 255, 7, 0xED, 0xED, 45, 7]);
    }

    #[test]
    fn round_trip_preserves_state() {
        let mut snapshot = Snapshot::new(SnapshotFormat::Z80, SpectrumModel::Spectrum128K);
        snapshot.registers.pc = 0x8000;
        snapshot.registers.r = 0x85;
        snapshot.registers.set_hl_alt(0x1234);
        snapshot.border = 4;
        snapshot.out7ffd = 0x13;
        snapshot.tstates = 12_345;
        for (i, byte) in snapshot.ram[6].iter_mut().enumerate() {
            *byte = (i * 7) as u8;
        }
        let decoded = decode(&encode(&snapshot)).expect("valid Z80");
        assert_eq!(decoded.registers, snapshot.registers);
        assert_eq!(decoded.ram, snapshot.ram);
        assert_eq!(decoded.border, 4);
        assert_eq!(decoded.out7ffd, 0x13);
        assert_eq!(decoded.tstates, 12_345);
    }
}
