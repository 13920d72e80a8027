//! SNA snapshots for 48K and 128K Spectrum.
//!
//! **48K format** (49,179 bytes): 27-byte header + 49,152 bytes of RAM.
//! PC is stored on the stack, so it is popped on load and pushed on save.
//!
//! **128K format** (131,103 or 147,487 bytes): 27-byte header + banks 5,
//! 2 and the paged bank, a 4-byte extension (PC, port $7FFD, TR-DOS flag),
//! then the remaining banks in ascending order. The longer variant occurs
//! when the paged bank is 2 or 5 and so is stored twice.

use log::warn;
use zilog_z80::Registers;

use crate::config::SpectrumModel;
use crate::error::{Result, SimError};
use crate::memory::PAGE_SIZE;
use crate::snapshot::{Snapshot, SnapshotFormat};

const SNA_48K_SIZE: usize = 49_179;
const SNA_128K_SIZE: usize = 131_103;
const SNA_128K_LONG_SIZE: usize = 147_487;
const HEADER_SIZE: usize = 27;
const RAM_SIZE: usize = 3 * PAGE_SIZE;

/// Decode an SNA snapshot.
pub fn decode(data: &[u8]) -> Result<Snapshot> {
    match data.len() {
        SNA_48K_SIZE => Ok(decode_48k(data)),
        SNA_128K_SIZE | SNA_128K_LONG_SIZE => decode_128k(data),
        n => Err(SimError::invalid("SNA", format!("unexpected size {n} bytes"))),
    }
}

fn word(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

/// Registers from the common 27-byte header, and the border colour.
fn read_header(data: &[u8]) -> (Registers, u8) {
    let mut regs = Registers {
        i: data[0],
        l_alt: data[1],
        h_alt: data[2],
        e_alt: data[3],
        d_alt: data[4],
        c_alt: data[5],
        b_alt: data[6],
        f_alt: data[7],
        a_alt: data[8],
        l: data[9],
        h: data[10],
        e: data[11],
        d: data[12],
        c: data[13],
        b: data[14],
        iy: word(data, 15),
        ix: word(data, 17),
        r: data[20],
        f: data[21],
        a: data[22],
        sp: word(data, 23),
        im: data[25] & 0x03,
        ..Registers::default()
    };
    let iff2 = data[19] & 0x04 != 0;
    regs.iff1 = iff2;
    regs.iff2 = iff2;
    (regs, data[26] & 0x07)
}

fn decode_48k(data: &[u8]) -> Snapshot {
    let mut snapshot = Snapshot::new(SnapshotFormat::Sna, SpectrumModel::Spectrum48K);
    let (mut regs, border) = read_header(data);
    for (page, chunk) in data[HEADER_SIZE..HEADER_SIZE + RAM_SIZE].chunks(PAGE_SIZE).enumerate() {
        snapshot.ram[page].copy_from_slice(chunk);
    }

    let sp = regs.sp;
    if sp < 0x4000 || sp == 0xFFFF {
        warn!("SNA stack pointer ${sp:04X} reaches into ROM; PC is unreliable");
    }
    regs.pc = u16::from_le_bytes([snapshot.peek(sp), snapshot.peek(sp.wrapping_add(1))]);
    regs.sp = sp.wrapping_add(2);

    snapshot.registers = regs;
    snapshot.border = border;
    snapshot
}

fn decode_128k(data: &[u8]) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new(SnapshotFormat::Sna, SpectrumModel::Spectrum128K);
    let (mut regs, border) = read_header(data);

    let ext = HEADER_SIZE + RAM_SIZE;
    regs.pc = word(data, ext);
    let out7ffd = data[ext + 2];
    let paged = usize::from(out7ffd & 0x07);

    let first = &data[HEADER_SIZE..ext];
    snapshot.ram[5].copy_from_slice(&first[..PAGE_SIZE]);
    snapshot.ram[2].copy_from_slice(&first[PAGE_SIZE..2 * PAGE_SIZE]);
    snapshot.ram[paged].copy_from_slice(&first[2 * PAGE_SIZE..]);

    let mut pos = ext + 4;
    for bank in (0..8).filter(|&b| b != 5 && b != 2 && b != paged) {
        let page = data
            .get(pos..pos + PAGE_SIZE)
            .ok_or_else(|| SimError::invalid("SNA", format!("RAM bank {bank} missing")))?;
        snapshot.ram[bank].copy_from_slice(page);
        pos += PAGE_SIZE;
    }

    snapshot.registers = regs;
    snapshot.border = border;
    snapshot.out7ffd = out7ffd;
    Ok(snapshot)
}

fn write_header(out: &mut Vec<u8>, regs: &Registers, sp: u16, border: u8) {
    out.extend_from_slice(&[
        regs.i, regs.l_alt, regs.h_alt, regs.e_alt, regs.d_alt, regs.c_alt, regs.b_alt,
        regs.f_alt, regs.a_alt, regs.l, regs.h, regs.e, regs.d, regs.c, regs.b,
    ]);
    out.extend_from_slice(&regs.iy.to_le_bytes());
    out.extend_from_slice(&regs.ix.to_le_bytes());
    out.push(u8::from(regs.iff2) << 2);
    out.extend_from_slice(&[regs.r, regs.f, regs.a]);
    out.extend_from_slice(&sp.to_le_bytes());
    out.extend_from_slice(&[regs.im, border & 0x07]);
}

/// Encode a snapshot as SNA.
pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let regs = &snapshot.registers;
    if snapshot.model.is_128k() {
        let mut out = Vec::with_capacity(SNA_128K_LONG_SIZE);
        write_header(&mut out, regs, regs.sp, snapshot.border);
        let paged = usize::from(snapshot.out7ffd & 0x07);
        for bank in [5, 2, paged] {
            out.extend_from_slice(&snapshot.ram[bank]);
        }
        out.extend_from_slice(&regs.pc.to_le_bytes());
        out.extend_from_slice(&[snapshot.out7ffd, 0]);
        for bank in (0..8).filter(|&b| b != 5 && b != 2 && b != paged) {
            out.extend_from_slice(&snapshot.ram[bank]);
        }
        Ok(out)
    } else {
        let mut stacked = snapshot.clone();
        let sp = regs.sp.wrapping_sub(2);
        if sp < 0x4000 {
            return Err(SimError::invalid("SNA", format!("cannot push PC with SP=${:04X}", regs.sp)));
        }
        let [lo, hi] = regs.pc.to_le_bytes();
        stacked.poke(sp, lo);
        stacked.poke(sp.wrapping_add(1), hi);

        let mut out = Vec::with_capacity(SNA_48K_SIZE);
        write_header(&mut out, regs, sp, snapshot.border);
        for page in &stacked.ram {
            out.extend_from_slice(page);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_48k() -> Vec<u8> {
        let mut data = vec![0u8; SNA_48K_SIZE];
        data[0] = 0x3F; // I
        data[19] = 0x04; // IFF2
        data[22] = 0xAA; // A
        data[23] = 0x00; // SP = $8000
        data[24] = 0x80;
        data[25] = 1; // IM 1
        data[26] = 3; // border
        // PC $6000 on the stack at $8000.
        data[HEADER_SIZE + 0x4000] = 0x00;
        data[HEADER_SIZE + 0x4001] = 0x60;
        data
    }

    #[test]
    fn load_48k_pops_pc() {
        let snapshot = decode(&make_48k()).expect("valid SNA");
        assert_eq!(snapshot.model, SpectrumModel::Spectrum48K);
        assert_eq!(snapshot.registers.pc, 0x6000);
        assert_eq!(snapshot.registers.sp, 0x8002);
        assert_eq!(snapshot.registers.i, 0x3F);
        assert_eq!(snapshot.registers.a, 0xAA);
        assert!(snapshot.registers.iff1 && snapshot.registers.iff2);
        assert_eq!(snapshot.registers.im, 1);
        assert_eq!(snapshot.border, 3);
    }

    #[test]
    fn stack_in_rom_gives_pc_zero() {
        let mut data = make_48k();
        data[23] = 0x00;
        data[24] = 0x10;
        let snapshot = decode(&data).expect("valid SNA");
        assert_eq!(snapshot.registers.pc, 0);
    }

    #[test]
    fn wrong_size_is_invalid() {
        let err = decode(&[0; 100]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid SNA file: unexpected size 100 bytes");
    }

    #[test]
    fn encode_48k_pushes_pc() {
        let snapshot = decode(&make_48k()).expect("valid SNA");
        let bytes = encode(&snapshot).expect("encodes");
        assert_eq!(bytes, make_48k());
    }

    #[test]
    fn load_128k_bank_order() {
        let mut data = vec![0u8; SNA_128K_SIZE];
        let ext = HEADER_SIZE + RAM_SIZE;
        data[HEADER_SIZE] = 5;
        data[HEADER_SIZE + PAGE_SIZE] = 2;
        data[HEADER_SIZE + 2 * PAGE_SIZE] = 3;
        data[ext] = 0x34;
        data[ext + 1] = 0x12;
        data[ext + 2] = 0x03;
        // Remaining banks: 0, 1, 4, 6, 7.
        for (i, bank) in [0u8, 1, 4, 6, 7].into_iter().enumerate() {
            data[ext + 4 + i * PAGE_SIZE] = 0x10 + bank;
        }
        let snapshot = decode(&data).expect("valid SNA");
        assert_eq!(snapshot.model, SpectrumModel::Spectrum128K);
        assert_eq!(snapshot.registers.pc, 0x1234);
        assert_eq!(snapshot.out7ffd, 3);
        assert_eq!(snapshot.ram[5][0], 5);
        assert_eq!(snapshot.ram[2][0], 2);
        assert_eq!(snapshot.ram[3][0], 3);
        assert_eq!(snapshot.ram[6][0], 0x16);

        assert_eq!(encode(&snapshot).expect("encodes"), data);
    }

    #[test]
    fn long_128k_variant_when_bank_5_paged() {
        let mut data = vec![0u8; SNA_128K_LONG_SIZE];
        data[HEADER_SIZE + RAM_SIZE + 2] = 0x05;
        let snapshot = decode(&data).expect("valid SNA");
        assert_eq!(snapshot.out7ffd, 5);
        assert_eq!(encode(&snapshot).expect("encodes").len(), SNA_128K_LONG_SIZE);

        data.truncate(SNA_128K_SIZE);
        assert!(decode(&data).is_err());
    }
}
