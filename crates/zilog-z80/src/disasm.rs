//! Z80 disassembler producing the mnemonics used in execution traces.
//!
//! Numbers are hexadecimal with a `$` prefix. Index displacements render as
//! `(IX+$05)` or `(IX-$03)`; unknown ED opcodes as `DEFB $ED,$XX`.

use crate::cpu::uses_hl;

const R: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];
const RP: [&str; 4] = ["BC", "DE", "HL", "SP"];
const RP2: [&str; 4] = ["BC", "DE", "HL", "AF"];
const CC: [&str; 8] = ["NZ", "Z", "NC", "C", "PO", "PE", "P", "M"];
const ALU: [&str; 8] = ["ADD A,", "ADC A,", "SUB ", "SBC A,", "AND ", "XOR ", "OR ", "CP "];
const ROT: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SLL", "SRL"];
const X0Z7: [&str; 8] = ["RLCA", "RRCA", "RLA", "RRA", "DAA", "CPL", "SCF", "CCF"];
const BLOCK: [[&str; 4]; 4] = [
    ["LDI", "CPI", "INI", "OUTI"],
    ["LDD", "CPD", "IND", "OUTD"],
    ["LDIR", "CPIR", "INIR", "OTIR"],
    ["LDDR", "CPDR", "INDR", "OTDR"],
];

struct Reader<F> {
    peek: F,
    start: u16,
    len: u16,
}

impl<F: Fn(u16) -> u8> Reader<F> {
    fn byte(&mut self) -> u8 {
        let value = (self.peek)(self.start.wrapping_add(self.len));
        self.len += 1;
        value
    }

    fn word(&mut self) -> u16 {
        let lo = self.byte();
        let hi = self.byte();
        u16::from(hi) << 8 | u16::from(lo)
    }

    /// Address following the bytes read so far.
    fn next_addr(&self) -> u16 {
        self.start.wrapping_add(self.len)
    }

    fn relative(&mut self) -> String {
        let d = self.byte() as i8;
        format!("${:04X}", self.next_addr().wrapping_add_signed(i16::from(d)))
    }

    /// The memory operand: `(HL)`, or `(IX+$dd)` reading the displacement.
    fn memory(&mut self, index: Option<&str>) -> String {
        match index {
            None => "(HL)".to_string(),
            Some(ix) => displaced(ix, self.byte()),
        }
    }

    /// Register by code, with H and L naming index halves under a prefix.
    fn reg(&mut self, code: u8, index: Option<&str>) -> String {
        match (code, index) {
            (6, _) => self.memory(index),
            (4, Some(ix)) => format!("{ix}H"),
            (5, Some(ix)) => format!("{ix}L"),
            _ => R[usize::from(code)].to_string(),
        }
    }
}

fn displaced(ix: &str, d: u8) -> String {
    let d = d as i8;
    if d < 0 {
        format!("({ix}-${:02X})", -i16::from(d))
    } else {
        format!("({ix}+${d:02X})")
    }
}

/// Disassemble the instruction at `addr`, reading bytes through `peek`.
///
/// Returns the mnemonic and the address of the following instruction. A DD
/// or FD prefix that does not modify the next opcode disassembles on its
/// own as `DEFB $DD`, mirroring how the CPU executes it.
pub fn disassemble(peek: impl Fn(u16) -> u8, addr: u16) -> (String, u16) {
    let mut rd = Reader { peek, start: addr, len: 0 };
    let op = rd.byte();
    let text = match op {
        0xCB => cb(rd.byte()),
        0xED => ed(&mut rd),
        0xDD | 0xFD => {
            let ix = if op == 0xDD { "IX" } else { "IY" };
            let next = (rd.peek)(rd.next_addr());
            if next == 0xCB {
                rd.byte();
                let d = rd.byte();
                let op3 = rd.byte();
                index_cb(ix, d, op3)
            } else if uses_hl(next) {
                rd.byte();
                unprefixed(&mut rd, next, Some(ix))
            } else {
                format!("DEFB ${op:02X}")
            }
        }
        _ => unprefixed(&mut rd, op, None),
    };
    (text, rd.next_addr())
}

fn unprefixed<F: Fn(u16) -> u8>(rd: &mut Reader<F>, op: u8, index: Option<&str>) -> String {
    let x = op >> 6;
    let y = (op >> 3) & 7;
    let z = op & 7;
    let p = usize::from(y >> 1);
    let q = y & 1;
    let hl = index.unwrap_or("HL");
    let rp = |p: usize| if p == 2 { hl } else { RP[p] };

    match (x, z) {
        (0, 0) => match y {
            0 => "NOP".to_string(),
            1 => "EX AF,AF'".to_string(),
            2 => format!("DJNZ {}", rd.relative()),
            3 => format!("JR {}", rd.relative()),
            _ => format!("JR {},{}", CC[usize::from(y - 4)], rd.relative()),
        },
        (0, 1) if q == 0 => format!("LD {},${:04X}", rp(p), rd.word()),
        (0, 1) => format!("ADD {hl},{}", rp(p)),
        (0, 2) => match (p, q) {
            (0, 0) => "LD (BC),A".to_string(),
            (0, _) => "LD A,(BC)".to_string(),
            (1, 0) => "LD (DE),A".to_string(),
            (1, _) => "LD A,(DE)".to_string(),
            (2, 0) => format!("LD (${:04X}),{hl}", rd.word()),
            (2, _) => format!("LD {hl},(${:04X})", rd.word()),
            (_, 0) => format!("LD (${:04X}),A", rd.word()),
            _ => format!("LD A,(${:04X})", rd.word()),
        },
        (0, 3) => format!("{} {}", if q == 0 { "INC" } else { "DEC" }, rp(p)),
        (0, 4) => format!("INC {}", rd.reg(y, index)),
        (0, 5) => format!("DEC {}", rd.reg(y, index)),
        (0, 6) => {
            let dst = rd.reg(y, index);
            format!("LD {dst},${:02X}", rd.byte())
        }
        (0, _) => X0Z7[usize::from(y)].to_string(),
        (1, _) if y == 6 && z == 6 => "HALT".to_string(),
        (1, _) if y == 6 => format!("LD {},{}", rd.memory(index), R[usize::from(z)]),
        (1, _) if z == 6 => format!("LD {},{}", R[usize::from(y)], rd.memory(index)),
        (1, _) => {
            let dst = rd.reg(y, index);
            format!("LD {dst},{}", rd.reg(z, index))
        }
        (2, _) => format!("{}{}", ALU[usize::from(y)], rd.reg(z, index)),
        (_, 0) => format!("RET {}", CC[usize::from(y)]),
        (_, 1) if q == 0 => format!("POP {}", if p == 2 { hl } else { RP2[p] }),
        (_, 1) => match p {
            0 => "RET".to_string(),
            1 => "EXX".to_string(),
            2 => format!("JP ({hl})"),
            _ => format!("LD SP,{hl}"),
        },
        (_, 2) => format!("JP {},${:04X}", CC[usize::from(y)], rd.word()),
        (_, 3) => match y {
            0 => format!("JP ${:04X}", rd.word()),
            2 => format!("OUT (${:02X}),A", rd.byte()),
            3 => format!("IN A,(${:02X})", rd.byte()),
            4 => format!("EX (SP),{hl}"),
            5 => "EX DE,HL".to_string(),
            6 => "DI".to_string(),
            _ => "EI".to_string(),
        },
        (_, 4) => format!("CALL {},${:04X}", CC[usize::from(y)], rd.word()),
        (_, 5) if q == 0 => format!("PUSH {}", if p == 2 { hl } else { RP2[p] }),
        (_, 5) => format!("CALL ${:04X}", rd.word()),
        (_, 6) => format!("{}${:02X}", ALU[usize::from(y)], rd.byte()),
        _ => format!("RST ${:02X}", y * 8),
    }
}

fn cb(op: u8) -> String {
    let y = (op >> 3) & 7;
    let r = R[usize::from(op & 7)];
    match op >> 6 {
        0 => format!("{} {r}", ROT[usize::from(y)]),
        1 => format!("BIT {y},{r}"),
        2 => format!("RES {y},{r}"),
        _ => format!("SET {y},{r}"),
    }
}

fn index_cb(ix: &str, d: u8, op: u8) -> String {
    let y = (op >> 3) & 7;
    let z = op & 7;
    let mem = displaced(ix, d);
    let base = match op >> 6 {
        0 => format!("{} {mem}", ROT[usize::from(y)]),
        1 => return format!("BIT {y},{mem}"),
        2 => format!("RES {y},{mem}"),
        _ => format!("SET {y},{mem}"),
    };
    if z == 6 { base } else { format!("{base},{}", R[usize::from(z)]) }
}

fn ed<F: Fn(u16) -> u8>(rd: &mut Reader<F>) -> String {
    let op = rd.byte();
    let x = op >> 6;
    let y = (op >> 3) & 7;
    let z = op & 7;
    let p = usize::from(y >> 1);
    let q = y & 1;

    if x == 2 && z <= 3 && y >= 4 {
        return BLOCK[usize::from(y - 4)][usize::from(z)].to_string();
    }
    if x != 1 {
        return format!("DEFB $ED,${op:02X}");
    }
    match z {
        0 if y == 6 => "IN F,(C)".to_string(),
        0 => format!("IN {},(C)", R[usize::from(y)]),
        1 if y == 6 => "OUT (C),0".to_string(),
        1 => format!("OUT (C),{}", R[usize::from(y)]),
        2 => format!("{} HL,{}", if q == 0 { "SBC" } else { "ADC" }, RP[p]),
        3 if q == 0 => format!("LD (${:04X}),{}", rd.word(), RP[p]),
        3 => format!("LD {},(${:04X})", RP[p], rd.word()),
        4 => "NEG".to_string(),
        5 if y == 1 => "RETI".to_string(),
        5 => "RETN".to_string(),
        6 => format!("IM {}", [0, 0, 1, 2, 0, 0, 1, 2][usize::from(y)]),
        _ => match y {
            0 => "LD I,A".to_string(),
            1 => "LD R,A".to_string(),
            2 => "LD A,I".to_string(),
            3 => "LD A,R".to_string(),
            4 => "RRD".to_string(),
            5 => "RLD".to_string(),
            _ => format!("DEFB $ED,${op:02X}"),
        },
    }
}
