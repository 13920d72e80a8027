//! Instruction execution.
//!
//! Opcodes are decoded by their octal fields: `x` (bits 6-7), `y` (bits
//! 3-5), `z` (bits 0-2), with `p = y >> 1` and `q = y & 1`. Register code 6
//! is the memory operand (HL), or (IX+d)/(IY+d) under a prefix.

use emu_core::Bus;

use super::{Z80, read16, write16};
use crate::alu::{self, add16, adc16, sbc16};
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, parity, sz53p};

/// True if a DD/FD prefix changes the meaning of `op`, i.e. `op` touches
/// HL, H, L or (HL).
#[must_use]
pub(crate) fn uses_hl(op: u8) -> bool {
    let y = (op >> 3) & 7;
    let z = op & 7;
    match op {
        0x09 | 0x19 | 0x29 | 0x39 | 0x21..=0x26 | 0x2A..=0x2E | 0x34..=0x36 => true,
        0x76 => false,
        0x40..=0x7F => (4..=6).contains(&y) || (4..=6).contains(&z),
        0x80..=0xBF => (4..=6).contains(&z),
        0xE1 | 0xE3 | 0xE5 | 0xE9 | 0xF9 => true,
        _ => false,
    }
}

impl Z80 {
    // === Register access ===

    /// HL, IX or IY depending on the prefix.
    fn index_reg(&self, prefix: u8) -> u16 {
        match prefix {
            0xDD => self.regs.ix,
            0xFD => self.regs.iy,
            _ => self.regs.hl(),
        }
    }

    fn set_index_reg(&mut self, prefix: u8, value: u16) {
        match prefix {
            0xDD => self.regs.ix = value,
            0xFD => self.regs.iy = value,
            _ => self.regs.set_hl(value),
        }
    }

    /// 8-bit register by code (B, C, D, E, H, L, -, A). Under a prefix, H
    /// and L become the halves of the index register. Code 6 reads as A
    /// and is never passed by the decoder.
    fn reg8(&self, code: u8, prefix: u8) -> u8 {
        match (code, prefix) {
            (0, _) => self.regs.b,
            (1, _) => self.regs.c,
            (2, _) => self.regs.d,
            (3, _) => self.regs.e,
            (4, 0xDD) => self.regs.ixh(),
            (4, 0xFD) => self.regs.iyh(),
            (4, _) => self.regs.h,
            (5, 0xDD) => self.regs.ixl(),
            (5, 0xFD) => self.regs.iyl(),
            (5, _) => self.regs.l,
            _ => self.regs.a,
        }
    }

    fn set_reg8(&mut self, code: u8, prefix: u8, value: u8) {
        match (code, prefix) {
            (0, _) => self.regs.b = value,
            (1, _) => self.regs.c = value,
            (2, _) => self.regs.d = value,
            (3, _) => self.regs.e = value,
            (4, 0xDD) => self.regs.set_ixh(value),
            (4, 0xFD) => self.regs.set_iyh(value),
            (4, _) => self.regs.h = value,
            (5, 0xDD) => self.regs.set_ixl(value),
            (5, 0xFD) => self.regs.set_iyl(value),
            (5, _) => self.regs.l = value,
            (6, _) => {}
            _ => self.regs.a = value,
        }
    }

    /// Register pair for LD/INC/DEC/ADD: BC, DE, HL (or index), SP.
    fn rp(&self, p: u8, prefix: u8) -> u16 {
        match p {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.index_reg(prefix),
            _ => self.regs.sp,
        }
    }

    fn set_rp(&mut self, p: u8, prefix: u8, value: u16) {
        match p {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.set_index_reg(prefix, value),
            _ => self.regs.sp = value,
        }
    }

    /// Register pair for PUSH/POP: AF takes the place of SP.
    fn rp2(&self, p: u8, prefix: u8) -> u16 {
        if p == 3 { self.regs.af() } else { self.rp(p, prefix) }
    }

    fn set_rp2(&mut self, p: u8, prefix: u8, value: u16) {
        if p == 3 {
            self.regs.set_af(value);
        } else {
            self.set_rp(p, prefix, value);
        }
    }

    /// Address of the memory operand: HL, or the index register plus a
    /// displacement fetched from the instruction stream.
    fn operand_addr<B: Bus>(&mut self, bus: &mut B, prefix: u8) -> u16 {
        if prefix == 0 {
            self.regs.hl()
        } else {
            let d = self.fetch_byte(bus) as i8;
            self.index_reg(prefix).wrapping_add_signed(i16::from(d))
        }
    }

    fn condition(&self, cc: u8) -> bool {
        let f = self.regs.f;
        match cc & 7 {
            0 => f & ZF == 0,
            1 => f & ZF != 0,
            2 => f & CF == 0,
            3 => f & CF != 0,
            4 => f & PF == 0,
            5 => f & PF != 0,
            6 => f & SF == 0,
            _ => f & SF != 0,
        }
    }

    fn jump_relative(&mut self, d: u8) {
        self.regs.pc = self.regs.pc.wrapping_add_signed(i16::from(d as i8));
    }

    // === Unprefixed and DD/FD-prefixed opcodes ===

    pub(super) fn execute_main<B: Bus>(
        &mut self,
        bus: &mut B,
        op: u8,
        prefix: u8,
    ) -> Result<u32, B::Error> {
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;
        let indexed = prefix != 0;
        // T-states for the plain and the prefixed form.
        let t = |plain: u32, with_index: u32| if indexed { with_index } else { plain };

        let tstates = match (x, z) {
            (0, 0) => match y {
                0 => 4,
                1 => {
                    std::mem::swap(&mut self.regs.a, &mut self.regs.a_alt);
                    std::mem::swap(&mut self.regs.f, &mut self.regs.f_alt);
                    4
                }
                2 => {
                    let d = self.fetch_byte(bus);
                    self.regs.b = self.regs.b.wrapping_sub(1);
                    if self.regs.b == 0 {
                        8
                    } else {
                        self.jump_relative(d);
                        13
                    }
                }
                3 => {
                    let d = self.fetch_byte(bus);
                    self.jump_relative(d);
                    12
                }
                _ => {
                    let d = self.fetch_byte(bus);
                    if self.condition(y - 4) {
                        self.jump_relative(d);
                        12
                    } else {
                        7
                    }
                }
            },
            (0, 1) => {
                if q == 0 {
                    let nn = self.fetch_word(bus);
                    self.set_rp(p, prefix, nn);
                    t(10, 14)
                } else {
                    let (value, f) = add16(self.index_reg(prefix), self.rp(p, prefix), self.regs.f);
                    self.set_index_reg(prefix, value);
                    self.regs.f = f;
                    t(11, 15)
                }
            }
            (0, 2) => match (p, q) {
                (0, 0) => {
                    bus.write(self.regs.bc(), self.regs.a);
                    7
                }
                (1, 0) => {
                    bus.write(self.regs.de(), self.regs.a);
                    7
                }
                (0, _) => {
                    self.regs.a = bus.read(self.regs.bc());
                    7
                }
                (1, _) => {
                    self.regs.a = bus.read(self.regs.de());
                    7
                }
                (2, 0) => {
                    let nn = self.fetch_word(bus);
                    write16(bus, nn, self.index_reg(prefix));
                    t(16, 20)
                }
                (2, _) => {
                    let nn = self.fetch_word(bus);
                    let value = read16(bus, nn);
                    self.set_index_reg(prefix, value);
                    t(16, 20)
                }
                (_, 0) => {
                    let nn = self.fetch_word(bus);
                    bus.write(nn, self.regs.a);
                    13
                }
                _ => {
                    let nn = self.fetch_word(bus);
                    self.regs.a = bus.read(nn);
                    13
                }
            },
            (0, 3) => {
                let value = self.rp(p, prefix);
                let value = if q == 0 { value.wrapping_add(1) } else { value.wrapping_sub(1) };
                self.set_rp(p, prefix, value);
                t(6, 10)
            }
            (0, 4 | 5) => {
                let step = if z == 4 { alu::inc8 } else { alu::dec8 };
                if y == 6 {
                    let addr = self.operand_addr(bus, prefix);
                    let r = step(bus.read(addr), self.regs.f);
                    bus.write(addr, r.value);
                    self.regs.f = r.flags;
                    t(11, 23)
                } else {
                    let r = step(self.reg8(y, prefix), self.regs.f);
                    self.set_reg8(y, prefix, r.value);
                    self.regs.f = r.flags;
                    t(4, 8)
                }
            }
            (0, 6) => {
                if y == 6 {
                    let addr = self.operand_addr(bus, prefix);
                    let n = self.fetch_byte(bus);
                    bus.write(addr, n);
                    t(10, 19)
                } else {
                    let n = self.fetch_byte(bus);
                    self.set_reg8(y, prefix, n);
                    t(7, 11)
                }
            }
            (0, _) => {
                let a = self.regs.a;
                let f = self.regs.f;
                match y {
                    0..=3 => {
                        let r = alu::rotate_a(y, a, f);
                        self.regs.a = r.value;
                        self.regs.f = r.flags;
                    }
                    4 => {
                        let r = alu::daa(a, f);
                        self.regs.a = r.value;
                        self.regs.f = r.flags;
                    }
                    5 => {
                        let value = !a;
                        self.regs.a = value;
                        self.regs.f = (f & (SF | ZF | PF | CF)) | (value & (YF | XF)) | HF | NF;
                    }
                    6 => self.regs.f = (f & (SF | ZF | PF)) | (a & (YF | XF)) | CF,
                    _ => {
                        let carry = if f & CF != 0 { HF } else { CF };
                        self.regs.f = (f & (SF | ZF | PF)) | (a & (YF | XF)) | carry;
                    }
                }
                4
            }
            (1, _) => {
                if y == 6 && z == 6 {
                    // HALT: stay on the opcode until an interrupt moves PC on.
                    self.regs.pc = self.regs.pc.wrapping_sub(1);
                    self.regs.halted = true;
                    4
                } else if z == 6 {
                    let addr = self.operand_addr(bus, prefix);
                    let value = bus.read(addr);
                    self.set_reg8(y, 0, value);
                    t(7, 19)
                } else if y == 6 {
                    let addr = self.operand_addr(bus, prefix);
                    bus.write(addr, self.reg8(z, 0));
                    t(7, 19)
                } else {
                    let value = self.reg8(z, prefix);
                    self.set_reg8(y, prefix, value);
                    t(4, 8)
                }
            }
            (2, _) => {
                let (n, tstates) = if z == 6 {
                    let addr = self.operand_addr(bus, prefix);
                    (bus.read(addr), t(7, 19))
                } else {
                    (self.reg8(z, prefix), t(4, 8))
                };
                let r = alu::alu_op(y, self.regs.a, n, self.regs.f);
                self.regs.a = r.value;
                self.regs.f = r.flags;
                tstates
            }
            (_, 0) => {
                if self.condition(y) {
                    self.regs.pc = self.pop16(bus);
                    11
                } else {
                    5
                }
            }
            (_, 1) => match (q, p) {
                (0, _) => {
                    let value = self.pop16(bus);
                    self.set_rp2(p, prefix, value);
                    t(10, 14)
                }
                (_, 0) => {
                    self.regs.pc = self.pop16(bus);
                    10
                }
                (_, 1) => {
                    let r = &mut self.regs;
                    std::mem::swap(&mut r.b, &mut r.b_alt);
                    std::mem::swap(&mut r.c, &mut r.c_alt);
                    std::mem::swap(&mut r.d, &mut r.d_alt);
                    std::mem::swap(&mut r.e, &mut r.e_alt);
                    std::mem::swap(&mut r.h, &mut r.h_alt);
                    std::mem::swap(&mut r.l, &mut r.l_alt);
                    4
                }
                (_, 2) => {
                    self.regs.pc = self.index_reg(prefix);
                    t(4, 8)
                }
                _ => {
                    self.regs.sp = self.index_reg(prefix);
                    t(6, 10)
                }
            },
            (_, 2) => {
                let nn = self.fetch_word(bus);
                if self.condition(y) {
                    self.regs.pc = nn;
                }
                10
            }
            (_, 3) => match y {
                0 => {
                    self.regs.pc = self.fetch_word(bus);
                    10
                }
                2 => {
                    let n = self.fetch_byte(bus);
                    bus.io_write(u16::from(self.regs.a) << 8 | u16::from(n), self.regs.a);
                    11
                }
                3 => {
                    let n = self.fetch_byte(bus);
                    let port = u16::from(self.regs.a) << 8 | u16::from(n);
                    self.regs.a = bus.io_read(port, self.tstates)?;
                    11
                }
                4 => {
                    let sp = self.regs.sp;
                    let value = read16(bus, sp);
                    write16(bus, sp, self.index_reg(prefix));
                    self.set_index_reg(prefix, value);
                    t(19, 23)
                }
                5 => {
                    let de = self.regs.de();
                    self.regs.set_de(self.regs.hl());
                    self.regs.set_hl(de);
                    4
                }
                6 => {
                    self.regs.iff1 = false;
                    self.regs.iff2 = false;
                    4
                }
                // y == 1 is the CB prefix, dispatched before we get here.
                _ => {
                    self.regs.iff1 = true;
                    self.regs.iff2 = true;
                    4
                }
            },
            (_, 4) => {
                let nn = self.fetch_word(bus);
                if self.condition(y) {
                    self.push16(bus, self.regs.pc);
                    self.regs.pc = nn;
                    17
                } else {
                    10
                }
            }
            (_, 5) => {
                if q == 0 {
                    self.push16(bus, self.rp2(p, prefix));
                    t(11, 15)
                } else {
                    // p == 0: CALL nn; the other slots are prefixes.
                    let nn = self.fetch_word(bus);
                    self.push16(bus, self.regs.pc);
                    self.regs.pc = nn;
                    17
                }
            }
            (_, 6) => {
                let n = self.fetch_byte(bus);
                let r = alu::alu_op(y, self.regs.a, n, self.regs.f);
                self.regs.a = r.value;
                self.regs.f = r.flags;
                7
            }
            _ => {
                self.push16(bus, self.regs.pc);
                self.regs.pc = u16::from(y) * 8;
                11
            }
        };
        Ok(tstates)
    }

    // === CB prefix ===

    pub(super) fn execute_cb<B: Bus>(&mut self, bus: &mut B, op: u8) -> u32 {
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let f = self.regs.f;

        if z == 6 {
            let hl = self.regs.hl();
            let v = bus.read(hl);
            match x {
                0 => {
                    let r = alu::rotate_shift(y, v, f);
                    bus.write(hl, r.value);
                    self.regs.f = r.flags;
                }
                1 => {
                    self.regs.f = alu::bit(y, v, v, f);
                    return 12;
                }
                2 => bus.write(hl, v & !(1 << y)),
                _ => bus.write(hl, v | (1 << y)),
            }
            15
        } else {
            let v = self.reg8(z, 0);
            match x {
                0 => {
                    let r = alu::rotate_shift(y, v, f);
                    self.set_reg8(z, 0, r.value);
                    self.regs.f = r.flags;
                }
                1 => self.regs.f = alu::bit(y, v, v, f),
                2 => self.set_reg8(z, 0, v & !(1 << y)),
                _ => self.set_reg8(z, 0, v | (1 << y)),
            }
            8
        }
    }

    /// DDCB/FDCB: the result of a rotate, RES or SET is also copied into
    /// register `z` unless `z` is 6.
    pub(super) fn execute_index_cb<B: Bus>(&mut self, bus: &mut B, prefix: u8, d: u8, op: u8) -> u32 {
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let base = self.index_reg(prefix);
        let addr = base.wrapping_add_signed(i16::from(d as i8));
        let v = bus.read(addr);

        if x == 1 {
            self.regs.f = alu::bit(y, v, (base >> 8) as u8, self.regs.f);
            return 20;
        }
        let value = match x {
            0 => {
                let r = alu::rotate_shift(y, v, self.regs.f);
                self.regs.f = r.flags;
                r.value
            }
            2 => v & !(1 << y),
            _ => v | (1 << y),
        };
        bus.write(addr, value);
        if z != 6 {
            self.set_reg8(z, 0, value);
        }
        23
    }

    // === ED prefix ===

    pub(super) fn execute_ed<B: Bus>(&mut self, bus: &mut B, op: u8) -> Result<u32, B::Error> {
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        if x == 2 && z <= 3 && y >= 4 {
            return self.execute_block(bus, y, z);
        }
        if x != 1 {
            return Ok(8);
        }

        let tstates = match z {
            0 => {
                let value = bus.io_read(self.regs.bc(), self.tstates)?;
                self.set_reg8(y, 0, value);
                self.regs.f = sz53p(value) | (self.regs.f & CF);
                12
            }
            1 => {
                let value = if y == 6 { 0 } else { self.reg8(y, 0) };
                bus.io_write(self.regs.bc(), value);
                12
            }
            2 => {
                let carry = self.regs.f & CF != 0;
                let hl = self.regs.hl();
                let rr = self.rp(p, 0);
                let (value, f) = if q == 0 { sbc16(hl, rr, carry) } else { adc16(hl, rr, carry) };
                self.regs.set_hl(value);
                self.regs.f = f;
                15
            }
            3 => {
                let nn = self.fetch_word(bus);
                if q == 0 {
                    write16(bus, nn, self.rp(p, 0));
                } else {
                    let value = read16(bus, nn);
                    self.set_rp(p, 0, value);
                }
                20
            }
            4 => {
                let r = alu::sub8(0, self.regs.a, false);
                self.regs.a = r.value;
                self.regs.f = r.flags;
                8
            }
            5 => {
                self.regs.pc = self.pop16(bus);
                self.regs.iff1 = self.regs.iff2;
                14
            }
            6 => {
                self.regs.im = [0, 0, 1, 2, 0, 0, 1, 2][usize::from(y)];
                8
            }
            _ => match y {
                0 => {
                    self.regs.i = self.regs.a;
                    9
                }
                1 => {
                    self.regs.r = self.regs.a;
                    9
                }
                2 | 3 => {
                    let a = if y == 2 { self.regs.i } else { self.regs.r };
                    self.regs.a = a;
                    let mut f = (a & (SF | YF | XF)) | (self.regs.f & CF);
                    if a == 0 {
                        f |= ZF;
                    }
                    if self.regs.iff2 {
                        f |= PF;
                    }
                    self.regs.f = f;
                    9
                }
                4 | 5 => {
                    let hl = self.regs.hl();
                    let m = bus.read(hl);
                    let a = self.regs.a;
                    let (mem, acc) = if y == 4 {
                        // RRD
                        (a << 4 | m >> 4, (a & 0xF0) | (m & 0x0F))
                    } else {
                        // RLD
                        (m << 4 | (a & 0x0F), (a & 0xF0) | m >> 4)
                    };
                    bus.write(hl, mem);
                    self.regs.a = acc;
                    self.regs.f = sz53p(acc) | (self.regs.f & CF);
                    18
                }
                _ => 8,
            },
        };
        Ok(tstates)
    }

    /// LDI/CPI/INI/OUTI and their decrementing and repeating forms.
    ///
    /// A repeating form that has not finished rewinds PC to its own first
    /// byte, so each iteration is a separate step costing two M1 cycles.
    fn execute_block<B: Bus>(&mut self, bus: &mut B, y: u8, z: u8) -> Result<u32, B::Error> {
        let decrement = y & 1 == 1;
        let repeat = y >= 6;
        let start = self.regs.pc.wrapping_sub(2);
        let start_hi = (start >> 8) as u8 & (YF | XF);
        let step16 = |v: u16| if decrement { v.wrapping_sub(1) } else { v.wrapping_add(1) };
        let hl = self.regs.hl();
        let f = self.regs.f;

        let again = match z {
            0 => {
                let v = bus.read(hl);
                bus.write(self.regs.de(), v);
                self.regs.set_hl(step16(hl));
                self.regs.set_de(step16(self.regs.de()));
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);
                let again = repeat && bc != 0;
                self.regs.f = if again {
                    (f & (SF | ZF | CF)) | start_hi | PF
                } else {
                    let n = self.regs.a.wrapping_add(v);
                    let mut flags = (f & (SF | ZF | CF)) | ((n & 0x02) << 4) | (n & XF);
                    if bc != 0 {
                        flags |= PF;
                    }
                    flags
                };
                again
            }
            1 => {
                let v = bus.read(hl);
                self.regs.set_hl(step16(hl));
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);
                let a = self.regs.a;
                let cp = i32::from(a) - i32::from(v);
                let half = (a & 0x0F) < (v & 0x0F);
                let mut flags = (cp as u8 & SF) | NF | (f & CF);
                if half {
                    flags |= HF;
                }
                let again = repeat && cp != 0 && bc != 0;
                if again {
                    flags |= start_hi | PF;
                } else {
                    let n = cp - i32::from(half);
                    flags |= (((n & 0x02) << 4) | (n & 0x08)) as u8;
                    if cp == 0 {
                        flags |= ZF;
                    }
                    if bc != 0 {
                        flags |= PF;
                    }
                }
                self.regs.f = flags;
                again
            }
            2 => {
                let value = bus.io_read(self.regs.bc(), self.tstates)?;
                bus.write(hl, value);
                let c = if decrement { self.regs.c.wrapping_sub(1) } else { self.regs.c.wrapping_add(1) };
                let b = self.regs.b.wrapping_sub(1);
                self.regs.b = b;
                self.regs.set_hl(step16(hl));
                let again = repeat && b != 0;
                self.regs.f = io_block_flags(b, value, u16::from(value) + u16::from(c), again, start_hi);
                again
            }
            _ => {
                let value = bus.read(hl);
                bus.io_write(self.regs.bc(), value);
                let b = self.regs.b.wrapping_sub(1);
                self.regs.b = b;
                self.regs.set_hl(step16(hl));
                let again = repeat && b != 0;
                let j = u16::from(self.regs.l) + u16::from(value);
                self.regs.f = io_block_flags(b, value, j, again, start_hi);
                again
            }
        };

        if again {
            self.regs.pc = start;
            Ok(21)
        } else {
            Ok(16)
        }
    }
}

/// Flags after INI/OUTI and friends. `b` is the decremented counter,
/// `value` the byte transferred and `j` the carry-producing sum.
fn io_block_flags(b: u8, value: u8, j: u16, again: bool, start_hi: u8) -> u8 {
    let n = (value & 0x80) >> 6;
    let carry = j > 0xFF;
    let j7 = (j & 7) as u8;
    if again {
        let (half, p) = if !carry {
            (false, parity(j7 ^ b ^ (b & 7)))
        } else if n != 0 {
            (b & 0x0F == 0, parity(j7 ^ b ^ (b.wrapping_sub(1) & 7)))
        } else {
            (b & 0x0F == 0x0F, parity(j7 ^ b ^ (b.wrapping_add(1) & 7)))
        };
        let mut f = (b & SF) | start_hi | p | n;
        if half {
            f |= HF;
        }
        if carry {
            f |= CF;
        }
        f
    } else {
        let mut f = (b & (SF | YF | XF)) | parity(j7 ^ b) | n;
        if b == 0 {
            f |= ZF;
        }
        if carry {
            f |= HF | CF;
        }
        f
    }
}
