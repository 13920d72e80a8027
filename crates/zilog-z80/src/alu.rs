//! ALU operations for the Z80.
//!
//! Every function is pure: operands and the incoming flags go in, the
//! result and the new flags come out.

#![allow(clippy::verbose_bit_mask)] // Clearer to read mask comparisons.

use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, sz53, sz53p};

/// Result of an 8-bit ALU operation with flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    pub flags: u8,
}

const fn result(value: u8, flags: u8) -> AluResult {
    AluResult { value, flags }
}

#[must_use]
pub fn add8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let sum = u16::from(a) + u16::from(b) + u16::from(c);
    let value = sum as u8;
    let mut flags = sz53(value);
    if (a & 0x0F) + (b & 0x0F) + c > 0x0F {
        flags |= HF;
    }
    // Overflow: operands share a sign the result lacks
    if (a ^ b) & 0x80 == 0 && (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if sum > 0xFF {
        flags |= CF;
    }
    result(value, flags)
}

#[must_use]
pub fn sub8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let value = a.wrapping_sub(b).wrapping_sub(c);
    let mut flags = sz53(value) | NF;
    if (a & 0x0F) < (b & 0x0F) + c {
        flags |= HF;
    }
    if (a ^ b) & 0x80 != 0 && (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if u16::from(a) < u16::from(b) + u16::from(c) {
        flags |= CF;
    }
    result(value, flags)
}

/// Compare: flags of `a - b`, with bits 5 and 3 taken from the operand.
#[must_use]
pub fn cp8(a: u8, b: u8) -> AluResult {
    let sub = sub8(a, b, false);
    result(a, (sub.flags & !(YF | XF)) | (b & (YF | XF)))
}

#[must_use]
pub fn and8(a: u8, b: u8) -> AluResult {
    let value = a & b;
    result(value, sz53p(value) | HF)
}

#[must_use]
pub fn xor8(a: u8, b: u8) -> AluResult {
    let value = a ^ b;
    result(value, sz53p(value))
}

#[must_use]
pub fn or8(a: u8, b: u8) -> AluResult {
    let value = a | b;
    result(value, sz53p(value))
}

/// One of the eight accumulator operations, selected by bits 3-5 of the opcode.
#[must_use]
pub fn alu_op(op: u8, a: u8, n: u8, flags: u8) -> AluResult {
    let carry = flags & CF != 0;
    match op & 7 {
        0 => add8(a, n, false),
        1 => add8(a, n, carry),
        2 => sub8(a, n, false),
        3 => sub8(a, n, carry),
        4 => and8(a, n),
        5 => xor8(a, n),
        6 => or8(a, n),
        _ => cp8(a, n),
    }
}

#[must_use]
pub fn inc8(v: u8, flags: u8) -> AluResult {
    let value = v.wrapping_add(1);
    let mut f = (flags & CF) | sz53(value);
    if value & 0x0F == 0 {
        f |= HF;
    }
    if value == 0x80 {
        f |= PF;
    }
    result(value, f)
}

#[must_use]
pub fn dec8(v: u8, flags: u8) -> AluResult {
    let value = v.wrapping_sub(1);
    let mut f = (flags & CF) | sz53(value) | NF;
    if value & 0x0F == 0x0F {
        f |= HF;
    }
    if value == 0x7F {
        f |= PF;
    }
    result(value, f)
}

/// CB-prefixed rotate/shift selected by bits 3-5 of the opcode:
/// RLC, RRC, RL, RR, SLA, SRA, SLL, SRL.
#[must_use]
pub fn rotate_shift(op: u8, v: u8, flags: u8) -> AluResult {
    let carry_in = flags & CF;
    let (value, carry) = match op & 7 {
        0 => (v.rotate_left(1), v >> 7),
        1 => (v.rotate_right(1), v & 1),
        2 => (v << 1 | carry_in, v >> 7),
        3 => (v >> 1 | carry_in << 7, v & 1),
        4 => (v << 1, v >> 7),
        5 => (v >> 1 | (v & 0x80), v & 1),
        6 => (v << 1 | 1, v >> 7),
        _ => (v >> 1, v & 1),
    };
    result(value, sz53p(value) | carry)
}

/// RLCA, RRCA, RLA, RRA: like the CB rotates but S, Z and P are preserved.
#[must_use]
pub fn rotate_a(op: u8, a: u8, flags: u8) -> AluResult {
    let r = rotate_shift(op, a, flags);
    let f = (flags & (SF | ZF | PF)) | (r.value & (YF | XF)) | (r.flags & CF);
    result(r.value, f)
}

/// BIT n: `source` supplies bits 5 and 3.
#[must_use]
pub fn bit(n: u8, v: u8, source: u8, flags: u8) -> u8 {
    let mut f = HF | (flags & CF) | (source & (YF | XF));
    if v & (1 << n) == 0 {
        f |= ZF | PF;
    } else if n == 7 {
        f |= SF;
    }
    f
}

#[must_use]
pub fn daa(a: u8, flags: u8) -> AluResult {
    let h = flags & HF != 0;
    let n = flags & NF != 0;
    let c = flags & CF != 0;
    let low = a & 0x0F;
    let mut adjust = 0;
    if h || low > 9 {
        adjust |= 0x06;
    }
    let carry = c || a > 0x99;
    if carry {
        adjust |= 0x60;
    }
    let value = if n { a.wrapping_sub(adjust) } else { a.wrapping_add(adjust) };
    let half = if n { h && low < 6 } else { low > 9 };
    let mut f = sz53p(value) | (flags & NF);
    if half {
        f |= HF;
    }
    if carry {
        f |= CF;
    }
    result(value, f)
}

/// ADD HL,rr: S, Z and P preserved; bits 5 and 3 from the high byte.
#[must_use]
pub fn add16(a: u16, b: u16, flags: u8) -> (u16, u8) {
    let sum = u32::from(a) + u32::from(b);
    let value = sum as u16;
    let mut f = (flags & (SF | ZF | PF)) | ((value >> 8) as u8 & (YF | XF));
    if (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF {
        f |= HF;
    }
    if sum > 0xFFFF {
        f |= CF;
    }
    (value, f)
}

#[must_use]
pub fn adc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let sum = u32::from(a) + u32::from(b) + u32::from(c);
    let value = sum as u16;
    let mut f = (value >> 8) as u8 & (SF | YF | XF);
    if value == 0 {
        f |= ZF;
    }
    if (a & 0x0FFF) + (b & 0x0FFF) + c > 0x0FFF {
        f |= HF;
    }
    if (a ^ b) & 0x8000 == 0 && (a ^ value) & 0x8000 != 0 {
        f |= PF;
    }
    if sum > 0xFFFF {
        f |= CF;
    }
    (value, f)
}

#[must_use]
pub fn sbc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let value = a.wrapping_sub(b).wrapping_sub(c);
    let mut f = ((value >> 8) as u8 & (SF | YF | XF)) | NF;
    if value == 0 {
        f |= ZF;
    }
    if (a & 0x0FFF) < (b & 0x0FFF) + c {
        f |= HF;
    }
    if (a ^ b) & 0x8000 != 0 && (a ^ value) & 0x8000 != 0 {
        f |= PF;
    }
    if u32::from(a) < u32::from(b) + u32::from(c) {
        f |= CF;
    }
    (value, f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_overflow_and_half_carry() {
        let r = add8(0x7F, 0x01, false);
        assert_eq!(r.value, 0x80);
        assert_eq!(r.flags, SF | HF | PF);
    }

    #[test]
    fn sub_borrow_sets_carry() {
        let r = sub8(0x00, 0x01, false);
        assert_eq!(r.value, 0xFF);
        assert_eq!(r.flags, SF | YF | HF | XF | NF | CF);
    }

    #[test]
    fn cp_takes_undocumented_bits_from_operand() {
        let r = cp8(0x00, 0x28);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.flags & (YF | XF), YF | XF);
        assert_ne!(r.flags & CF, 0);
    }

    #[test]
    fn daa_after_bcd_addition() {
        // 0x15 + 0x27 = 0x3C, adjusted to 0x42
        let r = daa(0x3C, 0);
        assert_eq!(r.value, 0x42);
        assert_eq!(r.flags & CF, 0);
        assert_ne!(r.flags & HF, 0);
    }

    #[test]
    fn daa_after_bcd_subtraction() {
        // 0x42 - 0x15 = 0x2D with half borrow, adjusted to 0x27
        let r = daa(0x2D, NF | HF);
        assert_eq!(r.value, 0x27);
        assert_ne!(r.flags & NF, 0);
    }

    #[test]
    fn inc_preserves_carry() {
        let r = inc8(0x7F, CF);
        assert_eq!(r.value, 0x80);
        assert_eq!(r.flags, SF | HF | PF | CF);
    }

    #[test]
    fn sll_sets_bit_zero() {
        let r = rotate_shift(6, 0x80, 0);
        assert_eq!(r.value, 0x01);
        assert_ne!(r.flags & CF, 0);
    }

    #[test]
    fn bit_seven_sets_sign() {
        assert_eq!(bit(7, 0x80, 0x80, 0), SF | HF);
        assert_eq!(bit(0, 0x00, 0x28, CF), ZF | PF | HF | YF | XF | CF);
    }

    #[test]
    fn sbc16_zero_result() {
        let (v, f) = sbc16(0x1000, 0x0FFF, true);
        assert_eq!(v, 0);
        assert_eq!(f & (ZF | NF), ZF | NF);
    }

    #[test]
    fn add16_keeps_sign_zero_parity() {
        let (v, f) = add16(0xFFFF, 0x0001, SF | ZF | PF);
        assert_eq!(v, 0);
        assert_eq!(f, SF | ZF | PF | HF | CF);
    }
}
