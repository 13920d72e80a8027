//! Z80 flag register bits and precomputed flag tables.

/// Sign flag (bit 7) - copy of bit 7 of the result.
pub const SF: u8 = 0b1000_0000;

/// Zero flag (bit 6).
pub const ZF: u8 = 0b0100_0000;

/// Undocumented flag (bit 5).
pub const YF: u8 = 0b0010_0000;

/// Half-carry flag (bit 4) - carry from bit 3 to bit 4.
pub const HF: u8 = 0b0001_0000;

/// Undocumented flag (bit 3).
pub const XF: u8 = 0b0000_1000;

/// Parity/Overflow flag (bit 2).
pub const PF: u8 = 0b0000_0100;

/// Add/Subtract flag (bit 1).
pub const NF: u8 = 0b0000_0010;

/// Carry flag (bit 0).
pub const CF: u8 = 0b0000_0001;

const fn build_sz53p() -> [u8; 256] {
    let mut table = [0; 256];
    let mut v = 0;
    while v < 256 {
        let b = v as u8;
        let mut f = b & (SF | YF | XF);
        if b == 0 {
            f |= ZF;
        }
        if b.count_ones() % 2 == 0 {
            f |= PF;
        }
        table[v] = f;
        v += 1;
    }
    table
}

/// S, Z, 5, 3 and P flags for every byte value.
static SZ53P: [u8; 256] = build_sz53p();

/// Even-parity flag (`PF` or 0) for a byte.
#[must_use]
pub fn parity(value: u8) -> u8 {
    SZ53P[usize::from(value)] & PF
}

/// S, Z, 5 and 3 flags for a result byte.
#[must_use]
pub fn sz53(value: u8) -> u8 {
    SZ53P[usize::from(value)] & !PF
}

/// S, Z, 5, 3 and parity flags for a result byte.
#[must_use]
pub fn sz53p(value: u8) -> u8 {
    SZ53P[usize::from(value)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_has_zero_and_parity() {
        assert_eq!(sz53p(0), ZF | PF);
        assert_eq!(sz53(0), ZF);
    }

    #[test]
    fn undocumented_bits_follow_value() {
        assert_eq!(sz53(0x28), YF | XF);
        assert_eq!(sz53p(0x80), SF);
        assert_eq!(parity(0x03), PF);
        assert_eq!(parity(0x07), 0);
    }
}
