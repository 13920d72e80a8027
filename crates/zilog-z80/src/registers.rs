//! Z80 register set.

/// Z80 registers.
///
/// `r` holds all eight bits; the CPU only ever increments the low seven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    // Main registers
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    // Alternate registers
    pub a_alt: u8,
    pub f_alt: u8,
    pub b_alt: u8,
    pub c_alt: u8,
    pub d_alt: u8,
    pub e_alt: u8,
    pub h_alt: u8,
    pub l_alt: u8,

    // Index registers
    pub ix: u16,
    pub iy: u16,

    // Other registers
    pub sp: u16,
    pub pc: u16,
    pub i: u8,
    pub r: u8,

    // Interrupt state
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,

    /// Set while the CPU sits on a HALT instruction.
    pub halted: bool,
}

const fn pair(hi: u8, lo: u8) -> u16 {
    (hi as u16) << 8 | lo as u16
}

const fn split(value: u16) -> (u8, u8) {
    ((value >> 8) as u8, value as u8)
}

impl Registers {
    #[must_use]
    pub const fn af(&self) -> u16 {
        pair(self.a, self.f)
    }

    #[must_use]
    pub const fn bc(&self) -> u16 {
        pair(self.b, self.c)
    }

    #[must_use]
    pub const fn de(&self) -> u16 {
        pair(self.d, self.e)
    }

    #[must_use]
    pub const fn hl(&self) -> u16 {
        pair(self.h, self.l)
    }

    #[must_use]
    pub const fn af_alt(&self) -> u16 {
        pair(self.a_alt, self.f_alt)
    }

    #[must_use]
    pub const fn bc_alt(&self) -> u16 {
        pair(self.b_alt, self.c_alt)
    }

    #[must_use]
    pub const fn de_alt(&self) -> u16 {
        pair(self.d_alt, self.e_alt)
    }

    #[must_use]
    pub const fn hl_alt(&self) -> u16 {
        pair(self.h_alt, self.l_alt)
    }

    #[must_use]
    pub const fn ixh(&self) -> u8 {
        (self.ix >> 8) as u8
    }

    #[must_use]
    pub const fn ixl(&self) -> u8 {
        self.ix as u8
    }

    #[must_use]
    pub const fn iyh(&self) -> u8 {
        (self.iy >> 8) as u8
    }

    #[must_use]
    pub const fn iyl(&self) -> u8 {
        self.iy as u8
    }

    pub fn set_af(&mut self, value: u16) {
        (self.a, self.f) = split(value);
    }

    pub fn set_bc(&mut self, value: u16) {
        (self.b, self.c) = split(value);
    }

    pub fn set_de(&mut self, value: u16) {
        (self.d, self.e) = split(value);
    }

    pub fn set_hl(&mut self, value: u16) {
        (self.h, self.l) = split(value);
    }

    pub fn set_af_alt(&mut self, value: u16) {
        (self.a_alt, self.f_alt) = split(value);
    }

    pub fn set_bc_alt(&mut self, value: u16) {
        (self.b_alt, self.c_alt) = split(value);
    }

    pub fn set_de_alt(&mut self, value: u16) {
        (self.d_alt, self.e_alt) = split(value);
    }

    pub fn set_hl_alt(&mut self, value: u16) {
        (self.h_alt, self.l_alt) = split(value);
    }

    pub fn set_ixh(&mut self, value: u8) {
        self.ix = (self.ix & 0x00FF) | u16::from(value) << 8;
    }

    pub fn set_ixl(&mut self, value: u8) {
        self.ix = (self.ix & 0xFF00) | u16::from(value);
    }

    pub fn set_iyh(&mut self, value: u8) {
        self.iy = (self.iy & 0x00FF) | u16::from(value) << 8;
    }

    pub fn set_iyl(&mut self, value: u8) {
        self.iy = (self.iy & 0xFF00) | u16::from(value);
    }

    /// Set a register by its assembler name (`A`, `HL`, `^BC`, `IXH`, `SP`...).
    ///
    /// Shadow registers take a `^` prefix. Names are case-insensitive and
    /// 8-bit registers keep only the low byte of `value`. Returns false for
    /// an unknown name.
    pub fn set_named(&mut self, name: &str, value: u16) -> bool {
        let byte = value as u8;
        match name.to_ascii_uppercase().as_str() {
            "A" => self.a = byte,
            "F" => self.f = byte,
            "B" => self.b = byte,
            "C" => self.c = byte,
            "D" => self.d = byte,
            "E" => self.e = byte,
            "H" => self.h = byte,
            "L" => self.l = byte,
            "I" => self.i = byte,
            "R" => self.r = byte,
            "IXH" => self.set_ixh(byte),
            "IXL" => self.set_ixl(byte),
            "IYH" => self.set_iyh(byte),
            "IYL" => self.set_iyl(byte),
            "AF" => self.set_af(value),
            "BC" => self.set_bc(value),
            "DE" => self.set_de(value),
            "HL" => self.set_hl(value),
            "IX" => self.ix = value,
            "IY" => self.iy = value,
            "SP" => self.sp = value,
            "PC" => self.pc = value,
            "^A" => self.a_alt = byte,
            "^F" => self.f_alt = byte,
            "^B" => self.b_alt = byte,
            "^C" => self.c_alt = byte,
            "^D" => self.d_alt = byte,
            "^E" => self.e_alt = byte,
            "^H" => self.h_alt = byte,
            "^L" => self.l_alt = byte,
            "^AF" => self.set_af_alt(value),
            "^BC" => self.set_bc_alt(value),
            "^DE" => self.set_de_alt(value),
            "^HL" => self.set_hl_alt(value),
            _ => return false,
        }
        true
    }

    /// Multi-line register dump in the layout the front-ends print on exit.
    #[must_use]
    pub fn dump(&self) -> Vec<String> {
        let flags = |f: u8| {
            "SZ5H3PNC"
                .chars()
                .enumerate()
                .map(|(i, c)| if f & (0x80 >> i) != 0 { c } else { '.' })
                .collect::<String>()
        };
        vec![
            format!("  PC={:<5}  SP={:<5}  IX={:<5}  IY={:<5}", self.pc, self.sp, self.ix, self.iy),
            format!("   A={:<3}  F={}   A'={:<3}  F'={}", self.a, flags(self.f), self.a_alt, flags(self.f_alt)),
            format!("  BC={:<5}  DE={:<5}  HL={:<5}", self.bc(), self.de(), self.hl()),
            format!(" BC'={:<5} DE'={:<5} HL'={:<5}", self.bc_alt(), self.de_alt(), self.hl_alt()),
            format!("   I={:<3}  R={:<3}  IFF1={}  IFF2={}  IM={}", self.i, self.r, u8::from(self.iff1), u8::from(self.iff2), self.im),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_split_high_and_low() {
        let mut regs = Registers::default();
        regs.set_hl(0x1234);
        assert_eq!((regs.h, regs.l), (0x12, 0x34));
        regs.set_ixl(0xCD);
        regs.set_ixh(0xAB);
        assert_eq!(regs.ix, 0xABCD);
    }

    #[test]
    fn set_named_handles_shadow_and_case() {
        let mut regs = Registers::default();
        assert!(regs.set_named("^hl", 0xBEEF));
        assert!(regs.set_named("a", 0x1FF));
        assert!(!regs.set_named("XYZ", 1));
        assert_eq!(regs.hl_alt(), 0xBEEF);
        assert_eq!(regs.a, 0xFF);
    }

    #[test]
    fn dump_shows_flag_letters() {
        let regs = Registers { f: 0x41, ..Registers::default() };
        assert!(regs.dump()[1].contains("F=.Z.....C"));
    }
}
