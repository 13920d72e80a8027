//! Timing profiles of known tape-loader edge-sampling loops.
//!
//! Each profile describes a loop that starts with `INC B` (or `DEC B`),
//! samples port `$FE` once per iteration and exits when the EAR bit
//! changes. Knowing the loop's exact cost lets the tape driver skip whole
//! iterations while the signal is steady.

/// How the loop counter moves each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// `INC B`; the loop times out when B wraps to 0.
    IncB,
    /// `DEC B`; the loop times out when B reaches 0.
    DecB,
}

/// An edge-sampling loop profile.
#[derive(Debug, PartialEq, Eq)]
pub struct Accelerator {
    pub name: &'static str,
    /// Loop body starting at the counter opcode. `None` matches any byte.
    pub pattern: &'static [Option<u8>],
    /// T-states from the counter opcode to the port read.
    pub in_time: u64,
    /// T-states per iteration while the edge has not arrived.
    pub loop_time: u64,
    /// R increment per iteration.
    pub r_inc: u32,
    pub ear_mask: u8,
    pub counter: Counter,
}

impl Accelerator {
    /// True if the loop body is present at `pc`.
    pub fn matches(&self, peek: impl Fn(u16) -> u8, pc: u16) -> bool {
        self.pattern
            .iter()
            .enumerate()
            .all(|(i, byte)| byte.is_none_or(|b| peek(pc.wrapping_add(i as u16)) == b))
    }

    /// Number of iterations the loop can run before B ends it.
    #[must_use]
    pub fn counter_limit(&self, b: u8) -> u64 {
        match self.counter {
            Counter::IncB => u64::from(0xFF - b),
            Counter::DecB => u64::from(b.wrapping_add(0xFF)),
        }
    }

    /// True if a loop that reads `value` from port $FE with the edge
    /// register at `c` goes round again.
    #[must_use]
    pub fn keeps_waiting(&self, value: u8, c: u8) -> bool {
        // RRA loops test EAR (bit 6) in bit 5.
        let sampled = if self.ear_mask == 0x20 { value >> 1 } else { value };
        (sampled ^ c) & self.ear_mask == 0
    }

    /// B after `n` iterations.
    #[must_use]
    pub fn advance_counter(&self, b: u8, n: u64) -> u8 {
        let n = n as u8;
        match self.counter {
            Counter::IncB => b.wrapping_add(n),
            Counter::DecB => b.wrapping_sub(n),
        }
    }
}

/// Byte pattern literal; `X` is a wildcard.
macro_rules! code {
    ($($b:tt),* $(,)?) => { &[$(code!(@ $b)),*] };
    (@ X) => { None };
    (@ $b:expr) => { Some($b) };
}

/// Shorthand for the common `INC B` profile shape.
const fn inc_b(
    name: &'static str,
    pattern: &'static [Option<u8>],
    in_time: u64,
    loop_time: u64,
    r_inc: u32,
    ear_mask: u8,
) -> Accelerator {
    Accelerator {
        name,
        pattern,
        in_time,
        loop_time,
        r_inc,
        ear_mask,
        counter: Counter::IncB,
    }
}

static PROFILES: [Accelerator; 20] = [
    inc_b("alkatraz", code![0x04, 0x20, 0x03, X, X, X, 0xDB, 0xFE, 0x1F, 0xC8, 0xA9, 0xE6, 0x20, 0x28, 0xF1], 16, 59, 8, 0x20),
    inc_b("alkatraz2", code![0x04, 0x20, 0x01, 0xC9, 0xDB, 0xFE, 0x1F, 0xC8, 0xA9, 0xE6, 0x20, 0x28, 0xF3], 16, 59, 8, 0x20),
    inc_b("alternative", code![0x04, 0xC8, 0x3E, 0x7F, 0xDB, 0xFE, 0xCB, 0x1F, 0x00, 0xA9, 0xE6, 0x20, 0x28, 0xF2], 16, 62, 10, 0x20),
    inc_b("bleepload", code![0x04, 0xC8, 0x3E, 0x7F, 0xDB, 0xFE, 0x1F, 0x00, 0xA9, 0xE6, 0x20, 0x28, 0xF3], 16, 58, 9, 0x20),
    inc_b("crl", code![0x04, 0xC8, 0x3E, 0x7F, 0xDB, 0xFE, 0xB7, 0xD8, 0xA9, 0xE6, 0x40, 0x28, 0xF3], 16, 59, 9, 0x40),
    inc_b("cybexlab", code![0x04, 0xC8, 0xAF, 0xDB, 0xFE, 0x1F, 0xD0, 0xA9, 0xE6, 0x20, 0x28, 0xF4], 13, 56, 9, 0x20),
    inc_b("design-design", code![0x04, 0xCA, X, X, 0x3E, 0x7F, 0xDB, 0xFE, 0x1F, 0xA9, 0xE6, 0x20, 0x28, 0xF2], 21, 59, 8, 0x20),
    Accelerator {
        name: "digital-integration",
        pattern: code![0x05, 0xC8, 0xDB, 0xFE, 0xA9, 0xE6, 0x40, 0xCA],
        in_time: 9,
        loop_time: 41,
        r_inc: 6,
        ear_mask: 0x40,
        counter: Counter::DecB,
    },
    inc_b("dinaload", code![0x04, 0xC8, 0x3E, 0xFF, 0xDB, 0xFE, 0x1F, 0xD0, 0xA9, 0xE6, 0x20, 0x28, 0xF3], 16, 59, 9, 0x20),
    inc_b("gremlin", code![0x04, 0xC8, 0x3E, 0x7F, 0xDB, 0xFE, 0xA9, 0xE6, 0x40, 0x28, 0xF5], 16, 50, 7, 0x40),
    inc_b("microsphere", code![0x04, 0xC8, 0x3E, 0x7F, 0xDB, 0xFE, 0x1F, 0xA7, 0xA9, 0xE6, 0x20, 0x28, 0xF3], 16, 58, 9, 0x20),
    inc_b("paul-owens", code![0x04, 0xC8, 0x3E, 0x7F, 0xDB, 0xFE, 0x1F, 0xC8, 0xA9, 0xE6, 0x20, 0x28, 0xF3], 16, 59, 9, 0x20),
    inc_b("raxoft", code![0x04, 0xC8, 0xAF, 0xDB, 0xFE, 0x1F, 0x00, 0xA9, 0xE6, 0x20, 0x28, 0xF4], 13, 55, 9, 0x20),
    inc_b("rom", code![0x04, 0xC8, 0x3E, 0x7F, 0xDB, 0xFE, 0x1F, 0xD0, 0xA9, 0xE6, 0x20, 0x28, 0xF3], 16, 59, 9, 0x20),
    inc_b("search-loader", code![0x04, 0xC8, 0x3E, 0x00, 0xDB, 0xFE, 0xA9, 0xE6, 0x40, 0xD8, 0x00, 0x28, 0xF3], 16, 59, 9, 0x40),
    inc_b("speedlock", code![0x04, 0xC8, 0x3E, 0x7F, 0xDB, 0xFE, 0x1F, 0xA9, 0xE6, 0x20, 0x28, 0xF4], 16, 54, 8, 0x20),
    inc_b("suzy-soft", code![0x04, 0xC8, 0x3E, 0xFB, 0xDB, 0xFE, 0x1F, 0xD0, 0xA9, 0xE6, 0x20, 0x28, 0xF3], 16, 59, 9, 0x20),
    inc_b("tiny", code![0x04, 0xC8, 0xDB, 0xFE, 0xA9, 0xE6, 0x40, 0x28, 0xF7], 9, 43, 6, 0x40),
    inc_b("us-gold", code![0x04, 0x20, 0x05, X, X, X, X, X, 0xDB, 0xFE, 0x1F, 0xC8, 0xA9, 0xE6, 0x20, 0x28, 0xEF], 16, 59, 8, 0x20),
    inc_b("weird-science", code![0x04, 0xC8, 0x3E, 0x7F, 0xDB, 0xFE, 0x37, 0xD0, 0xA9, 0xE6, 0x40, 0x28, 0xF3], 16, 59, 9, 0x40),
];

static ALIASES: [(&str, &str); 13] = [
    ("cyberlode", "bleepload"),
    ("edge", "rom"),
    ("elite-uni-loader", "speedlock"),
    ("excelerator", "bleepload"),
    ("flash-loader", "rom"),
    ("ftl", "speedlock"),
    ("gargoyle", "speedlock"),
    ("hewson-slowload", "rom"),
    ("injectaload", "bleepload"),
    ("poliload", "dinaload"),
    ("power-load", "bleepload"),
    ("softlock", "rom"),
    ("zydroload", "speedlock"),
];

/// Look up a profile by name or alias.
#[must_use]
pub fn find(name: &str) -> Option<&'static Accelerator> {
    let name = ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name, |&(_, target)| target);
    PROFILES.iter().find(|p| p.name == name)
}

/// Every distinct profile, in name order.
pub fn distinct() -> impl Iterator<Item = &'static Accelerator> {
    PROFILES.iter()
}

/// Every accepted name, aliases included, sorted.
#[must_use]
pub fn all() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = PROFILES
        .iter()
        .map(|p| p.name)
        .chain(ALIASES.iter().map(|(alias, _)| *alias))
        .collect();
    names.sort_unstable();
    names
}
