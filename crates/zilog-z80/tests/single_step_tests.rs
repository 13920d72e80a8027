//! JSON test vectors in the `SingleStepTests` format.
//!
//! A handful of vectors are embedded and always run. The full suite
//! (1,604 opcode files) is read from `test-data/z80/v1/` when present.
//!
//! The core steps whole instructions, so a test passes when the T-states
//! reported by `step` add up to the length of the `cycles` list. WZ and the
//! Q/P latches are not modelled. Undocumented flag bits 5 and 3 are masked
//! for the instructions where this core follows the replay-compatible
//! rules instead of the MEMPTR-based ones.

use emu_core::Bus;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fs;
use std::path::Path;
use zilog_z80::{Registers, XF, YF, Z80};

/// Flat 64KB RAM bus with preloaded port values.
struct TestBus {
    ram: Box<[u8; 0x10000]>,
    io_read_values: HashMap<u16, u8>,
}

impl TestBus {
    fn new() -> Self {
        Self {
            ram: Box::new([0; 0x10000]),
            io_read_values: HashMap::new(),
        }
    }
}

impl Bus for TestBus {
    type Error = Infallible;

    fn read(&mut self, address: u16) -> u8 {
        self.ram[usize::from(address)]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.ram[usize::from(address)] = value;
    }

    fn io_read(&mut self, port: u16, _clock: u64) -> Result<u8, Infallible> {
        Ok(self.io_read_values.get(&port).copied().unwrap_or(0xFF))
    }

    fn io_write(&mut self, _port: u16, _value: u8) {}
}

#[derive(Deserialize)]
struct TestCase {
    name: String,
    initial: CpuState,
    #[serde(rename = "final")]
    final_state: CpuState,
    cycles: Vec<serde_json::Value>,
    #[serde(default)]
    ports: Vec<(u16, u8, String)>,
}

#[derive(Deserialize)]
struct CpuState {
    pc: u16,
    sp: u16,
    a: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    f: u8,
    h: u8,
    l: u8,
    i: u8,
    r: u8,
    ix: u16,
    iy: u16,
    #[serde(rename = "af_")]
    af_alt: u16,
    #[serde(rename = "bc_")]
    bc_alt: u16,
    #[serde(rename = "de_")]
    de_alt: u16,
    #[serde(rename = "hl_")]
    hl_alt: u16,
    iff1: u8,
    iff2: u8,
    im: u8,
    ram: Vec<(u16, u8)>,
}

impl CpuState {
    fn registers(&self) -> Registers {
        let mut regs = Registers {
            a: self.a,
            f: self.f,
            b: self.b,
            c: self.c,
            d: self.d,
            e: self.e,
            h: self.h,
            l: self.l,
            ix: self.ix,
            iy: self.iy,
            sp: self.sp,
            pc: self.pc,
            i: self.i,
            r: self.r,
            iff1: self.iff1 != 0,
            iff2: self.iff2 != 0,
            im: self.im,
            ..Registers::default()
        };
        regs.set_af_alt(self.af_alt);
        regs.set_bc_alt(self.bc_alt);
        regs.set_de_alt(self.de_alt);
        regs.set_hl_alt(self.hl_alt);
        regs
    }
}

/// Flag bits not compared for the file `name`.
fn ignored_flags(name: &str) -> u8 {
    let opcode = |prefix: &str| {
        name.strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(".json"))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
    };
    if let Some(op) = opcode("cb ") {
        if op & 0xC7 == 0x46 {
            return YF | XF;
        }
    }
    if let Some(op) = opcode("dd cb __ ").or_else(|| opcode("fd cb __ ")) {
        if op & 0xC0 == 0x40 {
            return YF | XF;
        }
    }
    if matches!(name, "37.json" | "3f.json") {
        return YF | XF;
    }
    0
}

/// Run one test case, returning a list of mismatches.
fn run_case(test: &TestCase, flag_mask: u8) -> Vec<String> {
    let mut bus = TestBus::new();
    for &(addr, value) in &test.initial.ram {
        bus.ram[usize::from(addr)] = value;
    }
    for (port, value, dir) in &test.ports {
        if dir == "r" {
            bus.io_read_values.insert(*port, *value);
        }
    }

    let mut cpu = Z80::with_registers(test.initial.registers(), 0);
    let wanted = test.cycles.len() as u64;
    let mut spent = 0;
    // A prefix that changes nothing executes as a step of its own.
    while spent < wanted {
        match cpu.step(&mut bus) {
            Ok(t) => spent += u64::from(t),
            Err(never) => match never {},
        }
    }

    let mut errors = Vec::new();
    if spent != wanted {
        errors.push(format!("T-states: got {spent}, want {wanted}"));
    }
    let mut got = *cpu.regs();
    let mut want = test.final_state.registers();
    got.halted = false;
    got.f &= !flag_mask;
    want.f &= !flag_mask;
    if got != want {
        errors.push(format!("registers: got {got:?}, want {want:?}"));
    }
    for &(addr, value) in &test.final_state.ram {
        let actual = bus.ram[usize::from(addr)];
        if actual != value {
            errors.push(format!("RAM[${addr:04X}]: got ${actual:02X}, want ${value:02X}"));
        }
    }
    errors
}

const EMBEDDED: &str = r#"[
  {
    "name": "80 add a,b",
    "initial": {"pc": 0, "sp": 0, "a": 127, "b": 1, "c": 0, "d": 0, "e": 0, "f": 0, "h": 0, "l": 0,
                "i": 0, "r": 0, "ix": 0, "iy": 0, "af_": 0, "bc_": 0, "de_": 0, "hl_": 0,
                "iff1": 0, "iff2": 0, "im": 0, "ram": [[0, 128]]},
    "final":   {"pc": 1, "sp": 0, "a": 128, "b": 1, "c": 0, "d": 0, "e": 0, "f": 148, "h": 0, "l": 0,
                "i": 0, "r": 1, "ix": 0, "iy": 0, "af_": 0, "bc_": 0, "de_": 0, "hl_": 0,
                "iff1": 0, "iff2": 0, "im": 0, "ram": [[0, 128]]},
    "cycles": [0, 0, 0, 0]
  },
  {
    "name": "dd 21 ld ix,nn",
    "initial": {"pc": 256, "sp": 0, "a": 0, "b": 0, "c": 0, "d": 0, "e": 0, "f": 0, "h": 0, "l": 0,
                "i": 0, "r": 127, "ix": 0, "iy": 0, "af_": 0, "bc_": 0, "de_": 0, "hl_": 0,
                "iff1": 0, "iff2": 0, "im": 0, "ram": [[256, 221], [257, 33], [258, 52], [259, 18]]},
    "final":   {"pc": 260, "sp": 0, "a": 0, "b": 0, "c": 0, "d": 0, "e": 0, "f": 0, "h": 0, "l": 0,
                "i": 0, "r": 1, "ix": 4660, "iy": 0, "af_": 0, "bc_": 0, "de_": 0, "hl_": 0,
                "iff1": 0, "iff2": 0, "im": 0, "ram": []},
    "cycles": [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
  },
  {
    "name": "ed 78 in a,(c)",
    "initial": {"pc": 0, "sp": 0, "a": 0, "b": 127, "c": 254, "d": 0, "e": 0, "f": 1, "h": 0, "l": 0,
                "i": 0, "r": 0, "ix": 0, "iy": 0, "af_": 0, "bc_": 0, "de_": 0, "hl_": 0,
                "iff1": 0, "iff2": 0, "im": 0, "ram": [[0, 237], [1, 120]]},
    "final":   {"pc": 2, "sp": 0, "a": 0, "b": 127, "c": 254, "d": 0, "e": 0, "f": 69, "h": 0, "l": 0,
                "i": 0, "r": 2, "ix": 0, "iy": 0, "af_": 0, "bc_": 0, "de_": 0, "hl_": 0,
                "iff1": 0, "iff2": 0, "im": 0, "ram": []},
    "cycles": [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    "ports": [[32766, 0, "r"]]
  },
  {
    "name": "dd 00 lone prefix",
    "initial": {"pc": 0, "sp": 0, "a": 0, "b": 0, "c": 0, "d": 0, "e": 0, "f": 0, "h": 0, "l": 0,
                "i": 0, "r": 0, "ix": 0, "iy": 0, "af_": 0, "bc_": 0, "de_": 0, "hl_": 0,
                "iff1": 0, "iff2": 0, "im": 0, "ram": [[0, 221], [1, 0]]},
    "final":   {"pc": 2, "sp": 0, "a": 0, "b": 0, "c": 0, "d": 0, "e": 0, "f": 0, "h": 0, "l": 0,
                "i": 0, "r": 2, "ix": 0, "iy": 0, "af_": 0, "bc_": 0, "de_": 0, "hl_": 0,
                "iff1": 0, "iff2": 0, "im": 0, "ram": []},
    "cycles": [0, 0, 0, 0, 0, 0, 0, 0]
  }
]"#;

#[test]
fn embedded_vectors() {
    let tests: Vec<TestCase> = serde_json::from_str(EMBEDDED).unwrap();
    for test in &tests {
        let errors = run_case(test, 0);
        assert!(errors.is_empty(), "{}: {}", test.name, errors.join(", "));
    }
}

/// Run all `SingleStepTests` files found on disk.
#[test]
#[ignore = "requires test-data/z80; run with --ignored"]
fn run_all() {
    let test_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../test-data/z80/v1");
    if !test_dir.exists() {
        eprintln!("Test data not found at {}", test_dir.display());
        return;
    }

    let mut filenames: Vec<String> = Vec::new();
    for opcode in 0..=0xFFu8 {
        if !matches!(opcode, 0xCB | 0xDD | 0xED | 0xFD) {
            filenames.push(format!("{opcode:02x}.json"));
        }
        for prefix in ["cb ", "dd ", "ed ", "fd ", "dd cb __ ", "fd cb __ "] {
            filenames.push(format!("{prefix}{opcode:02x}.json"));
        }
    }

    let mut total_pass = 0u64;
    let mut total_fail = 0u64;
    for filename in &filenames {
        let path = test_dir.join(filename);
        if !path.exists() {
            continue;
        }
        let data = fs::read_to_string(&path).unwrap();
        let tests: Vec<TestCase> = serde_json::from_str(&data).unwrap();
        let mask = ignored_flags(filename);

        let mut failures = Vec::new();
        for test in &tests {
            let errors = run_case(test, mask);
            if errors.is_empty() {
                total_pass += 1;
            } else {
                total_fail += 1;
                if failures.len() < 5 {
                    failures.push(format!("  FAIL [{}]: {}", test.name, errors.join(", ")));
                }
            }
        }
        if !failures.is_empty() {
            println!("{filename}:");
            for msg in &failures {
                println!("{msg}");
            }
        }
    }

    println!("Pass: {total_pass}, Fail: {total_fail}");
    assert_eq!(total_fail, 0, "{total_fail} tests failed");
}
