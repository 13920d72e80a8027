//! Instruction-stepped Z80 CPU core.
//!
//! Each call to [`Z80::step`] executes one whole instruction and returns the
//! T-states it took. The core counts opcode fetches (M1 cycles) separately
//! from the R register so replay drivers can account for them exactly.

mod alu;
mod cpu;
pub mod disasm;
mod flags;
mod registers;

pub use cpu::Z80;
pub use disasm::disassemble;
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
pub use registers::Registers;
