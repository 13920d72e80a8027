//! Z80 CPU core with per-instruction execution.

mod execute;

pub(crate) use execute::uses_hl;

use emu_core::{Bus, Cpu};

use crate::registers::Registers;

/// Opcode of EI, as recorded in [`Z80::last_opcode`].
const EI: u16 = 0x00FB;

/// Z80 CPU.
///
/// The CPU does not own the bus. Each call to [`Z80::step`] borrows it for
/// the duration of one instruction.
pub struct Z80 {
    // === Registers ===
    /// Main register set.
    pub(crate) regs: Registers,

    // === Timing ===
    /// T-state counter. Drivers may rebase it (frame boundaries, snapshot
    /// loads); the core only ever adds to it.
    tstates: u64,
    /// Opcode fetch (M1) cycles since creation, interrupt acknowledges
    /// included.
    fetches: u64,

    // === Decode history ===
    /// Prefix and opcode of the last instruction executed (`0xED57` for
    /// LD A,I). A lone DD/FD prefix records as `0x00DD`/`0x00FD`.
    last_opcode: u16,
}

impl Z80 {
    /// Create a Z80 in its power-on state.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registers(Registers::default(), 0)
    }

    /// Create a Z80 with the given registers and T-state counter.
    #[must_use]
    pub fn with_registers(regs: Registers, tstates: u64) -> Self {
        Self {
            regs,
            tstates,
            fetches: 0,
            last_opcode: 0,
        }
    }

    #[must_use]
    pub const fn regs(&self) -> &Registers {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    #[must_use]
    pub const fn tstates(&self) -> u64 {
        self.tstates
    }

    pub fn set_tstates(&mut self, tstates: u64) {
        self.tstates = tstates;
    }

    /// Advance the clock without executing anything.
    pub fn add_tstates(&mut self, tstates: u64) {
        self.tstates += tstates;
    }

    #[must_use]
    pub const fn fetches(&self) -> u64 {
        self.fetches
    }

    #[must_use]
    pub const fn last_opcode(&self) -> u16 {
        self.last_opcode
    }

    /// True if the last instruction was EI, which holds off interrupts for
    /// one instruction.
    #[must_use]
    pub const fn interrupts_blocked(&self) -> bool {
        self.last_opcode == EI
    }

    /// Mark the previous instruction as EI (or clear the mark). Snapshot
    /// formats record this state.
    pub fn set_interrupts_blocked(&mut self, blocked: bool) {
        self.last_opcode = if blocked { EI } else { 0 };
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
    }

    /// Advance the low seven bits of R by `n`, keeping bit 7.
    pub fn add_r(&mut self, n: u32) {
        let low = (u32::from(self.regs.r & 0x7F) + n) & 0x7F;
        self.regs.r = (self.regs.r & 0x80) | low as u8;
    }

    /// Execute one instruction.
    ///
    /// Returns the T-states taken. A failed port read aborts the instruction
    /// part-way; the CPU state is then unspecified and the caller is
    /// expected to give up on the run.
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> Result<u32, B::Error> {
        let op = self.fetch_opcode(bus);
        let (tstates, code) = match op {
            0xCB => {
                let op2 = self.fetch_opcode(bus);
                (self.execute_cb(bus, op2), 0xCB00 | u16::from(op2))
            }
            0xED => {
                let op2 = self.fetch_opcode(bus);
                (self.execute_ed(bus, op2)?, 0xED00 | u16::from(op2))
            }
            0xDD | 0xFD => {
                let next = bus.read(self.regs.pc);
                let prefix = u16::from(op) << 8;
                if next == 0xCB {
                    self.fetch_opcode(bus);
                    let d = self.fetch_byte(bus);
                    let op3 = self.fetch_byte(bus);
                    (self.execute_index_cb(bus, op, d, op3), prefix | 0xCB)
                } else if execute::uses_hl(next) {
                    self.fetch_opcode(bus);
                    (self.execute_main(bus, next, op)?, prefix | u16::from(next))
                } else {
                    // The prefix is a 4 T-state no-op; the next opcode runs
                    // as an instruction of its own.
                    (4, u16::from(op))
                }
            }
            _ => (self.execute_main(bus, op, 0)?, u16::from(op)),
        };
        self.last_opcode = code;
        self.tstates += u64::from(tstates);
        Ok(tstates)
    }

    /// Accept a maskable interrupt if IFF1 is set and the previous
    /// instruction was not EI.
    pub fn accept_interrupt<B: Bus>(&mut self, bus: &mut B) -> Option<u32> {
        if self.regs.iff1 && !self.interrupts_blocked() {
            Some(self.service_interrupt(bus))
        } else {
            None
        }
    }

    /// Accept a maskable interrupt whenever IFF1 is set, even straight
    /// after EI.
    ///
    /// Recorded input streams were captured by emulators that accept the
    /// frame interrupt this way, so replaying them requires it.
    pub fn force_interrupt<B: Bus>(&mut self, bus: &mut B) -> Option<u32> {
        if self.regs.iff1 {
            Some(self.service_interrupt(bus))
        } else {
            None
        }
    }

    fn service_interrupt<B: Bus>(&mut self, bus: &mut B) -> u32 {
        if self.regs.halted {
            self.regs.halted = false;
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.add_r(1);
        self.fetches += 1;
        self.push16(bus, self.regs.pc);
        let tstates = if self.regs.im == 2 {
            let vector = u16::from(self.regs.i) << 8 | 0xFF;
            self.regs.pc = read16(bus, vector);
            19
        } else {
            self.regs.pc = 0x0038;
            13
        };
        self.last_opcode = 0;
        self.tstates += u64::from(tstates);
        tstates
    }

    // === Bus helpers ===

    /// Fetch an opcode byte: an M1 cycle, so R and the fetch counter move.
    fn fetch_opcode<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let op = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.add_r(1);
        self.fetches += 1;
        op
    }

    /// Fetch an operand byte.
    fn fetch_byte<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let value = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        value
    }

    fn fetch_word<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch_byte(bus);
        let hi = self.fetch_byte(bus);
        u16::from(hi) << 8 | u16::from(lo)
    }

    fn push16<B: Bus>(&mut self, bus: &mut B, value: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, (value >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, value as u8);
    }

    fn pop16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let value = read16(bus, self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }
}

fn read16<B: Bus>(bus: &mut B, addr: u16) -> u16 {
    let lo = bus.read(addr);
    let hi = bus.read(addr.wrapping_add(1));
    u16::from(hi) << 8 | u16::from(lo)
}

fn write16<B: Bus>(bus: &mut B, addr: u16, value: u16) {
    bus.write(addr, value as u8);
    bus.write(addr.wrapping_add(1), (value >> 8) as u8);
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu for Z80 {
    type Registers = Registers;

    fn step<B: Bus>(&mut self, bus: &mut B) -> Result<u32, B::Error> {
        Z80::step(self, bus)
    }

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn registers(&self) -> Registers {
        self.regs
    }

    fn is_halted(&self) -> bool {
        self.regs.halted
    }

    fn interrupt<B: Bus>(&mut self, bus: &mut B) -> Option<u32> {
        self.accept_interrupt(bus)
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}
