//! CPU core trait.

use crate::Bus;

/// A CPU core that executes one instruction per step.
///
/// The bus is passed in, not owned, so drivers can inspect and patch memory
/// between instructions.
pub trait Cpu {
    /// The type used for register inspection.
    type Registers;

    /// Execute one instruction and return the T-states it took.
    ///
    /// A failed port read aborts the instruction and surfaces the bus error.
    fn step<B: Bus>(&mut self, bus: &mut B) -> Result<u32, B::Error>;

    /// Returns the current program counter.
    fn pc(&self) -> u16;

    /// Returns a copy of all registers for inspection.
    fn registers(&self) -> Self::Registers;

    /// Returns true if the CPU is sitting on a HALT.
    fn is_halted(&self) -> bool;

    /// Service a maskable interrupt if the CPU will accept one now.
    ///
    /// Returns the T-states spent on acceptance, or `None` if the interrupt
    /// was not accepted.
    fn interrupt<B: Bus>(&mut self, bus: &mut B) -> Option<u32>;

    /// Reset the CPU to its power-on state.
    fn reset(&mut self);
}
