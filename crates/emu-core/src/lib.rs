//! Core traits for instruction-stepped emulation.
//!
//! A CPU executes whole instructions against a [`Bus`]. Memory accesses are
//! infallible; port reads may fail, because the value behind a port can come
//! from a recording that runs dry.

mod bus;
mod cpu;

pub use bus::{Bus, SimpleBus};
pub use cpu::Cpu;
