//! Instruction tracing on a free-running machine.

use std::io::Write;

use crate::config::TraceOptions;
use crate::error::Result;
use crate::port::PortSource;
use crate::spectrum::Spectrum;

/// What ended a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// The operation limit was reached.
    Operations(u64),
    /// The T-state limit was reached; holds the T-states elapsed.
    TStates(u64),
    /// PC reached the stop address.
    Address,
}

impl StopCondition {
    /// The line reported when the trace stops with PC at `pc`.
    #[must_use]
    pub fn message(self, pc: u16) -> String {
        match self {
            Self::Operations(n) => format!("Stopped at ${pc:04X}: {n} operations"),
            Self::TStates(n) => format!("Stopped at ${pc:04X}: {n} T-states"),
            Self::Address => format!("Stopped at ${pc:04X}"),
        }
    }
}

/// Totals of a finished trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceSummary {
    pub condition: StopCondition,
    pub operations: u64,
    pub tstates: u64,
}

/// Run from `options.start` (or the current PC) until a stop condition
/// holds. With `verbose`, each instruction is written to `out` before it
/// runs as `$PC MNEMONIC`.
///
/// With no stop address and no limits the trace only ends on an error.
pub fn run<P: PortSource>(
    spectrum: &mut Spectrum<P>,
    options: &TraceOptions,
    out: &mut impl Write,
) -> Result<TraceSummary> {
    if let Some(start) = options.start {
        spectrum.cpu_mut().set_pc(start);
    }
    let started = spectrum.cpu().tstates();
    let frame = spectrum.model().frame_duration();
    let int_active = spectrum.model().int_active();
    let mut operations = 0;

    let condition = loop {
        let pc = spectrum.regs().pc;
        if options.verbose {
            writeln!(out, "${pc:04X} {}", spectrum.disassemble(pc))?;
        }
        spectrum.step()?;
        if !options.no_interrupts && spectrum.cpu().tstates() % frame < int_active {
            spectrum.accept_interrupt();
        }
        operations += 1;

        let elapsed = spectrum.cpu().tstates() - started;
        if options.max_operations > 0 && operations >= options.max_operations {
            break StopCondition::Operations(operations);
        }
        if options.max_tstates > 0 && elapsed >= options.max_tstates {
            break StopCondition::TStates(elapsed);
        }
        if options.stop == Some(spectrum.regs().pc) {
            break StopCondition::Address;
        }
    };

    Ok(TraceSummary {
        condition,
        operations,
        tstates: spectrum.cpu().tstates() - started,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RomSet, SpectrumModel};
    use crate::port::IdlePorts;

    fn machine(code: &[u8]) -> Spectrum<IdlePorts> {
        let mut spectrum = Spectrum::new(&RomSet::blank().config(SpectrumModel::Spectrum48K), IdlePorts);
        for (i, &byte) in code.iter().enumerate() {
            spectrum.poke(0x8000 + i as u16, byte);
        }
        spectrum
    }

    #[test]
    fn stops_at_address_with_trace() {
        // LD A,1; INC A; JR $
        let mut spectrum = machine(&[0x3E, 0x01, 0x3C, 0x18, 0xFE]);
        let options = TraceOptions {
            start: Some(0x8000),
            stop: Some(0x8003),
            verbose: true,
            ..TraceOptions::default()
        };
        let mut out = Vec::new();
        let summary = run(&mut spectrum, &options, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "$8000 LD A,$01\n$8002 INC A\n");
        assert_eq!(summary.condition, StopCondition::Address);
        assert_eq!(summary.operations, 2);
        assert_eq!(summary.tstates, 11);
        assert_eq!(summary.condition.message(0x8003), "Stopped at $8003");
        assert_eq!(spectrum.regs().a, 2);
    }

    #[test]
    fn operation_limit() {
        let mut spectrum = machine(&[0x18, 0xFE]);
        let options = TraceOptions {
            start: Some(0x8000),
            max_operations: 5,
            ..TraceOptions::default()
        };
        let summary = run(&mut spectrum, &options, &mut std::io::sink()).unwrap();
        assert_eq!(summary.condition, StopCondition::Operations(5));
        assert_eq!(summary.condition.message(0x8000), "Stopped at $8000: 5 operations");
    }

    #[test]
    fn tstate_limit_counts_from_the_start() {
        let mut spectrum = machine(&[0x18, 0xFE]);
        spectrum.cpu_mut().set_tstates(1000);
        let options = TraceOptions {
            start: Some(0x8000),
            max_tstates: 30,
            ..TraceOptions::default()
        };
        let summary = run(&mut spectrum, &options, &mut std::io::sink()).unwrap();
        // Three JRs of 12 T-states each.
        assert_eq!(summary.condition, StopCondition::TStates(36));
    }

    #[test]
    fn interrupts_follow_the_frame() {
        // EI; JR $ with IM 1 into a blank ROM at $0038.
        let mut spectrum = machine(&[0xFB, 0x18, 0xFE]);
        spectrum.regs_mut().im = 1;
        spectrum.regs_mut().sp = 0xC000;
        spectrum.cpu_mut().set_tstates(69_888 - 20);
        let options = TraceOptions {
            start: Some(0x8000),
            stop: Some(0x0038),
            max_operations: 10,
            ..TraceOptions::default()
        };
        let summary = run(&mut spectrum, &options, &mut std::io::sink()).unwrap();
        assert_eq!(summary.condition, StopCondition::Address);

        let mut spectrum = machine(&[0xFB, 0x18, 0xFE]);
        spectrum.cpu_mut().set_tstates(69_888 - 20);
        let options = TraceOptions {
            no_interrupts: true,
            ..options
        };
        let summary = run(&mut spectrum, &options, &mut std::io::sink()).unwrap();
        assert_eq!(summary.condition, StopCondition::Operations(10));
    }
}
