//! Minimal CP/M harness for ZEXDOC/ZEXALL.
//!
//! CP/M memory layout:
//! - 0x0000: Warm boot (HALT here ends the run)
//! - 0x0005: BDOS entry (intercepted before execution)
//! - 0x0006-0x0007: Top of TPA (programs read this for stack init)
//! - 0x0100: Program load address (TPA start)

use emu_core::{Cpu, SimpleBus};
use zilog_z80::Z80;

fn run_zex(binary: &[u8]) -> bool {
    let mut bus = SimpleBus::new();
    bus.load(0x0100, binary);
    bus.load(0x0000, &[0x76]); // HALT
    bus.load(0x0005, &[0xC9]); // RET
    bus.load(0x0006, &[0x00, 0xFE]);

    let mut cpu = Z80::new();
    cpu.set_pc(0x0100);

    let mut output = String::new();
    let mut instructions: u64 = 0;

    loop {
        let pc = cpu.pc();
        if pc == 0x0000 || cpu.is_halted() {
            eprintln!("Stopped at ${pc:04X} after {instructions} instructions");
            break;
        }

        if pc == 0x0005 {
            let regs = cpu.regs();
            match regs.c {
                2 => output.push(char::from(regs.e)),
                9 => {
                    let mut addr = regs.de();
                    while bus.memory[usize::from(addr)] != b'$' {
                        output.push(char::from(bus.memory[usize::from(addr)]));
                        addr = addr.wrapping_add(1);
                    }
                }
                func => eprintln!("Unknown BDOS function: {func}"),
            }
            // Return to the caller.
            let sp = cpu.regs().sp;
            let ret = u16::from(bus.memory[usize::from(sp)])
                | u16::from(bus.memory[usize::from(sp.wrapping_add(1))]) << 8;
            let regs = cpu.regs_mut();
            regs.sp = sp.wrapping_add(2);
            regs.pc = ret;
            continue;
        }

        cpu.step(&mut bus).unwrap();
        instructions += 1;
    }

    eprintln!("{output}");
    !output.contains("ERROR")
}

#[test]
#[ignore = "requires tests/data/zexdoc.com"]
fn zexdoc() {
    let binary = std::fs::read("tests/data/zexdoc.com").expect("tests/data/zexdoc.com not found");
    assert!(run_zex(&binary), "ZEXDOC failed");
}

#[test]
#[ignore = "requires tests/data/zexall.com"]
fn zexall() {
    let binary = std::fs::read("tests/data/zexall.com").expect("tests/data/zexall.com not found");
    assert!(run_zex(&binary), "ZEXALL failed");
}
