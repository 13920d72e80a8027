//! Spectrum memory subsystem.
//!
//! RAM is exposed as 16K pages so snapshots can move it in and out
//! without knowing the paging layout: three pages (`$4000`, `$8000`,
//! `$C000`) on 48K, banks 0-7 on 128K.

use log::warn;

/// Size of one RAM page or ROM bank.
pub const PAGE_SIZE: usize = 0x4000;

/// Memory interface for the supported Spectrum variants.
pub trait SpectrumMemory {
    /// Read a byte from the given address.
    fn read(&self, addr: u16) -> u8;

    /// Write a byte to the given address. ROM writes are silently ignored.
    fn write(&mut self, addr: u16, val: u8);

    /// Write the bank register ($7FFD). No-op on 48K.
    fn write_bank_register(&mut self, _value: u8) {}

    /// Last value accepted by the bank register.
    fn bank_register(&self) -> u8 {
        0
    }

    /// RAM pages in snapshot order.
    fn ram_pages(&self) -> Vec<&[u8]>;

    /// Overwrite RAM page `page` from the start with `data`.
    fn load_ram_page(&mut self, page: usize, data: &[u8]);
}

/// Copy `src` into a ROM bank, zero-padding a short image.
fn fill_rom(bank: &mut [u8; PAGE_SIZE], src: &[u8]) {
    let len = src.len().min(PAGE_SIZE);
    bank[..len].copy_from_slice(&src[..len]);
}

/// 48K Spectrum memory: 16K ROM + 48K RAM.
///
/// Layout:
/// - $0000-$3FFF: ROM (writes ignored)
/// - $4000-$FFFF: RAM
pub struct Memory48K {
    rom: Box<[u8; PAGE_SIZE]>,
    ram: Box<[u8; 0xC000]>,
}

impl Memory48K {
    /// Create a 48K memory with the given ROM data.
    #[must_use]
    pub fn new(rom: &[u8]) -> Self {
        if rom.len() != PAGE_SIZE {
            warn!("48K ROM is {} bytes; expected {PAGE_SIZE}", rom.len());
        }
        let mut memory = Self {
            rom: Box::new([0; PAGE_SIZE]),
            ram: Box::new([0; 0xC000]),
        };
        fill_rom(&mut memory.rom, rom);
        memory
    }
}

impl SpectrumMemory for Memory48K {
    fn read(&self, addr: u16) -> u8 {
        let addr = addr as usize;
        if addr < PAGE_SIZE {
            self.rom[addr]
        } else {
            self.ram[addr - PAGE_SIZE]
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        let addr = addr as usize;
        if addr >= PAGE_SIZE {
            self.ram[addr - PAGE_SIZE] = val;
        }
    }

    fn ram_pages(&self) -> Vec<&[u8]> {
        self.ram.chunks(PAGE_SIZE).collect()
    }

    fn load_ram_page(&mut self, page: usize, data: &[u8]) {
        if page < 3 {
            let start = page * PAGE_SIZE;
            let len = data.len().min(PAGE_SIZE);
            self.ram[start..start + len].copy_from_slice(&data[..len]);
        }
    }
}

/// 128K Spectrum memory: 2×16K ROM + 8×16K RAM with bank switching.
///
/// Layout:
/// - $0000-$3FFF: ROM bank 0 or 1 (bit 4 of $7FFD)
/// - $4000-$7FFF: Always RAM bank 5
/// - $8000-$BFFF: Always RAM bank 2
/// - $C000-$FFFF: Switchable RAM bank 0-7 (bits 0-2 of $7FFD)
///
/// Bit 5 of $7FFD locks the bank register until reset.
pub struct Memory128K {
    rom: [Box<[u8; PAGE_SIZE]>; 2],
    ram: [Box<[u8; PAGE_SIZE]>; 8],
    /// $7FFD register value.
    bank_reg: u8,
    /// Once bit 5 is set, further writes to $7FFD are ignored.
    locked: bool,
}

impl Memory128K {
    /// Create a 128K memory with the given 32K ROM data: the 128K editor
    /// ROM first, then 48K BASIC.
    #[must_use]
    pub fn new(rom: &[u8]) -> Self {
        if rom.len() != 2 * PAGE_SIZE {
            warn!("128K ROM is {} bytes; expected {}", rom.len(), 2 * PAGE_SIZE);
        }
        let mut memory = Self {
            rom: std::array::from_fn(|_| Box::new([0u8; PAGE_SIZE])),
            ram: std::array::from_fn(|_| Box::new([0u8; PAGE_SIZE])),
            bank_reg: 0,
            locked: false,
        };
        fill_rom(&mut memory.rom[0], rom);
        fill_rom(&mut memory.rom[1], rom.get(PAGE_SIZE..).unwrap_or_default());
        memory
    }

    fn rom_bank(&self) -> usize {
        ((self.bank_reg >> 4) & 1) as usize
    }

    fn page_bank(&self) -> usize {
        (self.bank_reg & 0x07) as usize
    }
}

impl SpectrumMemory for Memory128K {
    fn read(&self, addr: u16) -> u8 {
        let a = addr as usize;
        match a {
            0x0000..0x4000 => self.rom[self.rom_bank()][a],
            0x4000..0x8000 => self.ram[5][a - 0x4000],
            0x8000..0xC000 => self.ram[2][a - 0x8000],
            _ => self.ram[self.page_bank()][a - 0xC000],
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        let a = addr as usize;
        match a {
            0x0000..0x4000 => {}
            0x4000..0x8000 => self.ram[5][a - 0x4000] = val,
            0x8000..0xC000 => self.ram[2][a - 0x8000] = val,
            _ => {
                let bank = self.page_bank();
                self.ram[bank][a - 0xC000] = val;
            }
        }
    }

    fn write_bank_register(&mut self, value: u8) {
        if !self.locked {
            self.bank_reg = value;
            self.locked = value & 0x20 != 0;
        }
    }

    fn bank_register(&self) -> u8 {
        self.bank_reg
    }

    fn ram_pages(&self) -> Vec<&[u8]> {
        self.ram.iter().map(|bank| &bank[..]).collect()
    }

    fn load_ram_page(&mut self, page: usize, data: &[u8]) {
        if let Some(bank) = self.ram.get_mut(page) {
            let len = data.len().min(PAGE_SIZE);
            bank[..len].copy_from_slice(&data[..len]);
        }
    }
}
