//! Apple //e memory bus: physical memory, paged read/write tables, and the
//! language-card / slot-ROM configuration.
//!
//! Every page of the 16-bit address space resolves through an indirect
//! mapping, so bank switches are table rewrites instead of memory copies
//! and "writes ignored" is a first-class case. $C000-$C0FF never reaches
//! the tables; it dispatches to the soft-switch handlers in `io`.

use emu_core::cpu_6502::Memory6502;
use emu_core::log;
use emu_core::logging::{LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

use crate::disk::DiskController;
use crate::keyboard::Keyboard;
use crate::speaker::{AudioConsumer, Speaker};
use crate::video::VideoState;
use crate::Apple2Error;

const MAIN_RAM_SIZE: usize = 0x10000;
const UPPER_ROM_SIZE: usize = 0x3000;
const IO_ROM_SIZE: usize = 0x1000;

/// A 16 KiB image: 4 KiB internal I/O ROM + 12 KiB upper ROM. Images with
/// a fifth 4 KiB block carry a distinct external slot ROM.
const ROM_IMAGE_LENGTH: usize = 0x4000;
const ROM_IMAGE_WITH_SLOT_LENGTH: usize = 0x5000;

/// Backing stores for the address space.
#[derive(Debug, Clone)]
pub struct PhysicalMemory {
    /// 64 KiB of main RAM; the language card aliases $C000-$CFFF as
    /// D000 bank 1.
    pub main_ram: Vec<u8>,
    /// ROM behind $D000-$FFFF
    pub upper_rom: Vec<u8>,
    /// Internal I/O ROM behind $C100-$CFFF
    pub rom_c1: Vec<u8>,
    /// External slot I/O ROM behind $C100-$CFFF
    pub rom_c2: Vec<u8>,
}

impl PhysicalMemory {
    fn new() -> Self {
        Self {
            main_ram: vec![0; MAIN_RAM_SIZE],
            upper_rom: vec![0; UPPER_ROM_SIZE],
            rom_c1: vec![0; IO_ROM_SIZE],
            rom_c2: vec![0; IO_ROM_SIZE],
        }
    }
}

/// Where a page of the address space resolves to. A write slot holding
/// `None` drops stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    MainRam(u8),
    UpperRom(u8),
    IoRom { external: bool, page: u8 },
}

/// Memory-configuration soft-switch state. The aux-memory switches are
/// acknowledged but have no 64 KiB bank behind them; status reads report
/// them as off.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Which RAM bank sits behind $D000-$DFFF (1 or 2)
    pub d000_bank: u8,
    pub using_external_slot_rom: bool,
    pub upper_read_mapped_to_rom: bool,
    pub upper_ram_read_only: bool,
    /// Text/graphics page 2 selected
    pub page2: bool,
    pub aux_read: bool,
    pub aux_write: bool,
    pub alt_zp: bool,
    pub aux_page2: bool,
    pub col80: bool,
    pub store80: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            d000_bank: 2,
            using_external_slot_rom: false,
            upper_read_mapped_to_rom: true,
            upper_ram_read_only: false,
            page2: false,
            aux_read: false,
            aux_write: false,
            alt_zp: false,
            aux_page2: false,
            col80: false,
            store80: false,
        }
    }
}

/// The machine's memory bus, owning physical memory and the peripherals
/// reached through the $C000-$C0FF soft switches.
#[derive(Debug)]
pub struct Apple2Bus {
    pub physical: PhysicalMemory,
    read_pages: [Page; 0x100],
    write_pages: [Option<Page>; 0x100],
    pub config: MemoryConfig,
    pub video: VideoState,
    pub keyboard: Keyboard,
    pub speaker: Speaker,
    pub disk: DiskController,
    /// Click the speaker whenever the stepper magnets move the head.
    pub click_on_head_move: bool,
    /// Frame-cycle watermark published by the CPU after each instruction.
    pub(crate) frame_cycles: u64,
}

impl Apple2Bus {
    /// Create the bus and the consumer half of the audio queue.
    pub fn new() -> (Self, AudioConsumer) {
        let (speaker, audio_consumer) = Speaker::new();
        let mut bus = Self {
            physical: PhysicalMemory::new(),
            read_pages: [Page::MainRam(0); 0x100],
            write_pages: [None; 0x100],
            config: MemoryConfig::default(),
            video: VideoState::default(),
            keyboard: Keyboard::new(),
            speaker,
            disk: DiskController::new(),
            click_on_head_move: false,
            frame_cycles: 0,
        };
        bus.apply_memory_configuration();
        (bus, audio_consumer)
    }

    /// Load a firmware ROM image: 4 KiB internal I/O ROM, then the 12 KiB
    /// upper ROM. A plain 16 KiB image reuses the internal I/O ROM as the
    /// external slot ROM; longer images carry it at offset $4000.
    pub fn load_rom(&mut self, bytes: &[u8]) -> Result<(), Apple2Error> {
        if bytes.len() != ROM_IMAGE_LENGTH && bytes.len() < ROM_IMAGE_WITH_SLOT_LENGTH {
            return Err(Apple2Error::InvalidRomLength(bytes.len()));
        }

        self.physical.rom_c1.copy_from_slice(&bytes[..IO_ROM_SIZE]);
        self.physical
            .upper_rom
            .copy_from_slice(&bytes[IO_ROM_SIZE..IO_ROM_SIZE + UPPER_ROM_SIZE]);
        if bytes.len() >= ROM_IMAGE_WITH_SLOT_LENGTH {
            self.physical
                .rom_c2
                .copy_from_slice(&bytes[ROM_IMAGE_LENGTH..ROM_IMAGE_WITH_SLOT_LENGTH]);
        } else {
            let rom_c1 = self.physical.rom_c1.clone();
            self.physical.rom_c2.copy_from_slice(&rom_c1);
        }

        // Slots without an implemented card read as zeroes
        for slot in [3, 4, 7] {
            self.empty_slot(slot);
        }

        self.apply_memory_configuration();
        Ok(())
    }

    /// Zero the I/O ROM page of a slot in both ROM halves.
    fn empty_slot(&mut self, slot: usize) {
        let range = slot * 0x100..(slot + 1) * 0x100;
        self.physical.rom_c1[range.clone()].fill(0);
        self.physical.rom_c2[range].fill(0);
    }

    /// Rebuild both page tables from the configuration flags. Called after
    /// every flag change so the tables always match the configuration.
    pub fn apply_memory_configuration(&mut self) {
        let external = self.config.using_external_slot_rom;
        let rom_read = self.config.upper_read_mapped_to_rom;
        let read_only = self.config.upper_ram_read_only;

        // Main RAM
        for p in 0x00..=0xbf {
            self.read_pages[p] = Page::MainRam(p as u8);
            self.write_pages[p] = Some(Page::MainRam(p as u8));
        }

        // $C000-$C0FF dispatches to the soft switches before the tables
        // are consulted; keep the read entry populated anyway.
        self.read_pages[0xc0] = Page::IoRom { external, page: 0 };
        self.write_pages[0xc0] = None;

        // Slot ROM area
        for p in 0xc1..=0xcf {
            self.read_pages[p] = Page::IoRom {
                external,
                page: (p - 0xc0) as u8,
            };
            self.write_pages[p] = None;
        }

        // Language card: $D000-$DFFF is bank switched; bank 1 aliases the
        // physical pages one below.
        for p in 0xd0..=0xdf {
            let ram_page = if self.config.d000_bank == 1 {
                (p - 0x10) as u8
            } else {
                p as u8
            };
            self.read_pages[p] = if rom_read {
                Page::UpperRom((p - 0xd0) as u8)
            } else {
                Page::MainRam(ram_page)
            };
            self.write_pages[p] = if read_only {
                None
            } else {
                Some(Page::MainRam(ram_page))
            };
        }

        // $E000-$FFFF
        for p in 0xe0..=0xff {
            self.read_pages[p] = if rom_read {
                Page::UpperRom((p - 0xd0) as u8)
            } else {
                Page::MainRam(p as u8)
            };
            self.write_pages[p] = if read_only {
                None
            } else {
                Some(Page::MainRam(p as u8))
            };
        }
    }

    /// Decode a $C08x access: bit 0 write-enables the language-card RAM,
    /// bits 0^1 select ROM or RAM reads, bit 3 picks the $D000 bank.
    pub fn set_memory_mode(&mut self, mode: u8) {
        self.config.upper_ram_read_only = mode & 1 == 0;
        self.config.upper_read_mapped_to_rom = ((mode >> 1) ^ mode) & 1 != 0;
        self.config.d000_bank = if mode & 8 != 0 { 1 } else { 2 };
        log!(
            LogCategory::Mmu,
            LogLevel::Trace,
            "MMU: memory mode {:x} (read_only={} rom={} bank={})",
            mode,
            self.config.upper_ram_read_only,
            self.config.upper_read_mapped_to_rom,
            self.config.d000_bank
        );
        self.apply_memory_configuration();
    }

    pub fn set_d000_bank(&mut self, bank: u8) {
        self.config.d000_bank = bank;
        self.apply_memory_configuration();
    }

    pub fn set_upper_read_mapped_to_rom(&mut self, value: bool) {
        self.config.upper_read_mapped_to_rom = value;
        self.apply_memory_configuration();
    }

    pub fn set_upper_ram_read_only(&mut self, value: bool) {
        self.config.upper_ram_read_only = value;
        self.apply_memory_configuration();
    }

    /// Map $C100-$CFFF to the internal or external slot ROM.
    pub fn select_slot_rom(&mut self, external: bool) {
        self.config.using_external_slot_rom = external;
        self.apply_memory_configuration();
    }

    pub fn set_page2(&mut self, value: bool) {
        self.config.page2 = value;
    }

    /// Restore the power-on memory configuration.
    pub fn reset_memory_configuration(&mut self) {
        self.config = MemoryConfig::default();
        self.apply_memory_configuration();
    }

    /// Zero all of main RAM. Test scaffolding, like the monitor's wipe
    /// before a cold start.
    pub fn wipe_ram(&mut self) {
        self.physical.main_ram.fill(0);
    }

    fn page_slice(&self, page: Page) -> &[u8] {
        match page {
            Page::MainRam(p) => &self.physical.main_ram[(p as usize) << 8..][..0x100],
            Page::UpperRom(p) => &self.physical.upper_rom[(p as usize) << 8..][..0x100],
            Page::IoRom { external, page } => {
                let rom = if external {
                    &self.physical.rom_c2
                } else {
                    &self.physical.rom_c1
                };
                &rom[(page as usize) << 8..][..0x100]
            }
        }
    }

    fn page_slice_mut(&mut self, page: Page) -> &mut [u8] {
        match page {
            Page::MainRam(p) => &mut self.physical.main_ram[(p as usize) << 8..][..0x100],
            // ROM never appears in the write table
            _ => unreachable!("write slot resolves to ROM"),
        }
    }
}

impl Memory6502 for Apple2Bus {
    fn read(&mut self, addr: u16) -> u8 {
        if (0xc000..=0xc0ff).contains(&addr) {
            return self.read_io(addr);
        }
        let page = self.read_pages[(addr >> 8) as usize];
        self.page_slice(page)[(addr & 0xff) as usize]
    }

    fn write(&mut self, addr: u16, val: u8) {
        if (0xc000..=0xc0ff).contains(&addr) {
            self.write_io(addr, val);
            return;
        }
        if let Some(page) = self.write_pages[(addr >> 8) as usize] {
            self.page_slice_mut(page)[(addr & 0xff) as usize] = val;
        }
    }

    fn peek(&self, addr: u16) -> u8 {
        // Soft switches have read side effects; debug reads see zero there.
        if (0xc000..=0xc0ff).contains(&addr) {
            return 0;
        }
        let page = self.read_pages[(addr >> 8) as usize];
        self.page_slice(page)[(addr & 0xff) as usize]
    }

    fn clock(&mut self, frame_cycles: u64) {
        self.frame_cycles = frame_cycles;
    }
}
