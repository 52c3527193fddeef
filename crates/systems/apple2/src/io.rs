//! Soft-switch dispatch for $C000-$C0FF.
//!
//! Addresses here are not memory: touching one triggers a side effect in
//! the MMU or a peripheral. Some switches fire on both reads and writes,
//! some only on one of them, and the slot-6 block drives the disk
//! controller. Anything unrecognized is fatal; silently missing a switch
//! would desynchronize the firmware's view of the machine.
//!
//! Memory map references:
//! https://mirrors.apple2.org.za/apple.cabi.net/Languages.Programming/MemoryMap.IIe.64K.128K.txt

use crate::bus::Apple2Bus;

pub const KEYBOARD: u16 = 0xc000; // keyboard data (latched) (RD-only)
pub const CLR80COL: u16 = 0xc000; // use 80-column memory mapping (WR-only)
pub const SET80COL: u16 = 0xc001;
pub const CLRAUXRD: u16 = 0xc002; // read from auxiliary 48K
pub const SETAUXRD: u16 = 0xc003;
pub const CLRAUXWR: u16 = 0xc004; // write to auxiliary 48K
pub const SETAUXWR: u16 = 0xc005;
pub const CLRCXROM: u16 = 0xc006; // use external slot ROM
pub const SETCXROM: u16 = 0xc007;
pub const CLRAUXZP: u16 = 0xc008; // use auxiliary ZP, stack, & LC
pub const SETAUXZP: u16 = 0xc009;
pub const CLRC3ROM: u16 = 0xc00a; // use external slot C3 ROM
pub const SETC3ROM: u16 = 0xc00b;
pub const CLR80VID: u16 = 0xc00c; // use 80-column display mode
pub const SET80VID: u16 = 0xc00d;
pub const CLRALTCH: u16 = 0xc00e; // use alternate character set ROM
pub const SETALTCH: u16 = 0xc00f;
pub const STROBE: u16 = 0xc010; // strobe (unlatch) keyboard data

pub const RDLCBNK2: u16 = 0xc011; // reading from LC bank $Dx 2
pub const RDLCRAM: u16 = 0xc012; // reading from LC RAM
pub const RDRAMRD: u16 = 0xc013; // reading from auxiliary 48K
pub const RDRAMWR: u16 = 0xc014; // writing to auxiliary 48K
pub const RDCXROM: u16 = 0xc015; // using external slot ROM
pub const RDAUXZP: u16 = 0xc016; // using auxiliary ZP, stack, & LC
pub const RDC3ROM: u16 = 0xc017; // using external slot C3 ROM
pub const RD80COL: u16 = 0xc018; // using 80-column memory mapping
pub const RDVBLBAR: u16 = 0xc019; // not VBL (VBL signal low)
pub const RDTEXT: u16 = 0xc01a; // using text mode
pub const RDMIXED: u16 = 0xc01b; // using mixed mode
pub const RDPAGE2: u16 = 0xc01c; // using text/graphics page2
pub const RDHIRES: u16 = 0xc01d; // using Hi-res graphics mode
pub const RDALTCH: u16 = 0xc01e; // using alternate character set ROM
pub const RD80VID: u16 = 0xc01f; // using 80-column display mode

pub const SPEAKER: u16 = 0xc030; // toggle speaker diaphragm

pub const CLRTEXT: u16 = 0xc050; // enable text-only mode
pub const SETTEXT: u16 = 0xc051;
pub const CLRMIXED: u16 = 0xc052; // enable graphics/text mixed mode
pub const SETMIXED: u16 = 0xc053;
pub const TXTPAGE1: u16 = 0xc054; // select page1/2
pub const TXTPAGE2: u16 = 0xc055;
pub const CLRHIRES: u16 = 0xc056; // enable Hi-res graphics
pub const SETHIRES: u16 = 0xc057;

pub const SETAN0: u16 = 0xc058; // 4-bit annunciator outputs
pub const CLRAN0: u16 = 0xc059;
pub const SETAN1: u16 = 0xc05a;
pub const CLRAN1: u16 = 0xc05b;
pub const SETAN2: u16 = 0xc05c;
pub const CLRAN2: u16 = 0xc05d;
pub const SETAN3: u16 = 0xc05e;
pub const CLRAN3: u16 = 0xc05f;

pub const OPNAPPLE: u16 = 0xc061; // open apple (command) key data
pub const CLSAPPLE: u16 = 0xc062; // closed apple (option) key data
pub const STATEREG: u16 = 0xc068; // has no effect on the //e

// Slot 6 drive I/O
pub const S6CLRDRVP0: u16 = 0xc0e0; // stepper phase 0  (Q0)
pub const S6SETDRVP0: u16 = 0xc0e1;
pub const S6CLRDRVP1: u16 = 0xc0e2; // stepper phase 1  (Q1)
pub const S6SETDRVP1: u16 = 0xc0e3;
pub const S6CLRDRVP2: u16 = 0xc0e4; // stepper phase 2  (Q2)
pub const S6SETDRVP2: u16 = 0xc0e5;
pub const S6CLRDRVP3: u16 = 0xc0e6; // stepper phase 3  (Q3)
pub const S6SETDRVP3: u16 = 0xc0e7;
pub const S6MOTOROFF: u16 = 0xc0e8; // drive motor      (Q4)
pub const S6MOTORON: u16 = 0xc0e9;
pub const S6SELDRV1: u16 = 0xc0ea; // drive select     (Q5)
pub const S6SELDRV2: u16 = 0xc0eb;
pub const S6Q6L: u16 = 0xc0ec; // read             (Q6)
pub const S6Q6H: u16 = 0xc0ed; // WP sense
pub const S6Q7L: u16 = 0xc0ee; // WP sense/read    (Q7)
pub const S6Q7H: u16 = 0xc0ef; // write

/// Floating-bus values returned by status switches: bit 7 carries the
/// answer, bit 0 follows the bus.
const STATUS_CLEAR: u8 = 0x0d;
const STATUS_SET: u8 = 0x8d;

impl Apple2Bus {
    fn status(value: bool) -> u8 {
        if value {
            STATUS_SET
        } else {
            STATUS_CLEAR
        }
    }

    /// Handle the switches where both a read and a write have the same
    /// side effect. Returns true when the access has been handled.
    fn read_write_switch(&mut self, address: u16, is_read: bool) -> bool {
        let lsb = address & 0xff;
        if (0x80..0x90).contains(&lsb) {
            self.set_memory_mode(lsb as u8 - 0x80);
            return true;
        }

        match address {
            CLRAUXRD => {
                self.config.aux_read = false;
                true
            }
            SETAUXRD => {
                self.config.aux_read = true;
                true
            }

            CLRAUXWR => {
                self.config.aux_write = false;
                true
            }
            SETAUXWR => {
                self.config.aux_write = true;
                true
            }

            CLRAUXZP => {
                self.config.alt_zp = false;
                true
            }
            SETAUXZP => {
                self.config.alt_zp = true;
                true
            }

            CLR80VID => {
                self.config.col80 = false;
                true
            }
            SET80VID => {
                self.config.col80 = true;
                true
            }

            TXTPAGE1 => {
                self.set_page2(false);
                true
            }
            TXTPAGE2 => {
                self.set_page2(true);
                true
            }

            CLRTEXT => {
                self.video.text_mode = false;
                true
            }
            SETTEXT => {
                self.video.text_mode = true;
                true
            }

            CLRMIXED => {
                self.video.mixed = false;
                true
            }
            SETMIXED => {
                self.video.mixed = true;
                true
            }

            CLRHIRES => {
                self.video.hires_mode = false;
                true
            }
            SETHIRES => {
                self.video.hires_mode = true;
                true
            }

            CLR80COL => {
                // $C000 is the keyboard latch on reads
                if !is_read {
                    self.config.store80 = false;
                    return true;
                }
                false
            }
            SET80COL => {
                self.config.store80 = true;
                true
            }

            // Memory-management state register, inert on the //e
            STATEREG => true,

            // Drive stepper motor phase change
            S6CLRDRVP0..=S6SETDRVP3 => {
                let magnet = ((address - S6CLRDRVP0) / 2) as u8;
                let on = (address - S6CLRDRVP0) % 2 == 1;
                if self.disk.set_magnet(magnet, on) && self.click_on_head_move {
                    let frame_cycles = self.frame_cycles;
                    self.speaker.click(frame_cycles);
                }
                true
            }

            S6MOTOROFF => {
                self.disk.set_motor(false);
                true
            }
            S6MOTORON => {
                self.disk.set_motor(true);
                true
            }

            S6SELDRV1 => {
                self.disk.select_drive(1);
                true
            }
            S6SELDRV2 => {
                self.disk.select_drive(2);
                true
            }

            S6Q6L => {
                if !is_read {
                    self.disk.drive.q6 = false;
                    return true;
                }
                false
            }
            S6Q6H => {
                if is_read {
                    self.disk.drive.q6 = true;
                    return true;
                }
                false
            }

            S6Q7L => {
                self.disk.drive.q7 = false;
                true
            }
            S6Q7H => {
                self.disk.drive.q7 = true;
                true
            }

            _ => false,
        }
    }

    /// Read in the $C000-$C0FF soft-switch area.
    pub fn read_io(&mut self, address: u16) -> u8 {
        if self.read_write_switch(address, true) {
            return 0;
        }

        match address {
            KEYBOARD => self.keyboard.read().0,
            STROBE => {
                let strobe = self.keyboard.read().1;
                self.keyboard.reset_strobe();
                strobe
            }

            // Aux memory is not present; report it off.
            RDRAMRD | RDRAMWR | RDAUXZP => STATUS_CLEAR,

            RDCXROM => Self::status(self.config.using_external_slot_rom),
            RDPAGE2 => Self::status(self.config.page2),
            RD80COL => Self::status(self.config.store80),

            // 80-column display and the alternate charset are not
            // implemented; the firmware still probes them.
            RD80VID | RDALTCH => STATUS_CLEAR,

            // Annunciators and the apple keys read as unpressed
            SETAN0 | CLRAN0 | SETAN1 | CLRAN1 | SETAN2 | CLRAN2 | SETAN3 | CLRAN3 => 0,
            OPNAPPLE | CLSAPPLE => 0,

            SPEAKER => {
                let frame_cycles = self.frame_cycles;
                self.speaker.click(frame_cycles);
                0
            }

            // A read from disk; zero while the sequencer is in write mode
            S6Q6L => {
                if self.disk.drive.q7 {
                    0
                } else {
                    self.disk.read_track_data()
                }
            }

            _ => panic!("unhandled I/O read at ${:04x}", address),
        }
    }

    /// Write in the $C000-$C0FF soft-switch area.
    pub fn write_io(&mut self, address: u16, value: u8) {
        // Any write in the keyboard block unlatches the strobe before the
        // switch's own action runs.
        if (KEYBOARD..=RD80VID).contains(&address) {
            self.keyboard.reset_strobe();
            if (STROBE..=RD80VID).contains(&address) {
                return;
            }
        }

        if self.read_write_switch(address, false) {
            return;
        }

        match address {
            CLRCXROM => self.select_slot_rom(false),
            SETCXROM => self.select_slot_rom(true),

            CLRALTCH => {}
            SETALTCH => panic!("SETALTCH not implemented"),

            CLRC3ROM | SETC3ROM => {}

            // A write to disk while the sequencer is in write mode
            S6Q6H => {
                if self.disk.drive.q6 && self.disk.drive.q7 {
                    self.disk.write_track_data(value);
                }
            }

            _ => panic!("unhandled I/O write at ${:04x} = {:02x}", address, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::{Key, Modifiers};
    use crate::test_support::test_rom;
    use emu_core::cpu_6502::Memory6502;

    fn bus_with_rom() -> Apple2Bus {
        let (mut bus, _audio) = Apple2Bus::new();
        bus.load_rom(&test_rom()).unwrap();
        bus
    }

    #[test]
    fn keyboard_latch_and_strobe() {
        let mut bus = bus_with_rom();
        bus.keyboard.poll(&[Key::A], Modifiers::default());

        assert_eq!(bus.read(KEYBOARD), b'a' | 0x80);
        // Reading the latch does not clear it
        assert_eq!(bus.read(KEYBOARD), b'a' | 0x80);

        // Touching the strobe returns the strobe value and unlatches
        assert_eq!(bus.read(STROBE), b'a' | 0x80);
        assert_eq!(bus.read(KEYBOARD), b'a');
    }

    #[test]
    fn any_write_in_keyboard_block_unlatches() {
        let mut bus = bus_with_rom();
        bus.keyboard.poll(&[Key::B], Modifiers::default());
        assert_eq!(bus.read(KEYBOARD) & 0x80, 0x80);
        bus.write(STROBE, 0xff);
        assert_eq!(bus.read(KEYBOARD) & 0x80, 0);

        bus.keyboard.poll(&[], Modifiers::default());
        bus.keyboard.poll(&[Key::C], Modifiers::default());
        assert_eq!(bus.read(KEYBOARD) & 0x80, 0x80);
        bus.write(SET80COL, 0x00);
        assert_eq!(bus.read(KEYBOARD) & 0x80, 0);
        assert!(bus.config.store80);
    }

    #[test]
    fn video_mode_switches() {
        let mut bus = bus_with_rom();
        assert!(bus.video.text_mode);

        bus.write(CLRTEXT, 0);
        assert!(!bus.video.text_mode);
        bus.read(SETTEXT);
        assert!(bus.video.text_mode);

        bus.read(SETMIXED);
        assert!(bus.video.mixed);
        bus.write(CLRMIXED, 0);
        assert!(!bus.video.mixed);

        bus.write(SETHIRES, 0);
        assert!(bus.video.hires_mode);
        bus.read(CLRHIRES);
        assert!(!bus.video.hires_mode);
    }

    #[test]
    fn page2_switch_and_status() {
        let mut bus = bus_with_rom();
        assert_eq!(bus.read(RDPAGE2), 0x0d);
        bus.read(TXTPAGE2);
        assert!(bus.config.page2);
        assert_eq!(bus.read(RDPAGE2), 0x8d);
        bus.write(TXTPAGE1, 0);
        assert_eq!(bus.read(RDPAGE2), 0x0d);
    }

    #[test]
    fn status_switch_values() {
        let mut bus = bus_with_rom();
        assert_eq!(bus.read(RDCXROM), 0x0d);
        bus.write(SETCXROM, 0);
        assert_eq!(bus.read(RDCXROM), 0x8d);
        bus.write(CLRCXROM, 0);

        assert_eq!(bus.read(RD80COL), 0x0d);
        bus.read(SET80COL);
        assert_eq!(bus.read(RD80COL), 0x8d);

        // Unimplemented aux status reads float low
        assert_eq!(bus.read(RDRAMRD), 0x0d);
        assert_eq!(bus.read(RDRAMWR), 0x0d);
        assert_eq!(bus.read(RDAUXZP), 0x0d);
        assert_eq!(bus.read(RD80VID), 0x0d);
        assert_eq!(bus.read(RDALTCH), 0x0d);
    }

    #[test]
    fn statereg_is_ignored() {
        let mut bus = bus_with_rom();
        assert_eq!(bus.read(STATEREG), 0);
        bus.write(STATEREG, 0x42);
    }

    #[test]
    #[should_panic(expected = "unhandled I/O read")]
    fn unknown_io_read_is_fatal() {
        let mut bus = bus_with_rom();
        bus.read(0xc020);
    }

    #[test]
    #[should_panic(expected = "unhandled I/O write")]
    fn unknown_io_write_is_fatal() {
        let mut bus = bus_with_rom();
        bus.write(0xc030, 0); // the speaker only toggles on reads... writes fall through
    }

    #[test]
    fn speaker_toggles_on_read() {
        let mut bus = bus_with_rom();
        bus.clock(1000);
        assert_eq!(bus.read(SPEAKER), 0);
        // Samples for the elapsed cycles were produced
        assert!(bus.frame_cycles == 1000);
    }

    #[test]
    fn aux_switches_track_state_without_memory_effect() {
        let mut bus = bus_with_rom();
        bus.write(0x2000, 0x77);

        bus.read(SETAUXRD);
        assert!(bus.config.aux_read);
        assert_eq!(bus.read(0x2000), 0x77, "no aux bank exists to switch to");
        bus.write(CLRAUXRD, 0);
        assert!(!bus.config.aux_read);

        bus.read(SETAUXWR);
        assert!(bus.config.aux_write);
        bus.read(CLRAUXWR);
        bus.read(SETAUXZP);
        assert!(bus.config.alt_zp);
        bus.read(CLRAUXZP);
    }

    #[test]
    fn drive_motor_and_select_switches() {
        let mut bus = bus_with_rom();
        assert!(!bus.disk.drive.spinning);
        bus.read(S6MOTORON);
        assert!(bus.disk.drive.spinning);
        bus.read(S6MOTOROFF);
        assert!(!bus.disk.drive.spinning);

        bus.read(S6SELDRV2);
        assert_eq!(bus.disk.drive.drive, 2);
        bus.read(S6SELDRV1);
        assert_eq!(bus.disk.drive.drive, 1);
    }

    #[test]
    fn q6_q7_sequencing() {
        let mut bus = bus_with_rom();
        bus.read(S6Q6H);
        assert!(bus.disk.drive.q6);
        bus.write(S6Q6L, 0);
        assert!(!bus.disk.drive.q6);

        bus.read(S6Q7H);
        assert!(bus.disk.drive.q7);
        bus.read(S6Q7L);
        assert!(!bus.disk.drive.q7);
    }

    #[test]
    fn disk_reads_return_zero_in_write_mode() {
        let mut bus = bus_with_rom();
        bus.read(S6Q7H);
        assert_eq!(bus.read(S6Q6L), 0);
        bus.read(S6Q7L);
        // Back in read mode the track buffer byte comes through and the
        // cursor advances.
        let before = bus.disk.drive.byte_position;
        bus.read(S6Q6L);
        assert_eq!(bus.disk.drive.byte_position, before + 1);
    }

    #[test]
    fn stepper_switch_moves_head() {
        let mut bus = bus_with_rom();
        bus.read(S6SETDRVP0);
        bus.read(S6SETDRVP1);
        assert_eq!(bus.disk.drive.phase, 1);
        bus.read(S6CLRDRVP0);
        bus.read(S6SETDRVP2);
        assert_eq!(bus.disk.drive.phase, 2);
    }

    #[test]
    fn head_move_click_is_optional() {
        let mut bus = bus_with_rom();
        let (speaker, consumer) = crate::speaker::Speaker::new();
        bus.speaker = speaker;
        bus.click_on_head_move = true;
        bus.clock(100_000);

        bus.read(S6SETDRVP0);
        bus.read(S6SETDRVP1);
        // The click flushed the samples owed up to the watermark
        assert!(consumer.pending() > 0);
    }
}
