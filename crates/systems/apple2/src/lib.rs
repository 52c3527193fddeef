//! Apple //e system implementation
//!
//! One owned machine aggregate ties the 6502 core to the bus and its
//! peripherals. The frame driver advances exactly one 60 Hz frame of
//! simulated time per call; the host renderer, audio callback and keyboard
//! adapter talk to the machine through the state this crate exposes.

pub mod bus;
pub mod disk;
pub mod io;
pub mod keyboard;
pub mod speaker;
pub mod video;

use serde_json::Value;
use thiserror::Error;

use emu_core::cpu_6502::{Cpu6502, FirmwareShortcut, Memory6502, RunExit, RunOptions};
use emu_core::{MountPointInfo, System};

use bus::Apple2Bus;
use disk::DiskError;
use keyboard::{Key, Modifiers};
use speaker::AudioConsumer;
use video::DisplayOptions;

/// NTSC Apple II CPU clock.
pub const CPU_HZ: u64 = 1_023_000;

/// CPU cycles in one 60 Hz frame.
pub const CYCLES_PER_FRAME: u64 = CPU_HZ / 60;

/// Monitor WAIT routine, skipped by the `disable-wait` option.
const FIRMWARE_WAIT: u16 = 0xfca8;

/// DOS 3.3 motor-on wait (MSWAIT), skipped by `disable-dos-delay`.
const DOS_MOTOR_WAIT: u16 = 0xba00;

/// DOS 3.3 arm-move delay loop, skipped by `disable-dos-delay`:
///   BD9E: A0 12     LDY #$12
///   BDA0: A2 00     LDX #$00
///   BDA2: CA        DEX
///   BDA3: D0 FD     BNE $BDA2
///   BDA5: 88        DEY
///   BDA6: D0 FA     BNE $BDA0
///   BDA8: 60        RTS
const DOS_DELAY_LOOP: u16 = 0xbd9e;
const DOS_DELAY_SIGNATURE: &[u8] = &[
    0xa0, 0x12, 0xa2, 0x00, 0xca, 0xd0, 0xfd, 0x88, 0xd0, 0xfa, 0x60,
];
const DOS_DELAY_RESUME: u16 = 0xbda8;

/// The byte holding the firmware's reset-vector checksum; zeroing it
/// forces a cold boot on the next reset.
const RESET_CHECKSUM_BYTE: u16 = 0x03f4;

#[derive(Debug, Error)]
pub enum Apple2Error {
    #[error("Invalid ROM length {0}: expected a 16 KiB image, optionally followed by a 4 KiB external slot ROM")]
    InvalidRomLength(usize),
    #[error("Disk error: {0}")]
    Disk(#[from] DiskError),
    #[error("Invalid mount point: {0}")]
    InvalidMountPoint(String),
    #[error("Audio consumer already taken")]
    AudioConsumerTaken,
}

/// Run-time switches, mostly mapped from the command line.
#[derive(Debug, Clone, Default)]
pub struct EmulatorOptions {
    /// Trace each decoded instruction with registers and flags.
    pub trace: bool,
    pub break_address: Option<u16>,
    /// Skip JSRs to the monitor WAIT.
    pub disable_firmware_wait: bool,
    /// Skip the DOS motor-on and arm-move delays.
    pub disable_dos_delay: bool,
    /// Enable the CPU test-ROM traps.
    pub running_tests: bool,
}

/// Everything the host gathered from its keyboard this frame.
#[derive(Debug, Clone, Default)]
pub struct InputSnapshot {
    pub keys: Vec<Key>,
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
    pub caps_lock: bool,
}

/// Released-after-held edge detectors for the global hot-key chords.
#[derive(Debug, Default)]
struct HotkeyState {
    reset_down: bool,
    fps_down: bool,
    monochrome_down: bool,
}

/// The Apple //e machine.
pub struct Apple2System {
    cpu: Cpu6502<Apple2Bus>,
    pub total_cycles: u64,
    pub options: EmulatorOptions,
    pub display: DisplayOptions,
    audio: Option<AudioConsumer>,
    hotkeys: HotkeyState,
    rom_mounted: bool,
}

impl Default for Apple2System {
    fn default() -> Self {
        Self::new()
    }
}

impl Apple2System {
    pub fn new() -> Self {
        let (bus, audio) = Apple2Bus::new();
        Self {
            cpu: Cpu6502::new(bus),
            total_cycles: 0,
            options: EmulatorOptions::default(),
            display: DisplayOptions::default(),
            audio: Some(audio),
            hotkeys: HotkeyState::default(),
            rom_mounted: false,
        }
    }

    pub fn bus(&self) -> &Apple2Bus {
        &self.cpu.memory
    }

    pub fn bus_mut(&mut self) -> &mut Apple2Bus {
        &mut self.cpu.memory
    }

    pub fn cpu(&self) -> &Cpu6502<Apple2Bus> {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu6502<Apple2Bus> {
        &mut self.cpu
    }

    /// Hand the consumer half of the audio queue to the host audio
    /// callback. Available exactly once.
    pub fn take_audio_consumer(&mut self) -> Option<AudioConsumer> {
        self.audio.take()
    }

    /// Invalidate the firmware's reset-vector checksum so the next reset
    /// cold-boots instead of resuming.
    pub fn set_cold_start_reset(&mut self) {
        self.cpu.memory.write(RESET_CHECKSUM_BYTE, 0);
    }

    fn shortcut_table(&self) -> Vec<FirmwareShortcut> {
        let mut shortcuts = Vec::new();
        if self.options.disable_firmware_wait {
            shortcuts.push(FirmwareShortcut::SkipJsr {
                target: FIRMWARE_WAIT,
                a: Some(0),
            });
        }
        if self.options.disable_dos_delay {
            shortcuts.push(FirmwareShortcut::SkipJsr {
                target: DOS_MOTOR_WAIT,
                a: None,
            });
            shortcuts.push(FirmwareShortcut::SkipLoop {
                pc: DOS_DELAY_LOOP,
                signature: DOS_DELAY_SIGNATURE,
                resume: DOS_DELAY_RESUME,
                x: 0,
                y: 0,
            });
        }
        shortcuts
    }

    /// Process hot-key chords and feed the keyboard latch. Call once per
    /// frame before `step_frame`. Each chord fires when its letter is
    /// released while Ctrl-Alt stay held.
    pub fn handle_input(&mut self, input: &InputSnapshot) {
        let chord = input.control && input.alt;

        if chord && input.keys.contains(&Key::R) {
            self.hotkeys.reset_down = true;
        } else if chord && self.hotkeys.reset_down {
            self.hotkeys.reset_down = false;
            self.reset();
        } else {
            self.hotkeys.reset_down = false;
        }

        if chord && input.keys.contains(&Key::F) {
            self.hotkeys.fps_down = true;
        } else if chord && self.hotkeys.fps_down {
            self.hotkeys.fps_down = false;
            self.display.show_fps = !self.display.show_fps;
        } else {
            self.hotkeys.fps_down = false;
        }

        if chord && input.keys.contains(&Key::M) {
            self.hotkeys.monochrome_down = true;
        } else if chord && self.hotkeys.monochrome_down {
            self.hotkeys.monochrome_down = false;
            self.display.monochrome = !self.display.monochrome;
        } else {
            self.hotkeys.monochrome_down = false;
        }

        if !(self.hotkeys.fps_down || self.hotkeys.monochrome_down) {
            self.cpu.memory.keyboard.poll(
                &input.keys,
                Modifiers {
                    shift: input.shift,
                    control: input.control,
                    caps_lock: input.caps_lock,
                },
            );
        }
    }

    /// Run with a breakpoint for up to `max_seconds` of simulated time.
    /// Used by boot tests to chase the firmware through its milestones.
    pub fn run_until_breakpoint(&mut self, address: u16, max_seconds: u64) -> RunExit {
        let shortcuts = self.shortcut_table();
        let options = RunOptions {
            trace: self.options.trace,
            break_address: Some(address),
            running_tests: self.options.running_tests,
            shortcuts: &shortcuts,
        };
        let exit = self.cpu.run(&options, max_seconds * CPU_HZ);
        self.total_cycles += self.cpu.frame_cycles;
        exit
    }
}

impl System for Apple2System {
    type Error = Apple2Error;

    fn reset(&mut self) {
        self.cpu.memory.reset_memory_configuration();
        self.cpu.reset();
    }

    /// One frame: run the CPU for `CYCLES_PER_FRAME`, then flush the audio
    /// samples the frame still owes. Input polling happens separately in
    /// `handle_input`; rendering is the frontend's concern.
    fn step_frame(&mut self) -> Result<RunExit, Self::Error> {
        let shortcuts = self.shortcut_table();
        let options = RunOptions {
            trace: self.options.trace,
            break_address: self.options.break_address,
            running_tests: self.options.running_tests,
            shortcuts: &shortcuts,
        };

        self.cpu.memory.frame_cycles = 0;
        self.cpu.memory.speaker.begin_frame();

        let exit = self.cpu.run(&options, CYCLES_PER_FRAME);

        let frame_cycles = self.cpu.frame_cycles;
        self.cpu.memory.speaker.forward_to_frame_cycle(frame_cycles);
        self.total_cycles += frame_cycles;

        Ok(exit)
    }

    fn save_state(&self) -> Value {
        let bus = self.bus();
        serde_json::json!({
            "version": 1,
            "system": "apple2",
            "total_cycles": self.total_cycles,
            "cpu": {
                "a": self.cpu.a,
                "x": self.cpu.x,
                "y": self.cpu.y,
                "sp": self.cpu.sp,
                "p": self.cpu.p,
                "pc": self.cpu.pc,
                "pending_irq": self.cpu.pending_irq,
                "pending_nmi": self.cpu.pending_nmi,
            },
            "ram": &bus.physical.main_ram,
            "memory_config": bus.config,
            "video": bus.video,
            "drive": bus.disk.drive,
        })
    }

    fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error> {
        let invalid = || serde_json::from_str::<()>("invalid save state").unwrap_err();

        if v["version"].as_u64() != Some(1) || v["system"].as_str() != Some("apple2") {
            return Err(invalid());
        }

        self.total_cycles = v["total_cycles"].as_u64().unwrap_or(0);

        let cpu = &v["cpu"];
        self.cpu.a = cpu["a"].as_u64().unwrap_or(0) as u8;
        self.cpu.x = cpu["x"].as_u64().unwrap_or(0) as u8;
        self.cpu.y = cpu["y"].as_u64().unwrap_or(0) as u8;
        self.cpu.sp = cpu["sp"].as_u64().unwrap_or(0xff) as u8;
        self.cpu.p = cpu["p"].as_u64().unwrap_or(0) as u8;
        self.cpu.pc = cpu["pc"].as_u64().unwrap_or(0) as u16;
        self.cpu.pending_irq = cpu["pending_irq"].as_bool().unwrap_or(false);
        self.cpu.pending_nmi = cpu["pending_nmi"].as_bool().unwrap_or(false);

        let ram: Vec<u8> = serde_json::from_value(v["ram"].clone())?;
        if ram.len() != self.cpu.memory.physical.main_ram.len() {
            return Err(invalid());
        }
        self.cpu.memory.physical.main_ram = ram;

        self.cpu.memory.config = serde_json::from_value(v["memory_config"].clone())?;
        self.cpu.memory.video = serde_json::from_value(v["video"].clone())?;
        self.cpu.memory.disk.drive = serde_json::from_value(v["drive"].clone())?;
        self.cpu.memory.apply_memory_configuration();

        Ok(())
    }

    fn supports_save_states(&self) -> bool {
        true
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![
            MountPointInfo {
                id: "Rom".to_string(),
                name: "Firmware ROM".to_string(),
                extensions: vec!["rom".to_string(), "bin".to_string()],
                required: true,
            },
            MountPointInfo {
                id: "Disk1".to_string(),
                name: "Disk Drive 1".to_string(),
                extensions: vec!["dsk".to_string(), "do".to_string()],
                required: false,
            },
        ]
    }

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error> {
        match mount_point_id {
            "Rom" => {
                self.cpu.memory.load_rom(data)?;
                self.rom_mounted = true;
                Ok(())
            }
            "Disk1" => {
                self.cpu.memory.disk.load_image(data)?;
                Ok(())
            }
            other => Err(Apple2Error::InvalidMountPoint(other.to_string())),
        }
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error> {
        match mount_point_id {
            "Disk1" => {
                self.cpu.memory.disk.eject();
                Ok(())
            }
            other => Err(Apple2Error::InvalidMountPoint(other.to_string())),
        }
    }

    fn is_mounted(&self, mount_point_id: &str) -> bool {
        match mount_point_id {
            "Rom" => self.rom_mounted,
            "Disk1" => self.cpu.memory.disk.is_mounted(),
            _ => false,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::test_rom;
    use super::*;

    fn test_system() -> Apple2System {
        let mut sys = Apple2System::new();
        sys.mount("Rom", &test_rom()).unwrap();
        sys
    }

    fn write_program(sys: &mut Apple2System, address: u16, program: &[u8]) {
        for (i, &byte) in program.iter().enumerate() {
            sys.bus_mut().write(address + i as u16, byte);
        }
    }

    #[test]
    fn reset_loads_vector_and_restores_mapping() {
        let mut sys = test_system();
        sys.bus_mut().set_upper_read_mapped_to_rom(false);
        sys.reset();
        assert_eq!(sys.cpu().pc, 0xff00);
        assert!(sys.bus().config.upper_read_mapped_to_rom);
        assert_eq!(sys.cpu().sp, 0xff);
    }

    #[test]
    fn cold_start_reset_clears_checksum_byte() {
        let mut sys = test_system();
        sys.bus_mut().write(0x03f4, 0xa5);
        sys.set_cold_start_reset();
        assert_eq!(sys.bus_mut().read(0x03f4), 0);
    }

    #[test]
    fn frame_runs_one_frame_of_cycles() {
        let mut sys = test_system();
        sys.reset();
        let exit = sys.step_frame().unwrap();
        assert_eq!(exit, RunExit::CycleBudget);
        assert!(sys.total_cycles >= CYCLES_PER_FRAME);
        assert!(sys.total_cycles < CYCLES_PER_FRAME + 7);

        sys.step_frame().unwrap();
        assert!(sys.total_cycles >= 2 * CYCLES_PER_FRAME);
    }

    #[test]
    fn frame_produces_audio_samples() {
        let mut sys = test_system();
        sys.reset();
        let consumer = sys.take_audio_consumer().unwrap();
        sys.step_frame().unwrap();
        let expected = (speaker::AUDIO_SAMPLE_RATE / 60) as usize;
        assert_eq!(consumer.pending(), expected);
        assert!(sys.take_audio_consumer().is_none());
    }

    /// The WAIT routine burns (26 + 27A + 5A^2)/2 cycles for the value in
    /// the accumulator. This pins down the branch-taken cycle accounting.
    #[test]
    fn bell_delay_cycle_counts() {
        for &delay in &[1u8, 2, 3, 4, 12, 0x10, 0x20, 0x40, 0x80, 0xc0, 0xff] {
            let mut sys = test_system();
            write_program(
                &mut sys,
                0x0800,
                &[0xa9, delay, 0x20, 0xa8, 0xfc, 0x00],
            );
            sys.cpu_mut().pc = 0x0800;

            let options = RunOptions {
                break_address: Some(0x0805),
                ..Default::default()
            };
            let exit = sys.cpu_mut().run(&options, CPU_HZ * 1000);
            assert_eq!(exit, RunExit::Breakpoint(0x0805));

            let d = delay as u64;
            let expected = (26 + 27 * d + 5 * d * d) / 2;
            // Exclude the cycles taken by the LDA
            let got = sys.cpu().frame_cycles - 2;
            assert_eq!(got, expected, "delay {}", delay);
        }
    }

    #[test]
    fn firmware_wait_shortcut_skips_the_delay() {
        let mut sys = test_system();
        sys.options.disable_firmware_wait = true;
        write_program(&mut sys, 0x0800, &[0xa9, 0xff, 0x20, 0xa8, 0xfc, 0x00]);
        sys.cpu_mut().pc = 0x0800;

        let exit = sys.run_until_breakpoint(0x0805, 1);
        assert_eq!(exit, RunExit::Breakpoint(0x0805));
        assert_eq!(sys.cpu().a, 0, "the skipped WAIT leaves A zeroed");
        assert_eq!(sys.cpu().frame_cycles, 8, "LDA plus the charged JSR");
    }

    #[test]
    fn dos_delay_shortcut_requires_matching_signature() {
        let mut sys = test_system();
        sys.options.disable_dos_delay = true;

        // Plant the delay loop body in RAM where DOS would have it
        write_program(
            &mut sys,
            0xbd9e,
            &[0xa0, 0x12, 0xa2, 0x00, 0xca, 0xd0, 0xfd, 0x88, 0xd0, 0xfa, 0x60],
        );
        write_program(&mut sys, 0x0800, &[0x20, 0x9e, 0xbd, 0x00]);
        sys.cpu_mut().pc = 0x0800;

        let exit = sys.run_until_breakpoint(0x0803, 1);
        assert_eq!(exit, RunExit::Breakpoint(0x0803));
        assert_eq!(sys.cpu().x, 0);
        assert_eq!(sys.cpu().y, 0);
        // JSR (6) + skip (2) + RTS (6)
        assert_eq!(sys.cpu().frame_cycles, 14);
    }

    #[test]
    fn hotkey_chords_fire_on_release() {
        let mut sys = test_system();
        sys.cpu_mut().pc = 0x1234;

        let held = InputSnapshot {
            keys: vec![Key::R],
            control: true,
            alt: true,
            ..Default::default()
        };
        sys.handle_input(&held);
        assert_eq!(sys.cpu().pc, 0x1234, "nothing fires while held");

        let released = InputSnapshot {
            control: true,
            alt: true,
            ..Default::default()
        };
        sys.handle_input(&released);
        assert_eq!(sys.cpu().pc, 0xff00, "reset fired on release");

        // FPS and monochrome toggles
        let f_held = InputSnapshot {
            keys: vec![Key::F],
            control: true,
            alt: true,
            ..Default::default()
        };
        sys.handle_input(&f_held);
        sys.handle_input(&released);
        assert!(sys.display.show_fps);

        let m_held = InputSnapshot {
            keys: vec![Key::M],
            control: true,
            alt: true,
            ..Default::default()
        };
        sys.handle_input(&m_held);
        sys.handle_input(&released);
        assert!(sys.display.monochrome);
    }

    #[test]
    fn keyboard_not_polled_while_chord_pending() {
        let mut sys = test_system();
        let chord = InputSnapshot {
            keys: vec![Key::F, Key::A],
            control: true,
            alt: true,
            ..Default::default()
        };
        sys.handle_input(&chord);
        assert_eq!(sys.bus().keyboard.read().0, 0);

        // A plain keypress lands in the latch
        let plain = InputSnapshot {
            keys: vec![Key::A],
            ..Default::default()
        };
        sys.handle_input(&plain);
        assert_eq!(sys.bus().keyboard.read().0, b'a' | 0x80);
    }

    #[test]
    fn mount_points_and_validation() {
        let mut sys = Apple2System::new();
        let mounts = sys.mount_points();
        assert_eq!(mounts.len(), 2);
        assert!(mounts[0].required);
        assert!(!sys.is_mounted("Rom"));

        assert!(matches!(
            sys.mount("Rom", &[0u8; 123]),
            Err(Apple2Error::InvalidRomLength(123))
        ));
        sys.mount("Rom", &test_rom()).unwrap();
        assert!(sys.is_mounted("Rom"));

        assert!(matches!(
            sys.mount("Disk1", &[0u8; 100]),
            Err(Apple2Error::Disk(_))
        ));
        sys.mount("Disk1", &vec![0u8; disk::IMAGE_LENGTH]).unwrap();
        assert!(sys.is_mounted("Disk1"));
        sys.unmount("Disk1").unwrap();
        assert!(!sys.is_mounted("Disk1"));

        assert!(matches!(
            sys.mount("Tape", &[]),
            Err(Apple2Error::InvalidMountPoint(_))
        ));
    }

    #[test]
    fn save_state_roundtrip() {
        let mut sys = test_system();
        sys.reset();
        sys.cpu_mut().a = 0x42;
        sys.cpu_mut().pc = 0x1234;
        sys.bus_mut().write(0x2000, 0x99);
        sys.bus_mut().set_d000_bank(1);
        sys.bus_mut().video.hires_mode = true;
        sys.total_cycles = 777;

        let state = sys.save_state();
        assert_eq!(state["version"], 1);
        assert_eq!(state["system"], "apple2");

        let mut restored = test_system();
        restored.load_state(&state).unwrap();
        assert_eq!(restored.cpu().a, 0x42);
        assert_eq!(restored.cpu().pc, 0x1234);
        assert_eq!(restored.bus_mut().read(0x2000), 0x99);
        assert_eq!(restored.bus().config.d000_bank, 1);
        assert!(restored.bus().video.hires_mode);
        assert_eq!(restored.total_cycles, 777);
    }

    #[test]
    fn load_state_rejects_wrong_system() {
        let mut sys = test_system();
        let bogus = serde_json::json!({"version": 1, "system": "nes"});
        assert!(sys.load_state(&bogus).is_err());
    }
}
