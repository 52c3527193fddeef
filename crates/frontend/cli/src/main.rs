//! Headless command-line frontend for the Apple //e emulator.
//!
//! Boots the machine from a firmware ROM and an optional DOS 3.3 disk
//! image and runs 60 Hz frames until a breakpoint, a trap, or the frame
//! budget is exhausted. The host display, audio device, and keyboard are
//! external concerns; the CLI drains the audio queue the way a host audio
//! callback would and leaves the page tables and video state readable for
//! a renderer.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::fs::File;
use std::io::Write;

use emu_apple2::speaker::AUDIO_SAMPLE_RATE;
use emu_apple2::Apple2System;
use emu_core::cpu_6502::{ArrayMemory, Cpu6502, RunExit, RunOptions};
use emu_core::logging::{LogConfig, LogLevel};
use emu_core::System;

#[derive(Parser)]
#[command(about = "Apple //e emulator")]
struct Args {
    /// Path to a 143,360-byte DOS 3.3 disk image
    image: Option<String>,

    /// Path to the Apple //e firmware ROM
    #[arg(long, default_value = "apple2e.rom")]
    rom: String,

    /// Show instructions while running
    #[arg(long, default_value_t = false)]
    show_instructions: bool,

    /// Ignore JSRs to the firmware wait at $FCA8
    #[arg(long = "disable-wait", default_value_t = false)]
    disable_wait: bool,

    /// Ignore DOS arm move and motor on waits
    #[arg(long, default_value_t = false)]
    disable_dos_delay: bool,

    /// Break on address (1 or 2 hex bytes)
    #[arg(long = "break")]
    break_address: Option<String>,

    /// Mute sound
    #[arg(long, default_value_t = false)]
    mute: bool,

    /// Video scale handed to the renderer
    #[arg(long, default_value_t = 2.0)]
    scale: f64,

    /// Click speaker when drive head moves
    #[arg(long, default_value_t = false)]
    drive_head_click: bool,

    /// Stop after this many frames instead of running until a break
    #[arg(long)]
    frames: Option<u64>,

    /// Run a flat 64 KiB CPU test binary with the test traps enabled
    #[arg(long = "cpu-test")]
    cpu_test: Option<String>,

    /// Dump a JSON save state to this file on exit
    #[arg(long)]
    save: Option<String>,

    /// Global log level (off, error, warn, info, debug, trace)
    #[arg(long)]
    log: Option<String>,
}

/// Decode a command-line break address of one or two hex bytes
/// ("ff" -> $00FF, "b700" -> $B700).
fn parse_break_address(s: &str) -> Result<u16> {
    if s.is_empty() || s.len() > 4 {
        bail!("invalid break address: {}", s);
    }
    u16::from_str_radix(s, 16).with_context(|| format!("invalid break address: {}", s))
}

/// The interrupt test ROM drives IRQ and NMI through an open-collector
/// feedback port: bit 0 requests an IRQ, bit 1 an NMI, edges only.
const INTERRUPT_PORT: u16 = 0xbffc;

/// Load a raw binary over the whole address space and run it with the
/// test-ROM traps active, the way the 6502 test ROMs expect. Runs one
/// instruction at a time so writes to the interrupt feedback port raise
/// the pending flags before the next instruction, like the open-collector
/// line they model.
fn run_cpu_test(path: &str, trace: bool, break_address: Option<u16>) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("unable to read test binary {}", path))?;

    let mut memory = ArrayMemory::new();
    let len = bytes.len().min(memory.data.len());
    memory.data[..len].copy_from_slice(&bytes[..len]);

    let mut cpu = Cpu6502::new(memory);
    cpu.pc = 0x0800;

    let options = RunOptions {
        trace,
        break_address,
        running_tests: true,
        shortcuts: &[],
    };

    let mut old_port = cpu.memory.data[INTERRUPT_PORT as usize];
    let exit = loop {
        match cpu.run(&options, 1) {
            RunExit::CycleBudget => {
                let port = cpu.memory.data[INTERRUPT_PORT as usize];
                if port != old_port {
                    let irq = port & 0x01 != 0;
                    let nmi = port & 0x02 != 0;
                    if (old_port & 0x01 != 0) != irq {
                        cpu.pending_irq = irq;
                    }
                    if (old_port & 0x02 != 0) != nmi {
                        cpu.pending_nmi = nmi;
                    }
                    old_port = port;
                }
            }
            exit => break exit,
        }
    };

    match exit {
        RunExit::FunctionalTestPassed => println!("Functional tests passed"),
        RunExit::InterruptTestPassed => println!("Interrupt tests passed"),
        RunExit::Trap(addr) => println!("Trap at ${:04x}", addr),
        RunExit::Breakpoint(addr) => {
            println!("Break at ${:04x}", addr);
            println!("{}", cpu.trace_line());
        }
        RunExit::UnknownOpcode { pc, opcode } => {
            bail!("unknown opcode ${:02x} at ${:04x}", opcode, pc)
        }
        RunExit::CycleBudget => {}
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if let Some(level) = &args.log {
        match LogLevel::parse(level) {
            Some(level) => LogConfig::global().set_global_level(level),
            None => bail!("invalid log level: {}", level),
        }
    }

    let break_address = args
        .break_address
        .as_deref()
        .map(parse_break_address)
        .transpose()?;

    if let Some(path) = &args.cpu_test {
        return run_cpu_test(path, args.show_instructions, break_address);
    }

    let mut system = Apple2System::new();

    let rom = fs::read(&args.rom).with_context(|| format!("unable to read ROM {}", args.rom))?;
    system.mount("Rom", &rom)?;
    log::info!("loaded ROM {} ({} bytes)", args.rom, rom.len());

    if let Some(image_path) = &args.image {
        let image = fs::read(image_path)
            .with_context(|| format!("unable to read disk image {}", image_path))?;
        system.mount("Disk1", &image)?;
        log::info!("loaded disk image {}", image_path);
    }

    system.options.trace = args.show_instructions;
    system.options.break_address = break_address;
    system.options.disable_firmware_wait = args.disable_wait;
    system.options.disable_dos_delay = args.disable_dos_delay;
    system.bus_mut().click_on_head_move = args.drive_head_click;
    system.display.scale = args.scale;

    let mut audio = system
        .take_audio_consumer()
        .ok_or(emu_apple2::Apple2Error::AudioConsumerTaken)?;
    audio.mute = args.mute;
    // One frame's worth of 16-bit stereo samples
    let mut audio_buffer = vec![0u8; (AUDIO_SAMPLE_RATE as usize / 60) * 4];

    system.set_cold_start_reset();
    system.reset();

    let mut frame = 0u64;
    loop {
        if let Some(frames) = args.frames {
            if frame >= frames {
                break;
            }
        }

        let exit = system.step_frame()?;
        audio.read(&mut audio_buffer);

        match exit {
            RunExit::CycleBudget => {}
            RunExit::Breakpoint(addr) => {
                println!("Break at ${:04x}", addr);
                println!("{}", system.cpu().trace_line());
                break;
            }
            RunExit::Trap(addr) => {
                println!("Trap at ${:04x}", addr);
                break;
            }
            RunExit::FunctionalTestPassed => {
                println!("Functional tests passed");
                break;
            }
            RunExit::InterruptTestPassed => {
                println!("Interrupt tests passed");
                break;
            }
            RunExit::UnknownOpcode { pc, opcode } => {
                bail!("unknown opcode ${:02x} at ${:04x}", opcode, pc)
            }
        }

        frame += 1;
    }

    if let Some(path) = &args.save {
        let state = system.save_state();
        let mut file = File::create(path).with_context(|| format!("unable to create {}", path))?;
        write!(file, "{}", serde_json::to_string_pretty(&state)?)?;
    }

    // Flush the disk image exactly once if any sector was written
    if let Some(image_path) = &args.image {
        if system.bus().disk.is_dirty() {
            fs::write(image_path, system.bus().disk.image_bytes())
                .with_context(|| format!("unable to flush disk image {}", image_path))?;
            log::info!("flushed disk image {}", image_path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_address_parsing() {
        assert_eq!(parse_break_address("ff").unwrap(), 0x00ff);
        assert_eq!(parse_break_address("b700").unwrap(), 0xb700);
        assert_eq!(parse_break_address("0").unwrap(), 0x0000);
        assert!(parse_break_address("").is_err());
        assert!(parse_break_address("12345").is_err());
        assert!(parse_break_address("xyz").is_err());
    }
}
