//! Shared scaffolding for the firmware-dependent integration tests.

use std::fs;
use std::path::PathBuf;

use emu_apple2::Apple2System;
use emu_core::System;

/// Read a test asset from the workspace root, if present.
pub fn asset(name: &str) -> Option<Vec<u8>> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../..")
        .join(name);
    fs::read(path).ok()
}

/// A machine cold-booting the real firmware with a DOS 3.3 image in the
/// drive, or `None` when the assets are missing.
pub fn boot_system() -> Option<Apple2System> {
    let rom = asset("apple2e.rom")?;
    let image = asset("dos33.dsk")?;

    let mut sys = Apple2System::new();
    sys.mount("Rom", &rom).expect("firmware ROM");
    sys.mount("Disk1", &image).expect("disk image");
    sys.set_cold_start_reset();
    sys.reset();
    Some(sys)
}
