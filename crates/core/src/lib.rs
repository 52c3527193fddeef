//! Core emulator primitives and traits.

pub mod cpu_6502;
pub mod logging;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cpu_6502::RunExit;

/// Description of a mount point (media slot) that a system supports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPointInfo {
    /// Unique identifier for this mount point (e.g., "Rom", "Disk1")
    pub id: String,
    /// User-friendly name for display (e.g., "Firmware ROM", "Disk Drive 1")
    pub name: String,
    /// File extensions accepted by this mount point (e.g., ["dsk", "do"])
    pub extensions: Vec<String>,
    /// Whether this mount point is required for the system to function
    pub required: bool,
}

/// A high-level System trait tying components together.
///
/// `step_frame` advances exactly one frame of simulated time and reports the
/// CPU's exit status; rendering is the frontend's concern and reads the
/// machine state directly.
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reset to initial power-on state
    fn reset(&mut self);

    /// Emulate one frame of simulated time.
    fn step_frame(&mut self) -> Result<RunExit, Self::Error>;

    /// Return a JSON-serializable save state for debugging.
    /// Note: Save states should NOT include ROM or mounted media data,
    /// only emulator state (CPU, RAM, peripheral state).
    fn save_state(&self) -> Value;

    /// Load a JSON save state.
    fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error>;

    /// Check if this system supports save/load state functionality
    fn supports_save_states(&self) -> bool {
        false
    }

    /// Get the list of mount points this system supports
    fn mount_points(&self) -> Vec<MountPointInfo>;

    /// Load media into a specific mount point
    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error>;

    /// Unload media from a specific mount point
    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error>;

    /// Check if a mount point has media loaded
    fn is_mounted(&self, mount_point_id: &str) -> bool;
}
