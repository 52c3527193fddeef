//! Video mode state consumed by the external renderer.
//!
//! The machine only tracks which display mode the firmware selected; all
//! actual drawing happens host-side against the page tables and these
//! flags.
//!
//! ```text
//!                   text_mode  hires_mode  mixed
//! text              1          0           n/a
//! lores + text      0          0           1
//! lores             0          0           0
//! hires             n/a        1           0
//! hires + text      n/a        1           1
//! ```

use serde::{Deserialize, Serialize};

pub const TEXT_PAGE1_BASE: u16 = 0x0400;
pub const TEXT_PAGE2_BASE: u16 = 0x0800;
pub const HIRES_PAGE1_BASE: u16 = 0x2000;
pub const HIRES_PAGE2_BASE: u16 = 0x4000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VideoState {
    pub text_mode: bool,
    pub hires_mode: bool,
    pub mixed: bool,
}

impl Default for VideoState {
    fn default() -> Self {
        Self {
            text_mode: true,
            hires_mode: false,
            mixed: false,
        }
    }
}

impl VideoState {
    /// Base address of the active text page.
    pub fn text_page_base(&self, page2: bool) -> u16 {
        if page2 {
            TEXT_PAGE2_BASE
        } else {
            TEXT_PAGE1_BASE
        }
    }

    /// Base address of the active hi-res page.
    pub fn hires_page_base(&self, page2: bool) -> u16 {
        if page2 {
            HIRES_PAGE2_BASE
        } else {
            HIRES_PAGE1_BASE
        }
    }
}

/// Host display options toggled through the frame driver's hot keys and
/// the command line. The renderer treats monochrome as one switch: a
/// desaturated palette for text/lores and no phase-shift colorization for
/// hires.
#[derive(Debug, Clone, Copy)]
pub struct DisplayOptions {
    pub monochrome: bool,
    pub show_fps: bool,
    pub scale: f64,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            monochrome: false,
            show_fps: false,
            scale: 2.0,
        }
    }
}
