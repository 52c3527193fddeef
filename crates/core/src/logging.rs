//! Centralized logging configuration for the emulator.
//!
//! Subsystem logging is controlled at runtime through a global, thread-safe
//! configuration: one level per category, with a global fallback level. The
//! `log!` macro checks the configuration before formatting anything, so
//! disabled categories cost a pair of atomic loads.

use std::sync::atomic::{AtomicU8, Ordering};

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Log category for the emulator subsystems
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    /// CPU execution (BRK, unknown opcodes, PC tracing)
    Cpu,
    /// MMU / soft-switch access
    Mmu,
    /// Disk controller (head movement, sector writes)
    Disk,
    /// Keyboard latch
    Keyboard,
    /// Speaker / sample queue
    Audio,
    /// Video mode switches
    Video,
}

/// Global logging configuration
pub struct LogConfig {
    global_level: AtomicU8,
    cpu_level: AtomicU8,
    mmu_level: AtomicU8,
    disk_level: AtomicU8,
    keyboard_level: AtomicU8,
    audio_level: AtomicU8,
    video_level: AtomicU8,
}

impl LogConfig {
    const fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            cpu_level: AtomicU8::new(LogLevel::Off as u8),
            mmu_level: AtomicU8::new(LogLevel::Off as u8),
            disk_level: AtomicU8::new(LogLevel::Off as u8),
            keyboard_level: AtomicU8::new(LogLevel::Off as u8),
            audio_level: AtomicU8::new(LogLevel::Off as u8),
            video_level: AtomicU8::new(LogLevel::Off as u8),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        static INSTANCE: LogConfig = LogConfig::new();
        &INSTANCE
    }

    /// Set the global log level (applies to all categories unless overridden)
    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    /// Get the global log level
    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    fn slot(&self, category: LogCategory) -> &AtomicU8 {
        match category {
            LogCategory::Cpu => &self.cpu_level,
            LogCategory::Mmu => &self.mmu_level,
            LogCategory::Disk => &self.disk_level,
            LogCategory::Keyboard => &self.keyboard_level,
            LogCategory::Audio => &self.audio_level,
            LogCategory::Video => &self.video_level,
        }
    }

    /// Set log level for a specific category
    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.slot(category).store(level as u8, Ordering::Relaxed);
    }

    /// Get log level for a specific category
    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.slot(category).load(Ordering::Relaxed))
    }

    /// Check if a message should be logged for the given category and
    /// level. A category-specific level takes precedence; `Off` falls back
    /// to the global level.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        let category_level = self.get_level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.get_global_level()
        }
    }

    /// Reset all logging to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in [
            LogCategory::Cpu,
            LogCategory::Mmu,
            LogCategory::Disk,
            LogCategory::Keyboard,
            LogCategory::Audio,
            LogCategory::Video,
        ] {
            self.set_level(category, LogLevel::Off);
        }
    }
}

/// Convenience macro for logging
#[macro_export]
macro_rules! log {
    ($category:expr, $level:expr, $($arg:tt)*) => {
        if $crate::logging::LogConfig::global().should_log($category, $level) {
            eprintln!($($arg)*);
        }
    };
}
