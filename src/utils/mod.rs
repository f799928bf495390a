//! Utility module for the player core
//!
//! This module provides common utilities used throughout the crate:
//! - Error handling with custom error types
//! - Configuration management
//! - The `Tick` time unit and its helpers

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::{AudioConfig, Config, GeneralConfig, PlayerConfig, VideoConfig};
pub use error::{CoreError, IntoCoreError, Result};

/// Media time in microseconds.
///
/// Signed so that delays and relative seeks share the unit. "Invalid" times
/// are modelled as `Option<Tick>` rather than a sentinel.
pub type Tick = i64;

/// Ticks in one second
pub const TICKS_PER_SEC: Tick = 1_000_000;

/// Build a tick value from milliseconds
pub const fn tick_from_ms(ms: i64) -> Tick {
    ms * 1_000
}

/// Build a tick value from whole seconds
pub const fn tick_from_secs(secs: i64) -> Tick {
    secs * TICKS_PER_SEC
}

/// Convert a tick value to floating point seconds
pub fn tick_to_secs(tick: Tick) -> f64 {
    tick as f64 / TICKS_PER_SEC as f64
}

/// Convert a wall clock duration to ticks, saturating on overflow
pub fn tick_from_duration(duration: std::time::Duration) -> Tick {
    Tick::try_from(duration.as_micros()).unwrap_or(Tick::MAX)
}

/// Load the configuration from the default locations
///
/// Loads configuration from:
/// 1. Default values
/// 2. User configuration file
/// 3. Environment variables
pub fn load_config() -> Result<Config> {
    Config::load()
}

/// Format a tick value for display
///
/// # Arguments
///
/// * `tick` - Time to format; negative values are shown with a leading `-`
///
/// # Returns
///
/// Formatted string in the format "HH:MM:SS" or "MM:SS" for times under an hour
pub fn format_tick(tick: Tick) -> String {
    let sign = if tick < 0 { "-" } else { "" };
    let total_secs = tick.unsigned_abs() / TICKS_PER_SEC as u64;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}{:02}:{:02}:{:02}", sign, hours, minutes, seconds)
    } else {
        format!("{}{:02}:{:02}", sign, minutes, seconds)
    }
}
