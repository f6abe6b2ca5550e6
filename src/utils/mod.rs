//! Utility module for stbplay
//!
//! This module provides common utilities used throughout the engine:
//! - Error handling with custom error types
//! - Configuration management
//! - Display helpers for logs

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::{Config, GeneralConfig};
pub use error::{EngineError, Result};

/// Initialize the engine configuration
///
/// Loads configuration from:
/// 1. Default values
/// 2. System configuration file
/// 3. User configuration file
/// 4. Environment variables
///
/// # Returns
///
/// Returns the loaded configuration or an error if loading fails
pub fn load_config() -> Result<Config> {
    Config::load()
}

/// Format a stream position for display
///
/// # Arguments
///
/// * `position_ms` - Position in milliseconds
///
/// # Returns
///
/// Formatted string in the format "HH:MM:SS.mmm", or "MM:SS.mmm" under an hour
pub fn format_position(position_ms: u64) -> String {
    let millis = position_ms % 1000;
    let total_secs = position_ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    } else {
        format!("{:02}:{:02}.{:03}", minutes, seconds, millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(0), "00:00.000");
        assert_eq!(format_position(5_000), "00:05.000");
        assert_eq!(format_position(59_999), "00:59.999");
        assert_eq!(format_position(61_250), "01:01.250");
        assert_eq!(format_position(3_600_000), "01:00:00.000");
        assert_eq!(format_position(7_325_042), "02:02:05.042");
    }
}
