//! Playback settings
//!
//! Operator/user-chosen options the engine reads but never writes. The
//! settings screen (outside this crate) owns persistence; the supervisor
//! takes a snapshot per session.

use serde::{Deserialize, Serialize};

use crate::utils::error::{EngineError, Result};

/// Network caching values the settings screen offers
pub const NETWORK_CACHING_CHOICES_MS: [u32; 4] = [1500, 3000, 5000, 10000];

/// Which decode backend the operator wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Let the selector decide from the device profile
    #[default]
    Auto,
    Modern,
    Legacy,
    Alternate,
    /// Minimal OS-native engine
    Native,
}

/// Hardware decoding mode for the alternate engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HwDecodeMode {
    #[default]
    Auto,
    On,
    Off,
    /// Hardware decoding even where the engine would normally refuse it
    ForceOn,
}

/// Hardware decoder implementation for the alternate engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HwDecoderImpl {
    #[default]
    Auto,
    MediaCodec,
    MediaCodecNdk,
}

/// Requested video output module for the alternate engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoOutput {
    #[default]
    Auto,
    Display,
    Surface,
    Gles2,
}

/// Recognized playback options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Backend override; `Auto` defers to the device profile
    pub backend_preference: BackendPreference,

    /// Cap video at 480p
    pub resolution_cap_480p: bool,

    /// Hardware decode mode
    pub hw_decode_mode: HwDecodeMode,

    /// Network caching in milliseconds, one of [`NETWORK_CACHING_CHOICES_MS`]
    pub network_caching_ms: u32,

    /// Render into a texture view instead of a surface view
    pub use_texture_surface: bool,

    /// Deinterlace interlaced broadcasts
    pub deinterlace: bool,

    /// Hardware decoder implementation
    pub hw_decoder_impl: HwDecoderImpl,

    /// Restrict decoding to the hardware codec list
    pub hw_force_only: bool,

    /// Requested video output
    pub video_output: VideoOutput,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            backend_preference: BackendPreference::Auto,
            resolution_cap_480p: false,
            hw_decode_mode: HwDecodeMode::Auto,
            network_caching_ms: 1500,
            use_texture_surface: true,
            deinterlace: false,
            hw_decoder_impl: HwDecoderImpl::Auto,
            hw_force_only: false,
            video_output: VideoOutput::Auto,
        }
    }
}

impl PlaybackSettings {
    /// Check that every option holds a value the settings screen can produce
    pub fn validate(&self) -> Result<()> {
        if !NETWORK_CACHING_CHOICES_MS.contains(&self.network_caching_ms) {
            return Err(EngineError::Config(format!(
                "network_caching_ms must be one of {:?}, got {}",
                NETWORK_CACHING_CHOICES_MS, self.network_caching_ms
            )));
        }
        Ok(())
    }
}

impl std::str::FromStr for BackendPreference {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendPreference::Auto),
            "modern" => Ok(BackendPreference::Modern),
            "legacy" => Ok(BackendPreference::Legacy),
            "alternate" => Ok(BackendPreference::Alternate),
            "native" => Ok(BackendPreference::Native),
            other => Err(EngineError::Config(format!("Unknown backend preference '{}'", other))),
        }
    }
}
