//! Device profile module for stbplay
//!
//! Turns raw platform identifiers into a [`DeviceProfile`]: the fingerprint
//! and quirk set that biases backend selection, backend tuning and the
//! mute/resync policy.

pub mod quirks;

pub use quirks::{QuirkFlags, QuirkRule, QUIRK_TABLE};

use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Highest API level treated as a legacy OS
pub const LEGACY_API_LEVEL: u32 = 19;

/// Raw platform identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformInfo {
    /// OS API level
    pub api_level: u32,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub device: Option<String>,
    pub brand: Option<String>,
    pub product: Option<String>,
    pub fingerprint: Option<String>,
    /// Logical CPU cores available to decoders
    pub cpu_cores: usize,
}

impl Default for PlatformInfo {
    fn default() -> Self {
        Self {
            api_level: 28,
            manufacturer: None,
            model: None,
            device: None,
            brand: None,
            product: None,
            fingerprint: None,
            cpu_cores: 4,
        }
    }
}

/// Identity overrides read from configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOverrides {
    pub api_level: Option<u32>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub device: Option<String>,
    pub cpu_cores: Option<usize>,
}

impl PlatformInfo {
    /// Identify the host the engine runs on
    pub fn detect() -> Self {
        let cpu_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            cpu_cores,
            ..Self::default()
        }
    }

    /// Apply configured overrides on top of detected values
    pub fn with_overrides(mut self, overrides: &DeviceOverrides) -> Self {
        if let Some(level) = overrides.api_level {
            self.api_level = level;
        }
        if let Some(m) = &overrides.manufacturer {
            self.manufacturer = Some(m.clone());
        }
        if let Some(m) = &overrides.model {
            self.model = Some(m.clone());
        }
        if let Some(d) = &overrides.device {
            self.device = Some(d.clone());
        }
        if let Some(cores) = overrides.cpu_cores {
            self.cpu_cores = cores.max(1);
        }
        self
    }
}

/// Immutable device fingerprint and quirk set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    pub api_level: u32,
    pub manufacturer: String,
    pub model: String,
    pub cpu_cores: usize,
    pub quirks: QuirkFlags,
    /// Names of the quirk table rows that matched
    pub matched_rules: Vec<&'static str>,
}

static CURRENT: OnceCell<Arc<DeviceProfile>> = OnceCell::new();

impl DeviceProfile {
    /// Classify a platform. Pure and deterministic; unknown devices match no rule.
    pub fn classify(info: &PlatformInfo) -> DeviceProfile {
        let (quirks, matched_rules) = quirks::evaluate(info);

        DeviceProfile {
            api_level: info.api_level,
            manufacturer: info.manufacturer.clone().unwrap_or_default(),
            model: info.model.clone().unwrap_or_default(),
            cpu_cores: info.cpu_cores.max(1),
            quirks,
            matched_rules,
        }
    }

    /// Process-wide profile, classified on first access
    pub fn current() -> Arc<DeviceProfile> {
        Self::init_with(PlatformInfo::detect)
    }

    /// Process-wide profile, classifying `info()` if nothing has been cached yet
    pub fn init_with<F>(info: F) -> Arc<DeviceProfile>
    where
        F: FnOnce() -> PlatformInfo,
    {
        CURRENT
            .get_or_init(|| {
                let profile = DeviceProfile::classify(&info());
                info!(
                    "Device profile: {} {} api={} cores={} rules={:?}",
                    profile.manufacturer,
                    profile.model,
                    profile.api_level,
                    profile.cpu_cores,
                    profile.matched_rules
                );
                Arc::new(profile)
            })
            .clone()
    }

    /// OS API level 19 or older
    pub fn is_legacy_os(&self) -> bool {
        self.quirks.legacy_os
    }
}
