//! Configuration management for stbplay
//!
//! This module handles loading and managing engine configuration
//! from config files and environment variables.

use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::device::DeviceOverrides;
use crate::settings::PlaybackSettings;
use crate::supervisor::SupervisorConfig;
use crate::utils::error::{EngineError, IntoEngineError, Result};

/// Environment variable names
pub const ENV_BACKEND: &str = "STBPLAY_BACKEND";
pub const ENV_NETWORK_CACHING_MS: &str = "STBPLAY_NETWORK_CACHING_MS";
pub const ENV_API_LEVEL: &str = "STBPLAY_API_LEVEL";
pub const ENV_LOG_LEVEL: &str = "STBPLAY_LOG_LEVEL";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Options the settings screen writes and the engine reads
    pub playback: PlaybackSettings,

    /// Device identity overrides
    pub device: DeviceOverrides,

    /// Supervisor timing and retry limits
    pub supervisor: SupervisorConfig,

    /// General settings
    pub general: GeneralConfig,
}

/// General configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/stbplay/config.toml)
    /// 3. User config file (~/.config/stbplay/config.toml on Linux)
    /// 4. Environment variables (STBPLAY_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        for path in [Self::system_config_path(), Self::user_config_path()].into_iter().flatten() {
            if path.exists() {
                config.merge_from_file(&path)?;
            }
        }

        config.apply_overrides(std::env::vars())?;
        config.validate()?;

        Ok(config)
    }

    /// Load a single file on top of the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the user config file
    pub fn save(&self) -> Result<()> {
        let path = Self::user_config_path()
            .ok_or_else(|| EngineError::Config("Cannot determine user config path".to_string()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).config_err("Failed to create config directory")?;
        }

        let toml = toml::to_string_pretty(self).config_err("Failed to serialize config")?;
        std::fs::write(path, toml).config_err("Failed to write config file")?;
        debug!("Saved configuration to {}", path.display());

        Ok(())
    }

    /// Merge a TOML file into this configuration, key by key
    fn merge_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path).config_err("Failed to read config file")?;
        let overlay: toml::Table =
            toml::from_str(&contents).config_err("Failed to parse config file")?;

        let mut base = toml::Value::try_from(&*self).config_err("Failed to serialize config")?;
        if let toml::Value::Table(table) = &mut base {
            merge_tables(table, overlay);
        }
        *self = base.try_into().config_err("Invalid config file")?;

        debug!("Merged configuration from {}", path.display());
        Ok(())
    }

    /// Apply `STBPLAY_*` overrides from `vars`
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                ENV_BACKEND => self.playback.backend_preference = value.parse()?,
                ENV_NETWORK_CACHING_MS => {
                    self.playback.network_caching_ms = value
                        .trim()
                        .parse()
                        .config_err("Invalid STBPLAY_NETWORK_CACHING_MS")?;
                }
                ENV_API_LEVEL => {
                    let level: u32 =
                        value.trim().parse().config_err("Invalid STBPLAY_API_LEVEL")?;
                    self.device.api_level = Some(level);
                }
                ENV_LOG_LEVEL => self.general.log_level = value.trim().to_ascii_lowercase(),
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.playback.validate()?;
        self.supervisor.validate()?;

        if !VALID_LOG_LEVELS.contains(&self.general.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level, VALID_LOG_LEVELS
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(unix)]
        return Some(PathBuf::from("/etc/stbplay/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("stbplay").join("config.toml"))
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
