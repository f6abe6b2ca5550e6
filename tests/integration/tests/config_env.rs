//! Configuration loading from files and the environment
//!
//! Environment variables are process-global, so those tests run serially.

use anyhow::Result;
use serial_test::serial;
use tempfile::TempDir;

use stbplay::utils::config::{ENV_API_LEVEL, ENV_BACKEND, ENV_LOG_LEVEL, ENV_NETWORK_CACHING_MS};
use stbplay::{BackendPreference, Config, DeviceProfile, PlatformInfo};

fn clear_env() {
    for key in [ENV_BACKEND, ENV_NETWORK_CACHING_MS, ENV_API_LEVEL, ENV_LOG_LEVEL] {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_environment_overrides_defaults() -> Result<()> {
    clear_env();
    std::env::set_var(ENV_BACKEND, "alternate");
    std::env::set_var(ENV_NETWORK_CACHING_MS, "10000");
    std::env::set_var(ENV_API_LEVEL, "17");
    std::env::set_var(ENV_LOG_LEVEL, "debug");

    let mut config = Config::default();
    config.apply_overrides(std::env::vars())?;
    config.validate()?;
    clear_env();

    assert_eq!(config.playback.backend_preference, BackendPreference::Alternate);
    assert_eq!(config.playback.network_caching_ms, 10_000);
    assert_eq!(config.general.log_level, "debug");

    let info = PlatformInfo::default().with_overrides(&config.device);
    assert!(DeviceProfile::classify(&info).is_legacy_os());
    Ok(())
}

#[test]
#[serial]
fn test_invalid_caching_from_environment_fails_validation() -> Result<()> {
    clear_env();
    std::env::set_var(ENV_NETWORK_CACHING_MS, "2500");

    let mut config = Config::default();
    config.apply_overrides(std::env::vars())?;
    clear_env();

    assert!(config.validate().is_err());
    Ok(())
}

#[test]
fn test_file_then_environment() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        concat!(
            "[playback]\nbackend_preference = \"legacy\"\n\n",
            "[device]\nmanufacturer = \"Huawei\"\nmodel = \"EC6108V9\"\n",
        ),
    )?;

    let mut config = Config::load_from(&path)?;
    assert_eq!(config.playback.backend_preference, BackendPreference::Legacy);

    config.apply_overrides(vec![(ENV_BACKEND.to_string(), "modern".to_string())])?;
    assert_eq!(config.playback.backend_preference, BackendPreference::Modern);

    let profile = DeviceProfile::classify(&PlatformInfo::default().with_overrides(&config.device));
    assert!(profile.quirks.disable_decoder_fallback);
    Ok(())
}
