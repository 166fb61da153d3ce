//! Tool configuration, optionally read from a TOML file.

use std::path::{Path, PathBuf};

use fugit::MillisDurationU32;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    codec::SlaveAddressPolicy,
    mutex::{DEFAULT_INITIAL_COUNT, DEFAULT_POLL_TIMEOUT, DEFAULT_SEMAPHORE_NAME},
    selftest::DEFAULT_STEP_DELAY,
    verify::RETRY_TIMES,
};

/// Configuration file read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mosfet8.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// I2C adapter the boards are connected to.
    pub bus_path: PathBuf,
    pub semaphore_name: String,
    pub semaphore_initial_count: u32,
    /// Length of one bus lock waiting slice.
    pub lock_poll_timeout_ms: u32,
    /// Write attempts of a verified write.
    pub retry_attempts: usize,
    /// Delay between self test transitions.
    pub self_test_step_ms: u32,
    /// Reject a Modbus slave address of 0 instead of warning.
    pub strict_slave_address: bool,
    /// `error`, `warn`, `info`, `debug` or `trace`.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus_path: PathBuf::from("/dev/i2c-1"),
            semaphore_name: DEFAULT_SEMAPHORE_NAME.to_string(),
            semaphore_initial_count: DEFAULT_INITIAL_COUNT,
            lock_poll_timeout_ms: DEFAULT_POLL_TIMEOUT.to_millis(),
            retry_attempts: RETRY_TIMES,
            self_test_step_ms: DEFAULT_STEP_DELAY.to_millis(),
            strict_slave_address: false,
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn lock_poll_timeout(&self) -> MillisDurationU32 {
        MillisDurationU32::millis(self.lock_poll_timeout_ms)
    }

    pub fn self_test_step(&self) -> MillisDurationU32 {
        MillisDurationU32::millis(self.self_test_step_ms)
    }

    pub fn slave_address_policy(&self) -> SlaveAddressPolicy {
        if self.strict_slave_address {
            SlaveAddressPolicy::Strict
        } else {
            SlaveAddressPolicy::Lenient
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        self.log_level
            .parse()
            .unwrap_or(tracing::Level::WARN)
    }
}

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path.display(), e);
            Err(ConfigError::Io(e))
        }
    }
}

/// Load `path` if given, else the default file when present, else the built in defaults.
pub fn resolve_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(DEFAULT_CONFIG_PATH),
        None => Ok(Config::default()),
    }
}
