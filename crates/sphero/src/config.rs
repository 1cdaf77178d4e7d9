//! Robot configuration loading from a TOML file.
//!
//! Every field is optional in the file; missing values fall back to the same
//! defaults [`RobotSetting`] uses, and the final values pass through the
//! setting builder's clamps either way.
//!
//! # Environment variables
//!
//! | Variable | Config field |
//! |---|---|
//! | `SPHERO_PING_INTERVAL_MS` | `ping_interval_ms` |
//! | `SPHERO_BUFFER_SIZE` | `buffer_size` |
//! | `SPHERO_RESPONSE_TIMEOUT_MS` | `response_timeout_ms` |

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sphero_types::{MotorMode, Rgb, RobotSetting};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// On-disk shape of a robot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub ping_interval_ms: u64,
    pub buffer_size: usize,
    pub macro_max_size: usize,
    pub macro_storage_size: usize,
    pub macro_min_space: usize,
    pub led_rgb: Rgb,
    pub led_brightness: f32,
    pub motor_heading: u16,
    pub motor_start_speed: u8,
    pub motor_stop: bool,
    pub motor_rotation_rate: f32,
    pub motor_mode: MotorMode,
    pub response_timeout_ms: Option<u64>,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 5_000,
            buffer_size: 256,
            macro_max_size: 240,
            macro_storage_size: 900,
            macro_min_space: 50,
            led_rgb: Rgb::GREEN,
            led_brightness: 1.0,
            motor_heading: 0,
            motor_start_speed: 0,
            motor_stop: true,
            motor_rotation_rate: 0.6,
            motor_mode: MotorMode::Forward,
            response_timeout_ms: None,
        }
    }
}

impl RobotConfig {
    /// Run the values through the setting builder's clamps.
    pub fn into_setting(self) -> RobotSetting {
        RobotSetting::builder()
            .ping_interval_ms(self.ping_interval_ms)
            .buffer_size(self.buffer_size)
            .macro_max_size(self.macro_max_size)
            .macro_storage_size(self.macro_storage_size)
            .macro_min_space(self.macro_min_space)
            .led_rgb(self.led_rgb)
            .led_brightness(self.led_brightness)
            .motor_heading(self.motor_heading)
            .motor_start_speed(self.motor_start_speed)
            .motor_stop(self.motor_stop)
            .motor_rotation_rate(self.motor_rotation_rate)
            .motor_mode(self.motor_mode)
            .response_timeout_ms(self.response_timeout_ms)
            .build()
    }
}

/// Load a robot setting from `path`. Returns `None` when the file does not
/// exist; environment overrides apply on top of the file's values.
pub fn load_from(path: &Path) -> Result<Option<RobotSetting>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: RobotConfig = toml::from_str(&raw)?;
    apply_env_overrides(&mut config);
    Ok(Some(config.into_setting()))
}

/// Load from `path` or fall back to defaults when the file is absent.
pub fn load_or_default(path: &Path) -> Result<RobotSetting, ConfigError> {
    Ok(load_from(path)?.unwrap_or_default())
}

/// Apply `SPHERO_*` environment variable overrides to `config`.
pub fn apply_env_overrides(config: &mut RobotConfig) {
    if let Ok(v) = std::env::var("SPHERO_PING_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        config.ping_interval_ms = ms;
    }
    if let Ok(v) = std::env::var("SPHERO_BUFFER_SIZE")
        && let Ok(size) = v.parse::<usize>()
    {
        config.buffer_size = size;
    }
    if let Ok(v) = std::env::var("SPHERO_RESPONSE_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        config.response_timeout_ms = Some(ms);
    }
}
