//! Raw motor drive modes.

use serde::{Deserialize, Serialize};

/// Drive mode of a single raw motor channel, as encoded in the raw-motor
/// command payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorMode {
    Off,
    #[default]
    Forward,
    Reverse,
    Brake,
    /// Leave the motor in whatever mode it is currently in.
    Ignore,
}

impl MotorMode {
    /// Wire encoding of the mode.
    pub fn as_u8(self) -> u8 {
        match self {
            MotorMode::Off => 0x00,
            MotorMode::Forward => 0x01,
            MotorMode::Reverse => 0x02,
            MotorMode::Brake => 0x03,
            MotorMode::Ignore => 0x04,
        }
    }

    /// Decode a wire value; unknown values map to `None`.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(MotorMode::Off),
            0x01 => Some(MotorMode::Forward),
            0x02 => Some(MotorMode::Reverse),
            0x03 => Some(MotorMode::Brake),
            0x04 => Some(MotorMode::Ignore),
            _ => None,
        }
    }
}
