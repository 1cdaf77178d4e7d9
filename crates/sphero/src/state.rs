//! Last-confirmed device state records.
//!
//! Each record mirrors the values the device acknowledged most recently, not
//! the values most recently requested. Only the response dispatch path writes
//! them, after an OK regular response for the matching command.

use sphero_types::{MotorMode, Rgb, RobotSetting};

/// Confirmed drive state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotMovement {
    pub heading: u16,
    pub velocity: f32,
    pub stop: bool,
    pub rotation_rate: f32,
    pub stabilization: bool,
}

impl RobotMovement {
    pub(crate) fn from_setting(setting: &RobotSetting) -> Self {
        Self {
            heading: setting.motor_heading(),
            velocity: f32::from(setting.motor_start_speed()) / 255.0,
            stop: setting.motor_stop(),
            rotation_rate: setting.motor_rotation_rate(),
            stabilization: true,
        }
    }
}

/// Confirmed per-motor raw drive state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotRawMovement {
    pub left_mode: MotorMode,
    pub left_speed: u8,
    pub right_mode: MotorMode,
    pub right_speed: u8,
}

impl RobotRawMovement {
    pub(crate) fn from_setting(setting: &RobotSetting) -> Self {
        Self {
            left_mode: setting.motor_mode(),
            left_speed: 0,
            right_mode: setting.motor_mode(),
            right_speed: 0,
        }
    }
}

/// Confirmed LED state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotLed {
    pub rgb: Rgb,
    pub brightness: f32,
}

impl RobotLed {
    pub(crate) fn from_setting(setting: &RobotSetting) -> Self {
        Self {
            rgb: setting.led_rgb(),
            brightness: setting.led_brightness(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_start_from_configured_defaults() {
        let setting = RobotSetting::default();
        let movement = RobotMovement::from_setting(&setting);
        assert_eq!(movement.heading, 0);
        assert_eq!(movement.velocity, 0.0);
        assert!(movement.stop);

        let led = RobotLed::from_setting(&setting);
        assert_eq!(led.rgb, Rgb::GREEN);
        assert_eq!(led.brightness, 1.0);

        let raw = RobotRawMovement::from_setting(&setting);
        assert_eq!(raw.left_mode, MotorMode::Forward);
        assert_eq!(raw.left_speed, 0);
    }
}
