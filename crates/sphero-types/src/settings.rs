//! Per-robot configuration, clamped to valid ranges at construction.
//!
//! Out-of-range values are silently pulled back into bounds rather than
//! rejected; a robot must always be constructible from whatever the caller
//! or the config file supplies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{clamp, MotorMode, Rgb};

/// Immutable configuration bag supplied once per robot instance.
///
/// Construct via [`RobotSetting::builder`] (or take [`RobotSetting::default`])
/// so every field passes through its clamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotSetting {
    ping_interval_ms: u64,
    buffer_size: usize,
    macro_max_size: usize,
    macro_storage_size: usize,
    macro_min_space: usize,
    led_rgb: Rgb,
    led_brightness: f32,
    motor_heading: u16,
    motor_start_speed: u8,
    motor_stop: bool,
    motor_rotation_rate: f32,
    motor_mode: MotorMode,
    response_timeout_ms: Option<u64>,
}

impl Default for RobotSetting {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RobotSetting {
    pub fn builder() -> RobotSettingBuilder {
        RobotSettingBuilder::default()
    }

    /// Interval between keep-alive pings on an established connection.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Transport read buffer size, doubling as the writer's batching budget.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Largest macro chunk that fits one save-macro message.
    pub fn macro_max_size(&self) -> usize {
        self.macro_max_size
    }

    /// Total macro storage believed available on the device.
    pub fn macro_storage_size(&self) -> usize {
        self.macro_storage_size
    }

    /// Minimum free device memory required before another chunk is sent.
    pub fn macro_min_space(&self) -> usize {
        self.macro_min_space
    }

    pub fn led_rgb(&self) -> Rgb {
        self.led_rgb
    }

    pub fn led_brightness(&self) -> f32 {
        self.led_brightness
    }

    pub fn motor_heading(&self) -> u16 {
        self.motor_heading
    }

    pub fn motor_start_speed(&self) -> u8 {
        self.motor_start_speed
    }

    pub fn motor_stop(&self) -> bool {
        self.motor_stop
    }

    pub fn motor_rotation_rate(&self) -> f32 {
        self.motor_rotation_rate
    }

    pub fn motor_mode(&self) -> MotorMode {
        self.motor_mode
    }

    /// Optional deadline after which an unanswered command is discarded from
    /// the pending-response queue. `None` (the default) waits forever.
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }
}

/// Builder applying the clamp ranges before producing a [`RobotSetting`].
#[derive(Debug, Clone)]
pub struct RobotSettingBuilder {
    ping_interval_ms: u64,
    buffer_size: usize,
    macro_max_size: usize,
    macro_storage_size: usize,
    macro_min_space: usize,
    led_rgb: Rgb,
    led_brightness: f32,
    motor_heading: u16,
    motor_start_speed: u8,
    motor_stop: bool,
    motor_rotation_rate: f32,
    motor_mode: MotorMode,
    response_timeout_ms: Option<u64>,
}

impl Default for RobotSettingBuilder {
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

impl RobotSettingBuilder {
    pub fn ping_interval_ms(mut self, value: u64) -> Self {
        self.ping_interval_ms = value;
        self
    }

    pub fn buffer_size(mut self, value: usize) -> Self {
        self.buffer_size = value;
        self
    }

    pub fn macro_max_size(mut self, value: usize) -> Self {
        self.macro_max_size = value;
        self
    }

    pub fn macro_storage_size(mut self, value: usize) -> Self {
        self.macro_storage_size = value;
        self
    }

    pub fn macro_min_space(mut self, value: usize) -> Self {
        self.macro_min_space = value;
        self
    }

    pub fn led_rgb(mut self, value: Rgb) -> Self {
        self.led_rgb = value;
        self
    }

    pub fn led_brightness(mut self, value: f32) -> Self {
        self.led_brightness = value;
        self
    }

    pub fn motor_heading(mut self, value: u16) -> Self {
        self.motor_heading = value;
        self
    }

    pub fn motor_start_speed(mut self, value: u8) -> Self {
        self.motor_start_speed = value;
        self
    }

    pub fn motor_stop(mut self, value: bool) -> Self {
        self.motor_stop = value;
        self
    }

    pub fn motor_rotation_rate(mut self, value: f32) -> Self {
        self.motor_rotation_rate = value;
        self
    }

    pub fn motor_mode(mut self, value: MotorMode) -> Self {
        self.motor_mode = value;
        self
    }

    pub fn response_timeout_ms(mut self, value: Option<u64>) -> Self {
        self.response_timeout_ms = value;
        self
    }

    /// Clamp every field into its valid range and produce the setting.
    pub fn build(self) -> RobotSetting {
        RobotSetting {
            ping_interval_ms: clamp(self.ping_interval_ms, 1_000, 120_000),
            buffer_size: clamp(self.buffer_size, 64, 4_096),
            macro_max_size: clamp(self.macro_max_size, 50, 240),
            macro_storage_size: clamp(self.macro_storage_size, 256, 1_000),
            macro_min_space: clamp(self.macro_min_space, 50, 240),
            led_rgb: self.led_rgb,
            led_brightness: clamp(self.led_brightness, 0.0, 1.0),
            motor_heading: clamp(self.motor_heading, 0, 359),
            motor_start_speed: self.motor_start_speed,
            motor_stop: self.motor_stop,
            motor_rotation_rate: clamp(self.motor_rotation_rate, 0.0, 1.0),
            motor_mode: self.motor_mode,
            response_timeout_ms: self.response_timeout_ms.map(|t| clamp(t, 100, 600_000)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_within_clamp_ranges() {
        let s = RobotSetting::default();
        assert_eq!(s.ping_interval(), Duration::from_millis(5_000));
        assert_eq!(s.buffer_size(), 256);
        assert_eq!(s.macro_max_size(), 240);
        assert_eq!(s.macro_storage_size(), 900);
        assert!(s.response_timeout().is_none());
    }

    #[test]
    fn out_of_range_values_are_clamped_not_rejected() {
        let s = RobotSetting::builder()
            .ping_interval_ms(10)
            .buffer_size(1)
            .macro_max_size(10_000)
            .macro_storage_size(0)
            .macro_min_space(0)
            .led_brightness(42.0)
            .motor_heading(720)
            .motor_rotation_rate(-3.0)
            .build();

        assert_eq!(s.ping_interval(), Duration::from_millis(1_000));
        assert_eq!(s.buffer_size(), 64);
        assert_eq!(s.macro_max_size(), 240);
        assert_eq!(s.macro_storage_size(), 256);
        assert_eq!(s.macro_min_space(), 50);
        assert_eq!(s.led_brightness(), 1.0);
        assert_eq!(s.motor_heading(), 359);
        assert_eq!(s.motor_rotation_rate(), 0.0);
    }

    #[test]
    fn response_timeout_is_clamped_when_set() {
        let s = RobotSetting::builder().response_timeout_ms(Some(1)).build();
        assert_eq!(s.response_timeout(), Some(Duration::from_millis(100)));
    }
}
