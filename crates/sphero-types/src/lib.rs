//! Shared value types for the Sphero control stack: clamped robot settings,
//! RGB color handling, motor modes, connection event codes and the top-level
//! error enum.
//!
//! This crate is a leaf: it depends on nothing but `serde` and `thiserror`,
//! so both the codec crate and the robot stack can share these types without
//! pulling in the runtime.

pub mod color;
pub mod error;
pub mod event;
pub mod motor;
pub mod settings;

pub use color::Rgb;
pub use error::SpheroError;
pub use event::EventCode;
pub use motor::MotorMode;
pub use settings::RobotSetting;

/// Clamp `value` into `[min, max]`.
///
/// The settings layer clamps out-of-range values instead of rejecting them
/// (a deliberate leniency policy inherited from the device API).
pub fn clamp<T: PartialOrd>(value: T, min: T, max: T) -> T {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}
