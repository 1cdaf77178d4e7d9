//! Conversion of coordinate input into roll commands.

/// Heading and velocity produced by a [`DriveAlgorithm`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveVector {
    /// Degrees clockwise from straight ahead, `0..360`.
    pub heading: u16,
    /// Unit-interval speed.
    pub velocity: f32,
}

/// Maps a three-axis input (joystick, accelerometer, ...) to a drive vector.
pub trait DriveAlgorithm: Send + Sync {
    fn convert(&self, x: f64, y: f64, z: f64) -> DriveVector;
}

/// Treats `(x, y)` as a joystick deflection: positive `y` is straight ahead,
/// positive `x` turns right. The `z` axis is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct JoystickDriveAlgorithm;

impl DriveAlgorithm for JoystickDriveAlgorithm {
    fn convert(&self, x: f64, y: f64, _z: f64) -> DriveVector {
        let magnitude = (x * x + y * y).sqrt().min(1.0);
        let mut degrees = x.atan2(y).to_degrees();
        if degrees < 0.0 {
            degrees += 360.0;
        }
        DriveVector {
            heading: degrees.round() as u16 % 360,
            velocity: magnitude as f32,
        }
    }
}
