//! Control stack for the Sphero robot over a caller-supplied duplex byte
//! stream.
//!
//! The stack is layered the same way traffic flows:
//!
//! | Layer | Module |
//! |---|---|
//! | Facade and confirmed state | [`robot`], [`state`] |
//! | Outgoing queue and writer task | `queue` (internal) |
//! | Receive loop and correlation | `stream`, `pending` (internal) |
//! | Macro streaming flow control | `macro_manager` (internal) |
//! | Listener callbacks | [`listener`] |
//! | Configuration and logging | [`config`], [`telemetry`] |
//!
//! Wire encoding and decoding live in the `sphero-protocol` crate,
//! re-exported here as [`protocol`]. The transport itself is out of scope:
//! [`Robot::connect`] accepts any `AsyncRead + AsyncWrite` duplex (tests use
//! `tokio::io::duplex`), discovery and pairing belong to the caller.
//!
//! # Example
//!
//! ```rust,no_run
//! use sphero::{Robot, RobotSetting};
//!
//! # async fn run(transport: tokio::io::DuplexStream) -> Result<(), sphero::SpheroError> {
//! let robot = Robot::new(RobotSetting::default());
//! robot.connect(transport)?;
//! robot.roll(90, 0.5);
//! robot.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod drive;
pub mod listener;
mod macro_manager;
mod pending;
mod queue;
pub mod robot;
pub mod state;
mod stream;
pub mod telemetry;

pub use drive::{DriveAlgorithm, DriveVector, JoystickDriveAlgorithm};
pub use listener::RobotListener;
pub use robot::Robot;
pub use state::{RobotLed, RobotMovement, RobotRawMovement};

pub use sphero_protocol as protocol;
pub use sphero_protocol::{Command, MacroCommand, MacroMode, MacroObject};
pub use sphero_types::{EventCode, MotorMode, Rgb, RobotSetting, SpheroError};
