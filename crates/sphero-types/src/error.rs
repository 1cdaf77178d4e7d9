//! Top-level error type for robot connection management.
//!
//! Asynchronous operations (command sends) never report failure through this
//! type; transport faults on those paths surface as listener events instead.
//! Only the synchronous connection-lifecycle calls return `SpheroError`.

use thiserror::Error;

/// Errors from the synchronous parts of the robot API.
#[derive(Error, Debug)]
pub enum SpheroError {
    #[error("transport I/O failure: {0}")]
    Transport(#[from] std::io::Error),

    #[error("robot is already connected")]
    AlreadyConnected,

    #[error("no active connection")]
    NotConnected,

    #[error("connection initialization failed: {0}")]
    InitializationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_io_error_detail() {
        let err = SpheroError::from(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe closed",
        ));
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn initialization_failure_carries_reason() {
        let err = SpheroError::InitializationFailed("ping never answered".into());
        assert!(err.to_string().contains("ping never answered"));
    }
}
