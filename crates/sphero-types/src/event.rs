//! Connection-level event codes surfaced to robot listeners.

use serde::{Deserialize, Serialize};

/// Events describing the lifecycle of a robot connection and macro playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventCode {
    /// The connection initialization sequence completed.
    ConnectionEstablished,
    /// The connection could not be initialized.
    ConnectionFailed,
    /// The transport failed mid-session (I/O error or end of stream).
    ConnectionClosedUnexpected,
    /// An orderly disconnect finished; the safety sequence reached the wire.
    Disconnected,
    /// `disconnect` was called while no connection existed.
    NoConnectionExists,
    /// A streamed macro finished executing on the device.
    MacroDone,
    /// A pending command was discarded after its response deadline expired.
    CommandTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_code_serializes_by_name() {
        let json = serde_json::to_string(&EventCode::MacroDone).unwrap();
        assert_eq!(json, "\"MacroDone\"");
    }
}
