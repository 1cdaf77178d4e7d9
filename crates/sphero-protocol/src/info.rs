//! Information (asynchronous) response messages.
//!
//! Unlike regular responses these are typed by their own embedded id code,
//! not by a previously sent command.

/// Id codes of asynchronous messages the device can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InformationKind {
    /// Battery/charger state change.
    PowerNotification,
    /// Asynchronous diagnostics dump.
    Level1Diagnostic,
    /// Streamed sensor data, enabled via set-data-streaming.
    SensorData,
    /// Configuration block contents.
    ConfigBlock,
    /// Pre-sleep warning.
    SleepWarning,
    /// Macro emit marker: a streamed macro chunk finished executing.
    MacroEmit,
    Unknown(u8),
}

impl InformationKind {
    pub fn from_id_code(id_code: u8) -> Self {
        match id_code {
            0x01 => InformationKind::PowerNotification,
            0x02 => InformationKind::Level1Diagnostic,
            0x03 => InformationKind::SensorData,
            0x04 => InformationKind::ConfigBlock,
            0x05 => InformationKind::SleepWarning,
            0x06 => InformationKind::MacroEmit,
            other => InformationKind::Unknown(other),
        }
    }
}

/// A decoded information response.
#[derive(Debug, Clone, PartialEq)]
pub struct InformationResponse {
    pub kind: InformationKind,
    pub payload: Vec<u8>,
}

impl InformationResponse {
    pub fn decode(id_code: u8, payload: &[u8]) -> Self {
        Self {
            kind: InformationKind::from_id_code(id_code),
            payload: payload.to_vec(),
        }
    }

    /// The emit marker id, when this is a macro emit message.
    pub fn emit_marker(&self) -> Option<u8> {
        match self.kind {
            InformationKind::MacroEmit => self.payload.first().copied(),
            _ => None,
        }
    }

    /// The raw sensor bytes, when this is a sensor data message.
    pub fn sensor_data(&self) -> Option<&[u8]> {
        match self.kind {
            InformationKind::SensorData => Some(&self.payload),
            _ => None,
        }
    }
}
