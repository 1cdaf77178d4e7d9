//! Incremental response decoding: header scan, frame extraction and the
//! command-typed response messages.
//!
//! The receive loop accumulates bytes in a growable buffer and calls [`scan`]
//! repeatedly. `scan` never consumes on its own; it reports how many bytes a
//! complete frame occupied so the caller can drain exactly that much, or
//! returns [`FrameScan::NeedMore`] when the buffer holds only a prefix.
//! Corruption is a recoverable [`FrameError`], letting the caller skip one
//! byte and rescan until it finds the next frame boundary.

use thiserror::Error;

use crate::command::CommandId;
use crate::{SOP1, SOP2_INFORMATION, SOP2_RESPONSE};

/// Byte length of the fixed header prefix shared by both response shapes.
pub const RESPONSE_HEADER_LEN: usize = 5;

/// Result code carried by a regular response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Ok,
    GeneralError,
    ChecksumFailure,
    FragmentReceived,
    BadCommand,
    Unsupported,
    BadMessage,
    InvalidParameter,
    ExecutionFailed,
    UnknownDevice,
    VoltageLow,
    IllegalPage,
    FlashFail,
    MainAppCorrupt,
    Timeout,
    Unknown(u8),
}

impl ResponseCode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => ResponseCode::Ok,
            0x01 => ResponseCode::GeneralError,
            0x02 => ResponseCode::ChecksumFailure,
            0x03 => ResponseCode::FragmentReceived,
            0x04 => ResponseCode::BadCommand,
            0x05 => ResponseCode::Unsupported,
            0x06 => ResponseCode::BadMessage,
            0x07 => ResponseCode::InvalidParameter,
            0x08 => ResponseCode::ExecutionFailed,
            0x09 => ResponseCode::UnknownDevice,
            0x31 => ResponseCode::VoltageLow,
            0x32 => ResponseCode::IllegalPage,
            0x33 => ResponseCode::FlashFail,
            0x34 => ResponseCode::MainAppCorrupt,
            0x35 => ResponseCode::Timeout,
            other => ResponseCode::Unknown(other),
        }
    }

    pub fn is_ok(self) -> bool {
        self == ResponseCode::Ok
    }
}

/// Which of the two response shapes a header announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Reply to a previously sent command; correlated FIFO with the
    /// pending-command queue.
    Regular { code: ResponseCode, seq: u8 },
    /// Unsolicited device message (sensor data, macro emit marker, ...).
    Information { id_code: u8 },
}

/// Decoded fixed-size header prefix of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub kind: ResponseKind,
    /// Payload byte count, excluding the trailing checksum.
    pub payload_len: usize,
}

/// A complete frame extracted from the stream buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    pub header: ResponseHeader,
    pub payload: Vec<u8>,
}

/// Per-frame decode failures. All of these are local to one frame: the
/// receive loop logs them, advances one byte and keeps scanning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("bad start-of-packet bytes")]
    BadStart,
    #[error("length field of zero")]
    ZeroLength,
    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Outcome of scanning the front of the stream buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameScan {
    /// The buffer holds only a prefix of a frame; read more bytes.
    NeedMore,
    /// A complete, checksum-verified frame occupying `consumed` bytes.
    Frame { frame: ResponseFrame, consumed: usize },
}

/// Scan the front of `buf` for one complete response frame.
///
/// # Errors
///
/// Returns a [`FrameError`] when the front of the buffer cannot begin a valid
/// frame (bad start bytes, zero length field, checksum mismatch). The caller
/// should drop a single byte and rescan to resynchronize.
pub fn scan(buf: &[u8]) -> Result<FrameScan, FrameError> {
    if buf.is_empty() {
        return Ok(FrameScan::NeedMore);
    }
    if buf[0] != SOP1 {
        return Err(FrameError::BadStart);
    }
    if buf.len() >= 2 && buf[1] != SOP2_RESPONSE && buf[1] != SOP2_INFORMATION {
        return Err(FrameError::BadStart);
    }
    if buf.len() < RESPONSE_HEADER_LEN {
        return Ok(FrameScan::NeedMore);
    }

    let (kind, dlen) = if buf[1] == SOP2_INFORMATION {
        let dlen = usize::from(u16::from_be_bytes([buf[3], buf[4]]));
        (ResponseKind::Information { id_code: buf[2] }, dlen)
    } else {
        let dlen = usize::from(buf[4]);
        (
            ResponseKind::Regular {
                code: ResponseCode::from_u8(buf[2]),
                seq: buf[3],
            },
            dlen,
        )
    };

    // DLEN counts payload + checksum; zero leaves no room for the checksum.
    if dlen == 0 {
        return Err(FrameError::ZeroLength);
    }
    let payload_len = dlen - 1;
    let total = RESPONSE_HEADER_LEN + payload_len + 1;
    if buf.len() < total {
        return Ok(FrameScan::NeedMore);
    }

    let expected = crate::checksum(&buf[2..RESPONSE_HEADER_LEN + payload_len]);
    let actual = buf[total - 1];
    if expected != actual {
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }

    Ok(FrameScan::Frame {
        frame: ResponseFrame {
            header: ResponseHeader { kind, payload_len },
            payload: buf[RESPONSE_HEADER_LEN..RESPONSE_HEADER_LEN + payload_len].to_vec(),
        },
        consumed: total,
    })
}

/// Payload of a regular response, typed by the command that caused it.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// No payload beyond the acknowledgement itself.
    Ack,
    /// Device name and Bluetooth address, from a get-bluetooth-info command.
    BluetoothInfo { name: String, address: String },
    /// Raw version record bytes.
    Versioning { record: Vec<u8> },
    /// Human-readable diagnostics report.
    Level1Diagnostics { report: String },
    /// Raw configuration block contents.
    ConfigurationBlock { data: Vec<u8> },
    /// Payload that did not match the expected shape for the command.
    Raw(Vec<u8>),
}

/// A decoded regular response paired with its result code.
///
/// Regular responses carry no type information of their own; the variant is
/// selected by the command at the head of the pending queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    pub code: ResponseCode,
    pub seq: u8,
    pub command: CommandId,
    pub body: ResponseBody,
    /// Set when the payload was too short for the shape the command implies.
    pub corrupt: bool,
}

/// Materialize the typed response for `command` from a regular frame's code,
/// sequence number and payload bytes.
pub fn decode_response(
    command: CommandId,
    code: ResponseCode,
    seq: u8,
    payload: &[u8],
) -> ResponseMessage {
    let (body, corrupt) = match command {
        CommandId::GetBluetoothInfo => decode_bluetooth_info(payload),
        CommandId::Versioning => (ResponseBody::Versioning { record: payload.to_vec() }, false),
        CommandId::Level1Diagnostics => (
            ResponseBody::Level1Diagnostics {
                report: String::from_utf8_lossy(payload).into_owned(),
            },
            false,
        ),
        CommandId::GetConfigurationBlock => {
            (ResponseBody::ConfigurationBlock { data: payload.to_vec() }, false)
        }
        _ if payload.is_empty() => (ResponseBody::Ack, false),
        _ => (ResponseBody::Raw(payload.to_vec()), false),
    };

    ResponseMessage { code, seq, command, body, corrupt }
}

/// Name (16 bytes, NUL padded) followed by the 12-character Bluetooth
/// address.
fn decode_bluetooth_info(payload: &[u8]) -> (ResponseBody, bool) {
    if payload.len() < 28 {
        return (ResponseBody::Raw(payload.to_vec()), true);
    }
    let name = String::from_utf8_lossy(&payload[..16])
        .trim_end_matches('\0')
        .to_string();
    let address = String::from_utf8_lossy(&payload[16..28]).into_owned();
    (ResponseBody::BluetoothInfo { name, address }, false)
}
