//! Pure codec for the Sphero serial protocol.
//!
//! Packets flow over a point-to-point RFCOMM-like byte stream. Three shapes
//! exist on the wire:
//!
//! | Direction | Shape |
//! |---|---|
//! | host → device | `FF FF DID CID SEQ DLEN <payload> CHK` |
//! | device → host (regular) | `FF FF MRSP SEQ DLEN <payload> CHK` |
//! | device → host (information) | `FF FE ID_CODE DLEN_MSB DLEN_LSB <payload> CHK` |
//!
//! `DLEN` counts the payload plus the trailing checksum. The checksum is the
//! bitwise complement of the byte sum from the third header byte through the
//! end of the payload.
//!
//! Everything in this crate is a pure transformation: encoding never fails,
//! and decoding reports recoverable [`FrameError`]s so the receive loop can
//! skip a corrupt byte and resynchronize on the next frame boundary.

pub mod command;
pub mod info;
pub mod macros;
pub mod response;

pub use command::{Command, CommandId, CommandMessage};
pub use info::{InformationKind, InformationResponse};
pub use macros::{MacroCommand, MacroMode, MacroObject};
pub use response::{
    decode_response, scan, FrameError, FrameScan, ResponseBody, ResponseCode, ResponseFrame,
    ResponseHeader, ResponseKind, ResponseMessage,
};

/// First start-of-packet byte, shared by every packet shape.
pub const SOP1: u8 = 0xFF;
/// Second start-of-packet byte for commands and regular responses.
pub const SOP2_RESPONSE: u8 = 0xFF;
/// Second start-of-packet byte for information (asynchronous) responses.
pub const SOP2_INFORMATION: u8 = 0xFE;

/// Compute the packet checksum over the given bytes (everything between the
/// start-of-packet pair and the checksum byte itself).
pub fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_complement_of_byte_sum() {
        // 0x02 + 0x20 + 0x52 + 0x01 = 0x75 -> !0x75 = 0x8A
        assert_eq!(checksum(&[0x02, 0x20, 0x52, 0x01]), 0x8A);
    }

    #[test]
    fn checksum_wraps_on_overflow() {
        assert_eq!(checksum(&[0xFF, 0xFF, 0x02]), !(0x00u8)); // 0xFF + 0xFF + 0x02 wraps to 0x00
    }
}
