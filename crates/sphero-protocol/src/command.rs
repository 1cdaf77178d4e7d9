//! Outgoing command messages and their wire encoding.

use std::sync::atomic::{AtomicU8, Ordering};

use sphero_types::{clamp, MotorMode, Rgb};

use crate::checksum;

/// Device id for the core (connection-level) command group.
pub const DID_CORE: u8 = 0x00;
/// Device id for the bootloader command group.
pub const DID_BOOTLOADER: u8 = 0x01;
/// Device id for the Sphero (motion/LED/macro) command group.
pub const DID_SPHERO: u8 = 0x02;

/// Macro flag requesting exclusive motor control during playback.
pub const MACRO_FLAG_MOTOR_CONTROL: u8 = 0x02;
/// Destination id for streamed macro chunks.
pub const MACRO_STREAMING_DESTINATION: u8 = 0xFE;
/// Macro id addressing the temporary (RAM) macro slot.
pub const MACRO_TEMPORARY_ID: u8 = 0xFF;

// Process-wide sequence counter. The device echoes the value back but
// correlation is strictly FIFO, so sharing one counter across connections is
// harmless.
static NEXT_SEQ: AtomicU8 = AtomicU8::new(0);

/// Discriminant identifying a command kind, mapping to the `(DID, CID)` pair
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    Ping,
    Versioning,
    SetRobotName,
    GetBluetoothInfo,
    GoToSleep,
    JumpToBootloader,
    JumpToMain,
    Level1Diagnostics,
    SetDataStreaming,
    SetHeading,
    Stabilization,
    RotationRate,
    RgbLed,
    FrontLed,
    Roll,
    RawMotor,
    GetConfigurationBlock,
    RunMacro,
    SaveTemporaryMacro,
    SaveMacro,
    AbortMacro,
}

impl CommandId {
    /// The device id byte of the packet header.
    pub fn device_id(self) -> u8 {
        match self {
            CommandId::Ping
            | CommandId::Versioning
            | CommandId::SetRobotName
            | CommandId::GetBluetoothInfo
            | CommandId::GoToSleep
            | CommandId::JumpToBootloader
            | CommandId::Level1Diagnostics => DID_CORE,
            CommandId::JumpToMain => DID_BOOTLOADER,
            _ => DID_SPHERO,
        }
    }

    /// The command id byte of the packet header.
    pub fn command_id(self) -> u8 {
        match self {
            CommandId::Ping => 0x01,
            CommandId::Versioning => 0x02,
            CommandId::SetRobotName => 0x10,
            CommandId::GetBluetoothInfo => 0x11,
            CommandId::GoToSleep => 0x22,
            CommandId::JumpToBootloader => 0x30,
            CommandId::Level1Diagnostics => 0x40,
            CommandId::JumpToMain => 0x04,
            CommandId::SetHeading => 0x01,
            CommandId::Stabilization => 0x02,
            CommandId::RotationRate => 0x03,
            CommandId::SetDataStreaming => 0x11,
            CommandId::RgbLed => 0x20,
            CommandId::FrontLed => 0x21,
            CommandId::Roll => 0x30,
            CommandId::RawMotor => 0x33,
            CommandId::GetConfigurationBlock => 0x40,
            CommandId::RunMacro => 0x50,
            CommandId::SaveTemporaryMacro => 0x51,
            CommandId::SaveMacro => 0x52,
            CommandId::AbortMacro => 0x55,
        }
    }
}

/// A typed command with its semantic payload.
///
/// Constructors clamp their inputs (heading to 0–359, unit-interval values to
/// 0–1) instead of failing; the facade's recorded state must always mirror
/// what was actually encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Versioning,
    SetRobotName { name: String },
    GetBluetoothInfo,
    /// Sleep for `wakeup_secs` seconds. The connection is lost when the
    /// device powers down.
    GoToSleep { wakeup_secs: u16 },
    JumpToBootloader,
    JumpToMain,
    Level1Diagnostics,
    SetDataStreaming { divisor: u16, frames: u16, mask: u32, count: u8 },
    /// Calibrate: zero the heading system at `heading`.
    SetHeading { heading: u16 },
    Stabilization { on: bool },
    RotationRate { rate: f32 },
    RgbLed { color: Rgb },
    FrontLed { brightness: f32 },
    Roll { heading: u16, velocity: f32, stop: bool },
    RawMotor {
        left_mode: MotorMode,
        left_speed: u8,
        right_mode: MotorMode,
        right_speed: u8,
    },
    GetConfigurationBlock { id: u8 },
    RunMacro { macro_id: u8 },
    SaveTemporaryMacro { flags: u8, data: Vec<u8> },
    SaveMacro { macro_id: u8, flags: u8, data: Vec<u8> },
    AbortMacro,
}

impl Command {
    /// Build a roll command, clamping heading and velocity.
    pub fn roll(heading: u16, velocity: f32, stop: bool) -> Self {
        Command::Roll {
            heading: clamp(heading, 0, 359),
            velocity: clamp(velocity, 0.0, 1.0),
            stop,
        }
    }

    /// Build a calibrate (set-heading) command.
    pub fn set_heading(heading: u16) -> Self {
        Command::SetHeading { heading: clamp(heading, 0, 359) }
    }

    /// Build a front-LED brightness command, clamping to the unit interval.
    pub fn front_led(brightness: f32) -> Self {
        Command::FrontLed { brightness: clamp(brightness, 0.0, 1.0) }
    }

    /// Build a rotation-rate command, clamping to the unit interval.
    pub fn rotation_rate(rate: f32) -> Self {
        Command::RotationRate { rate: clamp(rate, 0.0, 1.0) }
    }

    /// The [`CommandId`] discriminant of this command.
    pub fn id(&self) -> CommandId {
        match self {
            Command::Ping => CommandId::Ping,
            Command::Versioning => CommandId::Versioning,
            Command::SetRobotName { .. } => CommandId::SetRobotName,
            Command::GetBluetoothInfo => CommandId::GetBluetoothInfo,
            Command::GoToSleep { .. } => CommandId::GoToSleep,
            Command::JumpToBootloader => CommandId::JumpToBootloader,
            Command::JumpToMain => CommandId::JumpToMain,
            Command::Level1Diagnostics => CommandId::Level1Diagnostics,
            Command::SetDataStreaming { .. } => CommandId::SetDataStreaming,
            Command::SetHeading { .. } => CommandId::SetHeading,
            Command::Stabilization { .. } => CommandId::Stabilization,
            Command::RotationRate { .. } => CommandId::RotationRate,
            Command::RgbLed { .. } => CommandId::RgbLed,
            Command::FrontLed { .. } => CommandId::FrontLed,
            Command::Roll { .. } => CommandId::Roll,
            Command::RawMotor { .. } => CommandId::RawMotor,
            Command::GetConfigurationBlock { .. } => CommandId::GetConfigurationBlock,
            Command::RunMacro { .. } => CommandId::RunMacro,
            Command::SaveTemporaryMacro { .. } => CommandId::SaveTemporaryMacro,
            Command::SaveMacro { .. } => CommandId::SaveMacro,
            Command::AbortMacro => CommandId::AbortMacro,
        }
    }

    /// The payload bytes of this command (without header or checksum).
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Command::Ping
            | Command::Versioning
            | Command::GetBluetoothInfo
            | Command::JumpToBootloader
            | Command::JumpToMain
            | Command::Level1Diagnostics
            | Command::AbortMacro => Vec::new(),
            Command::SetRobotName { name } => {
                let mut bytes = name.as_bytes().to_vec();
                bytes.truncate(48);
                bytes
            }
            Command::GoToSleep { wakeup_secs } => {
                let [msb, lsb] = wakeup_secs.to_be_bytes();
                vec![msb, lsb, 0x00]
            }
            Command::SetDataStreaming { divisor, frames, mask, count } => {
                let mut bytes = Vec::with_capacity(9);
                bytes.extend_from_slice(&divisor.to_be_bytes());
                bytes.extend_from_slice(&frames.to_be_bytes());
                bytes.extend_from_slice(&mask.to_be_bytes());
                bytes.push(*count);
                bytes
            }
            Command::SetHeading { heading } => heading.to_be_bytes().to_vec(),
            Command::Stabilization { on } => vec![u8::from(*on)],
            Command::RotationRate { rate } => vec![unit_to_byte(*rate)],
            Command::RgbLed { color } => vec![color.r, color.g, color.b],
            Command::FrontLed { brightness } => vec![unit_to_byte(*brightness)],
            Command::Roll { heading, velocity, stop } => {
                let [msb, lsb] = heading.to_be_bytes();
                vec![unit_to_byte(*velocity), msb, lsb, u8::from(!*stop)]
            }
            Command::RawMotor { left_mode, left_speed, right_mode, right_speed } => {
                vec![left_mode.as_u8(), *left_speed, right_mode.as_u8(), *right_speed]
            }
            Command::GetConfigurationBlock { id } => vec![*id],
            Command::RunMacro { macro_id } => vec![*macro_id],
            Command::SaveTemporaryMacro { flags, data } => {
                let mut bytes = Vec::with_capacity(1 + data.len());
                bytes.push(*flags);
                bytes.extend_from_slice(data);
                bytes
            }
            Command::SaveMacro { macro_id, flags, data } => {
                let mut bytes = Vec::with_capacity(2 + data.len());
                bytes.push(*macro_id);
                bytes.push(*flags);
                bytes.extend_from_slice(data);
                bytes
            }
        }
    }
}

/// An immutable, sequence-numbered command ready for transmission.
///
/// Owned by the sending queue from enqueue until its bytes are flushed, then
/// held (by clone) in the pending-response queue until a regular response
/// retires it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMessage {
    command: Command,
    seq: u8,
}

impl CommandMessage {
    /// Wrap a command, assigning the next sequence number.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Wrap a command with an explicit sequence number (tests, replays).
    pub fn with_seq(command: Command, seq: u8) -> Self {
        Self { command, seq }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn id(&self) -> CommandId {
        self.command.id()
    }

    pub fn seq(&self) -> u8 {
        self.seq
    }

    /// Total packet length on the wire: header, payload and checksum.
    pub fn packet_len(&self) -> usize {
        6 + self.command.payload().len() + 1
    }

    /// Encode the full wire packet.
    pub fn encode(&self) -> Vec<u8> {
        let id = self.command.id();
        let payload = self.command.payload();
        debug_assert!(payload.len() < 0xFF, "payload exceeds one-byte DLEN");

        let mut packet = Vec::with_capacity(7 + payload.len());
        packet.push(crate::SOP1);
        packet.push(crate::SOP2_RESPONSE);
        packet.push(id.device_id());
        packet.push(id.command_id());
        packet.push(self.seq);
        packet.push(payload.len() as u8 + 1);
        packet.extend_from_slice(&payload);
        packet.push(checksum(&packet[2..]));
        packet
    }
}

fn unit_to_byte(value: f32) -> u8 {
    (clamp(value, 0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roll_packet_has_expected_layout() {
        let msg = CommandMessage::with_seq(Command::roll(90, 0.5, false), 0x07);
        let packet = msg.encode();
        // FF FF DID CID SEQ DLEN speed h_msb h_lsb go CHK
        assert_eq!(
            &packet[..10],
            &[0xFF, 0xFF, 0x02, 0x30, 0x07, 0x05, 128, 0x00, 0x5A, 0x01]
        );
        assert_eq!(packet.len(), msg.packet_len());
        assert_eq!(*packet.last().unwrap(), checksum(&packet[2..packet.len() - 1]));
    }

    #[test]
    fn roll_constructor_clamps_inputs() {
        let Command::Roll { heading, velocity, .. } = Command::roll(720, 3.0, true) else {
            panic!("wrong variant");
        };
        assert_eq!(heading, 359);
        assert_eq!(velocity, 1.0);
    }

    #[test]
    fn ping_is_an_empty_core_packet() {
        let msg = CommandMessage::with_seq(Command::Ping, 0);
        let packet = msg.encode();
        assert_eq!(&packet[..6], &[0xFF, 0xFF, 0x00, 0x01, 0x00, 0x01]);
        assert_eq!(packet.len(), 7);
    }

    #[test]
    fn stop_roll_encodes_state_zero() {
        let msg = CommandMessage::with_seq(Command::roll(0, 0.0, true), 0);
        let packet = msg.encode();
        assert_eq!(packet[9], 0x00);
    }

    #[test]
    fn rgb_led_payload_is_color_triple() {
        let cmd = Command::RgbLed { color: Rgb::new(1, 2, 3) };
        assert_eq!(cmd.payload(), vec![1, 2, 3]);
        assert_eq!(cmd.id().device_id(), DID_SPHERO);
        assert_eq!(cmd.id().command_id(), 0x20);
    }

    #[test]
    fn save_macro_payload_prefixes_destination_and_flags() {
        let cmd = Command::SaveMacro {
            macro_id: MACRO_STREAMING_DESTINATION,
            flags: MACRO_FLAG_MOTOR_CONTROL,
            data: vec![0xAA, 0xBB],
        };
        assert_eq!(cmd.payload(), vec![0xFE, 0x02, 0xAA, 0xBB]);
    }

    #[test]
    fn sequence_numbers_increment() {
        let a = CommandMessage::new(Command::Ping);
        let b = CommandMessage::new(Command::Ping);
        assert_eq!(b.seq(), a.seq().wrapping_add(1));
    }

    #[test]
    fn robot_name_is_truncated_to_48_bytes() {
        let cmd = Command::SetRobotName { name: "x".repeat(100) };
        assert_eq!(cmd.payload().len(), 48);
    }
}
