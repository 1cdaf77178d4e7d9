//! Macro byte-code assembly.
//!
//! A macro is a small program the device executes on its own scheduler. Each
//! [`MacroCommand`] encodes to a fixed-size opcode sequence; a finished macro
//! is the concatenation of its commands followed by the end marker.

use sphero_types::Rgb;

/// Terminates a macro program.
pub const MACRO_END: u8 = 0x00;

const OP_ROLL: u8 = 0x05;
const OP_RGB: u8 = 0x07;
const OP_FRONT_LED: u8 = 0x09;
const OP_DELAY: u8 = 0x0B;
const OP_EMIT: u8 = 0x15;

/// One macro instruction.
///
/// Delays attached to an instruction are post-delays: the device waits that
/// many milliseconds after applying the instruction before moving on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroCommand {
    /// Set the main LED color, then wait.
    Rgb { color: Rgb, delay: u8 },
    /// Set the back LED brightness, then wait.
    FrontLed { brightness: u8, delay: u8 },
    /// Drive at a speed and heading, then wait.
    Roll { speed: u8, heading: u16, delay: u8 },
    /// Wait without changing anything.
    Delay { ms: u16 },
    /// Report a marker back to the host when execution reaches this point.
    Emit { marker: u8 },
}

impl MacroCommand {
    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            MacroCommand::Rgb { .. } => 5,
            MacroCommand::FrontLed { .. } => 3,
            MacroCommand::Roll { .. } => 5,
            MacroCommand::Delay { .. } => 3,
            MacroCommand::Emit { .. } => 2,
        }
    }

    /// Append the opcode sequence for this instruction to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match *self {
            MacroCommand::Rgb { color, delay } => {
                out.extend_from_slice(&[OP_RGB, color.r, color.g, color.b, delay]);
            }
            MacroCommand::FrontLed { brightness, delay } => {
                out.extend_from_slice(&[OP_FRONT_LED, brightness, delay]);
            }
            MacroCommand::Roll {
                speed,
                heading,
                delay,
            } => {
                let heading = heading % 360;
                out.extend_from_slice(&[
                    OP_ROLL,
                    speed,
                    (heading >> 8) as u8,
                    (heading & 0xFF) as u8,
                    delay,
                ]);
            }
            MacroCommand::Delay { ms } => {
                out.extend_from_slice(&[OP_DELAY, (ms >> 8) as u8, (ms & 0xFF) as u8]);
            }
            MacroCommand::Emit { marker } => {
                out.extend_from_slice(&[OP_EMIT, marker]);
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }
}

/// How a macro program is delivered to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacroMode {
    /// The whole program fits in one temporary macro slot.
    #[default]
    Normal,
    /// The program is streamed to the device in chunks, each confirmed by an
    /// emit marker before more storage is reused.
    CachedStreaming,
}

/// An ordered macro program under construction.
#[derive(Debug, Clone, Default)]
pub struct MacroObject {
    commands: Vec<MacroCommand>,
    mode: MacroMode,
}

impl MacroObject {
    pub fn new(mode: MacroMode) -> Self {
        Self {
            commands: Vec::new(),
            mode,
        }
    }

    pub fn mode(&self) -> MacroMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: MacroMode) {
        self.mode = mode;
    }

    pub fn add(&mut self, command: MacroCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[MacroCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Encoded size of the full program including the end marker.
    pub fn encoded_len(&self) -> usize {
        self.commands
            .iter()
            .map(MacroCommand::encoded_len)
            .sum::<usize>()
            + 1
    }

    /// Assemble the complete byte-code, terminated by [`MACRO_END`].
    pub fn generate_macro_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for command in &self.commands {
            command.encode_into(&mut out);
        }
        out.push(MACRO_END);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_lengths_match_declared_lengths() {
        let commands = [
            MacroCommand::Rgb {
                color: Rgb::RED,
                delay: 10,
            },
            MacroCommand::FrontLed {
                brightness: 255,
                delay: 0,
            },
            MacroCommand::Roll {
                speed: 128,
                heading: 270,
                delay: 50,
            },
            MacroCommand::Delay { ms: 1000 },
            MacroCommand::Emit { marker: 3 },
        ];
        for command in commands {
            assert_eq!(command.encode().len(), command.encoded_len(), "{command:?}");
        }
    }

    #[test]
    fn roll_splits_heading_big_endian() {
        let bytes = MacroCommand::Roll {
            speed: 0xFF,
            heading: 300,
            delay: 5,
        }
        .encode();
        assert_eq!(bytes, vec![0x05, 0xFF, 0x01, 0x2C, 5]);
    }

    #[test]
    fn roll_wraps_heading_past_full_turn() {
        let bytes = MacroCommand::Roll {
            speed: 1,
            heading: 450,
            delay: 0,
        }
        .encode();
        assert_eq!(&bytes[2..4], &[0x00, 90]);
    }

    #[test]
    fn delay_splits_milliseconds_big_endian() {
        assert_eq!(
            MacroCommand::Delay { ms: 0x1234 }.encode(),
            vec![0x0B, 0x12, 0x34]
        );
    }

    #[test]
    fn generated_program_ends_with_terminator() {
        let mut object = MacroObject::new(MacroMode::Normal);
        object.add(MacroCommand::Rgb {
            color: Rgb::BLUE,
            delay: 0,
        });
        object.add(MacroCommand::Delay { ms: 500 });
        let data = object.generate_macro_data();
        assert_eq!(data.len(), object.encoded_len());
        assert_eq!(data.last(), Some(&MACRO_END));
        assert_eq!(&data[..5], &[0x07, 0, 0, 255, 0]);
    }

    #[test]
    fn empty_program_is_just_the_terminator() {
        let object = MacroObject::default();
        assert_eq!(object.generate_macro_data(), vec![MACRO_END]);
    }
}
