//! Macro playback and the streaming flow control around finite device
//! memory.
//!
//! The device stores at most `macro_storage_size` bytes of macro bytecode. A
//! streamed macro is cut into chunks; every chunk ends with an emit marker
//! the device reports back once the chunk has executed. The ledger records
//! the byte size of each chunk believed resident on the device, so
//! `sum(ledger)` never exceeds the storage capacity. Emits retire ledger
//! entries oldest-first and trigger further chunking.
//!
//! This type is deliberately free of I/O: every operation returns the
//! commands to transmit, which keeps the chunking logic testable without a
//! transport.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use sphero_protocol::command::{
    MACRO_FLAG_MOTOR_CONTROL, MACRO_STREAMING_DESTINATION, MACRO_TEMPORARY_ID,
};
use sphero_protocol::macros::MACRO_END;
use sphero_protocol::{Command, MacroCommand, MacroMode, MacroObject};
use sphero_types::RobotSetting;
use tracing::{debug, warn};

/// Bytes an emit marker occupies in a chunk.
const EMIT_LEN: usize = 2;
/// Bytes the terminal end marker occupies.
const END_LEN: usize = 1;

/// Result of an emit signal: commands to transmit now, plus the deferred
/// user commands to release when the macro just finished.
#[derive(Debug, Default)]
pub(crate) struct EmitOutcome {
    pub commands: Vec<Command>,
    pub done: bool,
    pub after: Vec<Command>,
}

#[derive(Debug, Default)]
struct StreamState {
    queue: VecDeque<MacroCommand>,
    /// Byte size of every chunk currently believed resident on the device,
    /// oldest first.
    ledger: VecDeque<usize>,
    emits_expected: u32,
    running: bool,
    started: bool,
    next_marker: u8,
    after_macro: Vec<Command>,
}

/// Guards the sub-command queue and ledger; both the receive loop (on emit)
/// and facade callers (on play) touch them.
#[derive(Debug, Default)]
pub(crate) struct MacroManager {
    inner: Mutex<StreamState>,
}

impl MacroManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start playing `object`. Returns the commands to transmit; an empty
    /// vector means the macro was rejected (normal mode, does not fit one
    /// message).
    pub fn play(&self, object: &MacroObject, settings: &RobotSetting) -> Vec<Command> {
        match object.mode() {
            MacroMode::Normal => {
                let data = object.generate_macro_data();
                if data.len() > settings.macro_max_size() {
                    warn!(
                        size = data.len(),
                        limit = settings.macro_max_size(),
                        "macro exceeds one message and streaming is disabled; rejected"
                    );
                    return Vec::new();
                }
                vec![
                    Command::SaveTemporaryMacro {
                        flags: MACRO_FLAG_MOTOR_CONTROL,
                        data,
                    },
                    Command::RunMacro {
                        macro_id: MACRO_TEMPORARY_ID,
                    },
                ]
            }
            MacroMode::CachedStreaming => {
                let mut state = self.lock();
                state.queue.extend(object.commands().iter().copied());
                state.running = true;
                let mut commands = drain_chunks(&mut state, settings);
                if !state.started && !commands.is_empty() {
                    state.started = true;
                    commands.push(Command::RunMacro {
                        macro_id: MACRO_TEMPORARY_ID,
                    });
                }
                commands
            }
        }
    }

    /// React to a device emit: reclaim ledger space, chunk further, detect
    /// completion.
    pub fn handle_emit(&self, marker: u8, settings: &RobotSetting) -> EmitOutcome {
        let mut state = self.lock();
        if !state.running {
            debug!(marker, "emit while no macro is running; ignored");
            return EmitOutcome::default();
        }
        debug!(marker, "macro chunk consumed by device");
        state.emits_expected = state.emits_expected.saturating_sub(1);
        state.ledger.pop_front();

        let commands = drain_chunks(&mut state, settings);
        let done =
            state.queue.is_empty() && state.ledger.is_empty() && state.emits_expected == 0;
        let after = if done {
            state.running = false;
            state.started = false;
            std::mem::take(&mut state.after_macro)
        } else {
            Vec::new()
        };
        EmitOutcome {
            commands,
            done,
            after,
        }
    }

    /// Abort playback: clear all streaming state and return the abort
    /// command to transmit. Deferred after-macro commands are dropped.
    pub fn stop(&self) -> Vec<Command> {
        self.reset();
        vec![Command::AbortMacro]
    }

    /// Clear all streaming state without producing commands (connection
    /// teardown).
    pub fn reset(&self) {
        let mut state = self.lock();
        state.queue.clear();
        state.ledger.clear();
        state.emits_expected = 0;
        state.running = false;
        state.started = false;
        state.after_macro.clear();
    }

    /// Defer `command` until the running macro finishes. Returns the command
    /// back when no macro is running, meaning it should be sent immediately.
    pub fn defer(&self, command: Command) -> Option<Command> {
        let mut state = self.lock();
        if state.running {
            state.after_macro.push(command);
            None
        } else {
            Some(command)
        }
    }

    pub fn cancel_after_macro(&self) {
        self.lock().after_macro.clear();
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    #[cfg(test)]
    fn ledger_sum(&self) -> usize {
        self.lock().ledger.iter().sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StreamState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Greedily cut chunks from the front of the sub-command queue while device
/// memory allows, producing one save-macro command per chunk.
fn drain_chunks(state: &mut StreamState, settings: &RobotSetting) -> Vec<Command> {
    let mut commands = Vec::new();
    loop {
        if state.queue.is_empty() {
            break;
        }
        let resident: usize = state.ledger.iter().sum();
        let free = settings
            .macro_storage_size()
            .saturating_sub(resident)
            .min(settings.macro_max_size());
        if free < settings.macro_min_space() {
            break;
        }

        let mut chunk: Vec<u8> = Vec::new();
        while let Some(&front) = state.queue.front() {
            // Reserve room for the emit marker and a possible end marker so
            // the finished chunk never exceeds the free space.
            if chunk.len() + front.encoded_len() + EMIT_LEN + END_LEN > free {
                break;
            }
            state.queue.pop_front();
            front.encode_into(&mut chunk);
        }
        if chunk.is_empty() {
            // Not even the next sub-command fits; wait for more emits.
            break;
        }

        state.next_marker = if state.next_marker >= u8::MAX {
            1
        } else {
            state.next_marker + 1
        };
        MacroCommand::Emit {
            marker: state.next_marker,
        }
        .encode_into(&mut chunk);
        if state.queue.is_empty() {
            chunk.push(MACRO_END);
        }

        state.ledger.push_back(chunk.len());
        state.emits_expected += 1;
        debug!(
            chunk_bytes = chunk.len(),
            resident = resident + chunk.len(),
            remaining = state.queue.len(),
            "streaming macro chunk"
        );
        commands.push(Command::SaveMacro {
            macro_id: MACRO_STREAMING_DESTINATION,
            flags: MACRO_FLAG_MOTOR_CONTROL,
            data: chunk,
        });
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use sphero_protocol::CommandId;
    use sphero_types::Rgb;

    fn streaming_macro(commands: usize) -> MacroObject {
        let mut object = MacroObject::new(MacroMode::CachedStreaming);
        for i in 0..commands {
            object.add(MacroCommand::Rgb {
                color: Rgb::new(i as u8, 0, 0),
                delay: 10,
            });
        }
        object
    }

    fn chunk_data(command: &Command) -> &[u8] {
        match command {
            Command::SaveMacro { data, .. } => data,
            other => panic!("expected SaveMacro, got {other:?}"),
        }
    }

    #[test]
    fn small_normal_macro_is_saved_and_run() {
        let manager = MacroManager::new();
        let settings = RobotSetting::default();
        let mut object = MacroObject::new(MacroMode::Normal);
        object.add(MacroCommand::Delay { ms: 100 });

        let commands = manager.play(&object, &settings);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].id(), CommandId::SaveTemporaryMacro);
        assert_eq!(commands[1].id(), CommandId::RunMacro);
        assert!(!manager.is_running());
    }

    #[test]
    fn oversized_normal_macro_is_rejected() {
        let manager = MacroManager::new();
        let settings = RobotSetting::default();
        let mut object = MacroObject::new(MacroMode::Normal);
        for _ in 0..100 {
            object.add(MacroCommand::Rgb {
                color: Rgb::RED,
                delay: 1,
            }); // 500 bytes, over the 240 limit
        }
        assert!(manager.play(&object, &settings).is_empty());
    }

    #[test]
    fn streaming_fills_storage_without_exceeding_it() {
        let manager = MacroManager::new();
        let settings = RobotSetting::default(); // storage 900, chunk max 240
        let object = streaming_macro(400); // 2000 bytes compiled, exceeds storage

        let commands = manager.play(&object, &settings);
        // Last command is the run trigger, everything before is a chunk.
        assert_eq!(
            commands.last().map(Command::id),
            Some(CommandId::RunMacro)
        );
        let chunks = &commands[..commands.len() - 1];
        assert!(chunks.len() > 1, "macro must be split across chunks");
        for chunk in chunks {
            assert!(chunk_data(chunk).len() <= settings.macro_max_size());
        }
        assert!(manager.ledger_sum() <= settings.macro_storage_size());
        assert!(manager.is_running());
    }

    #[test]
    fn emits_release_memory_until_the_whole_macro_ships() {
        let manager = MacroManager::new();
        let settings = RobotSetting::default();
        let object = streaming_macro(400);
        let total_commands = 400;

        fn register(commands: &[Command], shipped: &mut usize, emits: &mut VecDeque<u8>) {
            for command in commands {
                if let Command::SaveMacro { data, .. } = command {
                    // Every sub-command is 5 bytes; subtract the markers.
                    let mut payload = data.len() - EMIT_LEN;
                    if data.last() == Some(&MACRO_END) {
                        payload -= END_LEN;
                    }
                    *shipped += payload / 5;
                    emits.push_back(0);
                }
            }
        }

        let mut shipped = 0usize;
        let mut pending_emits: VecDeque<u8> = VecDeque::new();
        let initial = manager.play(&object, &settings);
        register(&initial, &mut shipped, &mut pending_emits);

        let mut done = false;
        let mut rounds = 0;
        while let Some(marker) = pending_emits.pop_front() {
            rounds += 1;
            assert!(rounds < 1000, "streaming must terminate");
            let outcome = manager.handle_emit(marker, &settings);
            assert!(manager.ledger_sum() <= settings.macro_storage_size());
            register(&outcome.commands, &mut shipped, &mut pending_emits);
            if outcome.done {
                done = true;
                break;
            }
        }

        assert!(done, "macro must finish after enough emits");
        assert_eq!(shipped, total_commands);
        assert!(!manager.is_running());
    }

    #[test]
    fn last_chunk_carries_the_end_marker() {
        let manager = MacroManager::new();
        let settings = RobotSetting::default();
        let object = streaming_macro(3); // fits one chunk

        let commands = manager.play(&object, &settings);
        assert_eq!(commands.len(), 2); // one chunk + run
        let data = chunk_data(&commands[0]);
        assert_eq!(data.last(), Some(&MACRO_END));

        let outcome = manager.handle_emit(1, &settings);
        assert!(outcome.done);
    }

    #[test]
    fn emit_while_idle_is_ignored() {
        let manager = MacroManager::new();
        let settings = RobotSetting::default();
        let outcome = manager.handle_emit(7, &settings);
        assert!(!outcome.done);
        assert!(outcome.commands.is_empty());
    }

    #[test]
    fn stop_clears_state_and_aborts() {
        let manager = MacroManager::new();
        let settings = RobotSetting::default();
        manager.play(&streaming_macro(400), &settings);
        assert!(manager.is_running());

        let commands = manager.stop();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].id(), CommandId::AbortMacro);
        assert!(!manager.is_running());
        assert_eq!(manager.ledger_sum(), 0);
    }

    #[test]
    fn deferred_commands_flush_when_the_macro_finishes() {
        let manager = MacroManager::new();
        let settings = RobotSetting::default();
        manager.play(&streaming_macro(3), &settings);

        assert!(manager.defer(Command::Ping).is_none());
        let outcome = manager.handle_emit(1, &settings);
        assert!(outcome.done);
        assert_eq!(outcome.after.len(), 1);
        assert_eq!(outcome.after[0].id(), CommandId::Ping);

        // No macro running: defer hands the command straight back.
        assert!(manager.defer(Command::Ping).is_some());
    }

    #[test]
    fn cancel_after_macro_drops_deferred_commands() {
        let manager = MacroManager::new();
        let settings = RobotSetting::default();
        manager.play(&streaming_macro(3), &settings);
        assert!(manager.defer(Command::Ping).is_none());
        manager.cancel_after_macro();

        let outcome = manager.handle_emit(1, &settings);
        assert!(outcome.done);
        assert!(outcome.after.is_empty());
    }
}
