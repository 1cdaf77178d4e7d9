//! The robot facade: connection lifecycle, command surface and the
//! confirmed-state records.
//!
//! A connected robot runs two tasks, the sending queue's writer and the
//! receive loop, both owning one half of the caller-supplied transport. The
//! facade itself is cheap to clone and thread-safe; command methods enqueue
//! and return immediately, transport faults surface as listener events.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use sphero_protocol::response::{ResponseBody, ResponseCode, ResponseFrame, ResponseKind};
use sphero_protocol::{
    decode_response, Command, CommandMessage, InformationKind, InformationResponse, MacroCommand,
    MacroMode, MacroObject,
};
use sphero_types::{EventCode, Rgb, RobotSetting, SpheroError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::drive::{DriveAlgorithm, JoystickDriveAlgorithm};
use crate::listener::{ListenerRegistry, RobotListener};
use crate::macro_manager::MacroManager;
use crate::pending::PendingQueue;
use crate::queue::{self, SendingQueue};
use crate::state::{RobotLed, RobotMovement, RobotRawMovement};
use crate::stream;

/// A Sphero robot reachable over a caller-supplied duplex byte stream.
///
/// Clones share the same underlying state and connection.
#[derive(Clone)]
pub struct Robot {
    shared: Arc<RobotShared>,
}

pub(crate) struct RobotShared {
    pub(crate) settings: RobotSetting,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) macros: MacroManager,
    pub(crate) pending: Arc<PendingQueue>,
    pub(crate) movement: Mutex<RobotMovement>,
    pub(crate) raw_movement: Mutex<RobotRawMovement>,
    pub(crate) led: Mutex<RobotLed>,
    name: Mutex<Option<String>>,
    drive: Mutex<Arc<dyn DriveAlgorithm>>,
    connection: Mutex<Option<Connection>>,
    /// Set for the duration of an orderly disconnect so transport teardown is
    /// not reported as an unexpected closure.
    closing: AtomicBool,
}

struct Connection {
    queue: Arc<SendingQueue>,
    /// Watcher wrapping the writer task; finishes when the writer has
    /// flushed everything and exited.
    writer: JoinHandle<()>,
    listener: JoinHandle<()>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Facade
// ─────────────────────────────────────────────────────────────────────────────

impl Robot {
    pub fn new(settings: RobotSetting) -> Self {
        Self {
            shared: RobotShared::new(settings),
        }
    }

    pub fn settings(&self) -> &RobotSetting {
        &self.shared.settings
    }

    pub fn add_listener(&self, listener: Arc<dyn RobotListener>) {
        self.shared.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn RobotListener>) {
        self.shared.listeners.remove(listener);
    }

    /// Last confirmed drive state.
    pub fn movement(&self) -> RobotMovement {
        *self.shared.lock(&self.shared.movement)
    }

    /// Last confirmed raw motor state.
    pub fn raw_movement(&self) -> RobotRawMovement {
        *self.shared.lock(&self.shared.raw_movement)
    }

    /// Last confirmed LED state.
    pub fn led(&self) -> RobotLed {
        *self.shared.lock(&self.shared.led)
    }

    /// Device name captured from the bluetooth-info query during connect.
    pub fn name(&self) -> Option<String> {
        self.shared.lock(&self.shared.name).clone()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock(&self.shared.connection).is_some()
    }

    /// Establish the connection over `transport` and run the initialization
    /// sequence: abort any stale macro, re-assert the last known LED and
    /// drive state, query the device name, start the keep-alive ping.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`SpheroError::AlreadyConnected`] when a connection exists;
    /// [`SpheroError::InitializationFailed`] when the initialization
    /// sequence cannot be enqueued.
    pub fn connect<T>(&self, transport: T) -> Result<(), SpheroError>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let shared = &self.shared;
        {
            let mut slot = shared.lock(&shared.connection);
            if slot.is_some() {
                return Err(SpheroError::AlreadyConnected);
            }

            let (read, write) = tokio::io::split(transport);
            shared.pending.clear();
            shared.macros.reset();
            let (queue, writer) = queue::start(
                Box::new(write),
                Arc::clone(&shared.pending),
                shared.settings.buffer_size(),
            );
            let writer = watch_writer(writer, Arc::downgrade(shared));
            let listener = tokio::spawn(stream::listener_loop(
                Box::new(read),
                Arc::clone(shared),
            ));
            *slot = Some(Connection {
                queue,
                writer,
                listener,
            });
        }

        let movement = self.movement();
        let led = self.led();
        let init = [
            Command::AbortMacro,
            Command::RgbLed { color: led.rgb },
            Command::front_led(led.brightness),
            Command::rotation_rate(movement.rotation_rate),
            Command::Roll {
                heading: movement.heading,
                velocity: movement.velocity,
                stop: movement.stop,
            },
            Command::GetBluetoothInfo,
        ];
        for command in init {
            if !shared.send(command, true) {
                shared.notify_event(EventCode::ConnectionFailed);
                return Err(SpheroError::InitializationFailed(
                    "initialization command rejected by the sending queue".into(),
                ));
            }
        }
        let ping = shared.settings.ping_interval();
        shared.send_periodically(Command::Ping, true, ping, ping, None);

        info!("connection established");
        shared.notify_event(EventCode::ConnectionEstablished);
        Ok(())
    }

    /// Orderly teardown: stop scheduling, force the safety sequence (abort
    /// macro, stop roll, LEDs off) onto the wire, drain the writer and stop
    /// the receive loop.
    ///
    /// Idempotent: a second call only raises
    /// [`EventCode::NoConnectionExists`].
    pub async fn disconnect(&self) -> Result<(), SpheroError> {
        let shared = &self.shared;
        let Some(connection) = shared.take_connection() else {
            debug!("disconnect without an active connection");
            shared.notify_event(EventCode::NoConnectionExists);
            return Ok(());
        };

        shared.closing.store(true, Ordering::SeqCst);
        connection.queue.cancel();

        let current = self.movement();
        let safety = shared
            .macros
            .stop()
            .into_iter()
            .chain([
                Command::roll(current.heading, 0.0, true),
                Command::RgbLed { color: Rgb::BLACK },
                Command::front_led(0.0),
            ]);
        for command in safety {
            connection.queue.force_send(CommandMessage::new(command));
        }
        connection.queue.stop_all();

        // The writer exits only after flushing everything staged before the
        // shutdown entry, so the safety sequence is on the wire by now.
        let _ = connection.writer.await;
        connection.listener.abort();
        let _ = connection.listener.await;

        shared.pending.clear();
        shared.closing.store(false, Ordering::SeqCst);
        info!("disconnected");
        shared.notify_event(EventCode::Disconnected);
        Ok(())
    }

    // ── drive and LED surface ────────────────────────────────────────────

    pub fn ping(&self) {
        self.send_command(Command::Ping);
    }

    /// Drive at `velocity` (unit interval) towards `heading` degrees.
    pub fn roll(&self, heading: u16, velocity: f32) {
        self.send_command(Command::roll(heading, velocity, false));
    }

    /// Turn in place towards `heading` without driving.
    pub fn rotate(&self, heading: u16) {
        self.send_command(Command::roll(heading, 0.0, false));
    }

    /// Zero the device's heading system at `heading`.
    pub fn calibrate(&self, heading: u16) {
        self.send_command(Command::set_heading(heading));
    }

    pub fn reset_heading(&self) {
        self.calibrate(0);
    }

    /// Stop both motors via a raw off command.
    pub fn stop_motors(&self) {
        self.send_command(Command::RawMotor {
            left_mode: sphero_types::MotorMode::Off,
            left_speed: 0,
            right_mode: sphero_types::MotorMode::Off,
            right_speed: 0,
        });
    }

    /// Full speed ahead on the current heading, stopping after `duration`.
    pub fn boost(&self, duration: Duration) {
        let heading = self.movement().heading;
        self.send_command(Command::roll(heading, 1.0, false));
        self.shared
            .send_delayed(Command::roll(heading, 0.0, true), false, duration);
    }

    /// Convert `(x, y, z)` through the configured drive algorithm into a
    /// roll.
    pub fn drive(&self, x: f64, y: f64, z: f64) {
        let algorithm = Arc::clone(&self.shared.lock(&self.shared.drive));
        let vector = algorithm.convert(x, y, z);
        self.send_command(Command::roll(vector.heading, vector.velocity, false));
    }

    pub fn set_drive_algorithm(&self, algorithm: Arc<dyn DriveAlgorithm>) {
        *self.shared.lock(&self.shared.drive) = algorithm;
    }

    pub fn set_rgb_led(&self, color: Rgb) {
        self.send_command(Command::RgbLed { color });
    }

    pub fn set_front_led_brightness(&self, brightness: f32) {
        self.send_command(Command::front_led(brightness));
    }

    pub fn set_rotation_rate(&self, rate: f32) {
        self.send_command(Command::rotation_rate(rate));
    }

    pub fn stabilization(&self, on: bool) {
        self.send_command(Command::Stabilization { on });
    }

    pub fn raw_motor(
        &self,
        left_mode: sphero_types::MotorMode,
        left_speed: u8,
        right_mode: sphero_types::MotorMode,
        right_speed: u8,
    ) {
        self.send_command(Command::RawMotor {
            left_mode,
            left_speed,
            right_mode,
            right_speed,
        });
    }

    // ── device management ────────────────────────────────────────────────

    pub fn set_robot_name(&self, name: &str) {
        self.send_command(Command::SetRobotName { name: name.into() });
    }

    /// Put the device to sleep, waking after `wakeup_secs` (0 keeps it
    /// asleep). The connection is lost when the device powers down.
    pub fn sleep(&self, wakeup_secs: u16) {
        self.send_command(Command::GoToSleep { wakeup_secs });
    }

    pub fn jump_to_bootloader(&self) {
        self.send_command(Command::JumpToBootloader);
    }

    pub fn set_data_streaming(&self, divisor: u16, frames: u16, mask: u32, count: u8) {
        self.send_command(Command::SetDataStreaming {
            divisor,
            frames,
            mask,
            count,
        });
    }

    // ── macros ───────────────────────────────────────────────────────────

    /// Play `object`, chunked and streamed when its mode asks for it.
    pub fn send_macro(&self, object: &MacroObject) {
        for command in self.shared.macros.play(object, &self.shared.settings) {
            self.shared.send(command, true);
        }
    }

    /// Abort the running macro and clear all streaming state.
    pub fn stop_macro(&self) {
        for command in self.shared.macros.stop() {
            self.shared.send(command, true);
        }
    }

    /// Send `command` once the running macro finishes; sends immediately
    /// when no macro is running.
    pub fn send_command_after_macro(&self, command: Command) {
        if let Some(command) = self.shared.macros.defer(command) {
            self.shared.send(command, false);
        }
    }

    pub fn cancel_after_macro(&self) {
        self.shared.macros.cancel_after_macro();
    }

    /// Fade the main LED from one color to another as a streamed macro.
    pub fn rgb_transition(&self, from: Rgb, to: Rgb, steps: u16, step_delay: u8) {
        let (fh, fs, fb) = from.to_hsb();
        let (th, ts, tb) = to.to_hsb();
        let steps = steps.max(1);
        let mut object = MacroObject::new(MacroMode::CachedStreaming);
        for i in 0..=steps {
            let t = f32::from(i) / f32::from(steps);
            object.add(MacroCommand::Rgb {
                color: Rgb::from_hsb(fh + (th - fh) * t, fs + (ts - fs) * t, fb + (tb - fb) * t),
                delay: step_delay,
            });
        }
        self.send_macro(&object);
    }

    /// Pulse the main LED by fading its brightness down and back up.
    pub fn rgb_breath(&self, color: Rgb, cycles: u8, steps: u16, step_delay: u8) {
        let (h, s, b) = color.to_hsb();
        let steps = steps.max(1);
        let mut object = MacroObject::new(MacroMode::CachedStreaming);
        for _ in 0..cycles.max(1) {
            for i in (0..=steps).rev().chain(1..=steps) {
                object.add(MacroCommand::Rgb {
                    color: Rgb::from_hsb(h, s, b * f32::from(i) / f32::from(steps)),
                    delay: step_delay,
                });
            }
        }
        self.send_macro(&object);
    }

    // ── raw command access ───────────────────────────────────────────────

    /// Enqueue an arbitrary command as a user command; its response is
    /// surfaced to listeners.
    pub fn send_command(&self, command: Command) {
        self.shared.send(command, false);
    }

    pub fn send_command_delayed(&self, command: Command, delay: Duration) {
        self.shared.send_delayed(command, false, delay);
    }

    /// Schedule a repeating send. `repeat` of `None` repeats until the
    /// connection closes.
    pub fn send_command_periodically(
        &self,
        command: Command,
        initial_delay: Duration,
        period: Duration,
        repeat: Option<u32>,
    ) {
        self.shared
            .send_periodically(command, false, initial_delay, period, repeat);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared state and response dispatch
// ─────────────────────────────────────────────────────────────────────────────

impl RobotShared {
    pub(crate) fn new(settings: RobotSetting) -> Arc<Self> {
        Arc::new(Self {
            movement: Mutex::new(RobotMovement::from_setting(&settings)),
            raw_movement: Mutex::new(RobotRawMovement::from_setting(&settings)),
            led: Mutex::new(RobotLed::from_setting(&settings)),
            settings,
            listeners: ListenerRegistry::default(),
            macros: MacroManager::new(),
            pending: Arc::new(PendingQueue::new()),
            name: Mutex::new(None),
            drive: Mutex::new(Arc::new(JoystickDriveAlgorithm)),
            connection: Mutex::new(None),
            closing: AtomicBool::new(false),
        })
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_connection(&self) -> Option<Connection> {
        self.lock(&self.connection).take()
    }

    pub(crate) fn notify_event(&self, event: EventCode) {
        self.listeners.notify_event(event);
    }

    /// Enqueue on the current connection's queue; a missing connection only
    /// logs, asynchronous sends never fail towards the caller.
    pub(crate) fn send(&self, command: Command, system: bool) -> bool {
        let queue = self
            .lock(&self.connection)
            .as_ref()
            .map(|c| Arc::clone(&c.queue));
        let Some(queue) = queue else {
            warn!(command = ?command.id(), "not connected; command dropped");
            return false;
        };
        queue.send(CommandMessage::new(command), system)
    }

    fn send_delayed(&self, command: Command, system: bool, delay: Duration) {
        let queue = self
            .lock(&self.connection)
            .as_ref()
            .map(|c| Arc::clone(&c.queue));
        match queue {
            Some(queue) => queue.send_delayed(command, system, delay),
            None => warn!(command = ?command.id(), "not connected; delayed command dropped"),
        }
    }

    fn send_periodically(
        &self,
        command: Command,
        system: bool,
        initial_delay: Duration,
        period: Duration,
        repeat: Option<u32>,
    ) {
        let queue = self
            .lock(&self.connection)
            .as_ref()
            .map(|c| Arc::clone(&c.queue));
        match queue {
            Some(queue) => queue.send_periodically(command, system, initial_delay, period, repeat),
            None => warn!(command = ?command.id(), "not connected; periodic command dropped"),
        }
    }

    /// Entry point for every complete frame the receive loop extracts.
    pub(crate) fn dispatch_frame(&self, frame: ResponseFrame) {
        match frame.header.kind {
            ResponseKind::Regular { code, seq } => self.handle_regular(code, seq, &frame.payload),
            ResponseKind::Information { id_code } => {
                self.handle_information(id_code, &frame.payload)
            }
        }
    }

    fn handle_regular(&self, code: ResponseCode, seq: u8, payload: &[u8]) {
        let Some(pending) = self.pending.pop() else {
            warn!(?code, seq, "regular response with no pending command");
            return;
        };
        let response = decode_response(pending.command.id(), code, seq, payload);
        if code.is_ok() {
            self.apply_confirmed(&pending.command);
        } else {
            warn!(
                command = ?pending.command.id(),
                ?code,
                system = pending.system,
                "device rejected command"
            );
        }
        if pending.system {
            self.consume_system_response(&response);
        } else {
            self.listeners.notify_response(&response, &pending.command);
        }
    }

    /// System responses never reach listeners; the only one carrying state
    /// is the bluetooth-info reply with the device name.
    fn consume_system_response(&self, response: &sphero_protocol::ResponseMessage) {
        if let ResponseBody::BluetoothInfo { name, .. } = &response.body {
            debug!(name, "device name captured");
            *self.lock(&self.name) = Some(name.clone());
        }
    }

    /// Fold a confirmed command into the state records. Only called after an
    /// OK response, and only from the receive loop.
    fn apply_confirmed(&self, command: &Command) {
        match command {
            Command::Roll {
                heading,
                velocity,
                stop,
            } => {
                let mut movement = self.lock(&self.movement);
                movement.heading = *heading;
                movement.velocity = *velocity;
                movement.stop = *stop;
            }
            // A confirmed calibration zeroes the device's heading reference.
            Command::SetHeading { .. } => self.lock(&self.movement).heading = 0,
            Command::RotationRate { rate } => self.lock(&self.movement).rotation_rate = *rate,
            Command::Stabilization { on } => self.lock(&self.movement).stabilization = *on,
            Command::RgbLed { color } => self.lock(&self.led).rgb = *color,
            Command::FrontLed { brightness } => self.lock(&self.led).brightness = *brightness,
            Command::RawMotor {
                left_mode,
                left_speed,
                right_mode,
                right_speed,
            } => {
                let mut raw = self.lock(&self.raw_movement);
                raw.left_mode = *left_mode;
                raw.left_speed = *left_speed;
                raw.right_mode = *right_mode;
                raw.right_speed = *right_speed;
            }
            _ => {}
        }
    }

    fn handle_information(&self, id_code: u8, payload: &[u8]) {
        let info = InformationResponse::decode(id_code, payload);
        match info.kind {
            InformationKind::SensorData => self.listeners.notify_information(&info),
            InformationKind::MacroEmit => {
                let Some(marker) = info.emit_marker() else {
                    warn!("emit information response without a marker byte");
                    return;
                };
                let outcome = self.macros.handle_emit(marker, &self.settings);
                for command in outcome.commands {
                    self.send(command, true);
                }
                if outcome.done {
                    info!("macro playback finished");
                    self.notify_event(EventCode::MacroDone);
                    for command in outcome.after {
                        self.send(command, false);
                    }
                }
            }
            kind => debug!(?kind, "dropping unhandled information response"),
        }
    }

    /// Discard pending commands whose response deadline passed, reporting
    /// each as a timeout.
    pub(crate) fn expire_pending(&self, timeout: Duration) {
        for entry in self.pending.expire(timeout) {
            warn!(
                command = ?entry.command.id(),
                system = entry.system,
                "no response within the deadline; pending command discarded"
            );
            self.notify_event(EventCode::CommandTimeout);
        }
    }

    /// Fatal transport fault or EOF: tear the connection down and notify,
    /// unless an orderly disconnect is already in progress.
    pub(crate) fn transport_closed(&self, cause: Option<io::Error>) {
        if self.closing.load(Ordering::SeqCst) {
            debug!("transport closed during orderly disconnect");
            return;
        }
        let Some(connection) = self.take_connection() else {
            return;
        };
        match cause {
            Some(err) => error!(error = %err, "transport failed; closing connection"),
            None => warn!("transport closed by peer"),
        }
        connection.queue.stop_all();
        self.pending.clear();
        self.macros.reset();
        self.notify_event(EventCode::ConnectionClosedUnexpected);
    }
}

/// Await the writer task; a write error is a fatal connection fault.
fn watch_writer(writer: JoinHandle<io::Result<()>>, shared: Weak<RobotShared>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                if let Some(shared) = shared.upgrade() {
                    shared.transport_closed(Some(err));
                }
            }
            Err(err) if err.is_panic() => error!("writer task panicked"),
            Err(_) => {}
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sphero_protocol::CommandId;
    use std::sync::Mutex as StdMutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    #[derive(Default)]
    struct Recorder {
        events: StdMutex<Vec<EventCode>>,
        responses: StdMutex<Vec<(CommandId, ResponseCode)>>,
    }

    impl RobotListener for Recorder {
        fn on_event(&self, event: EventCode) {
            self.events.lock().unwrap().push(event);
        }

        fn on_response(&self, response: &sphero_protocol::ResponseMessage, command: &Command) {
            self.responses
                .lock()
                .unwrap()
                .push((command.id(), response.code));
        }
    }

    impl Recorder {
        fn events(&self) -> Vec<EventCode> {
            self.events.lock().unwrap().clone()
        }

        fn responses(&self) -> Vec<(CommandId, ResponseCode)> {
            self.responses.lock().unwrap().clone()
        }
    }

    fn regular_frame(code: u8, seq: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xFF, 0xFF, code, seq, payload.len() as u8 + 1];
        frame.extend_from_slice(payload);
        frame.push(sphero_protocol::checksum(&frame[2..]));
        frame
    }

    /// Simulated device: acks every command packet in order, optionally
    /// failing one `(did, cid)` pair, and records the packets it saw.
    fn spawn_device(
        mut device: DuplexStream,
        fail: Option<(u8, u8)>,
    ) -> Arc<StdMutex<Vec<Vec<u8>>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        tokio::spawn(async move {
            loop {
                let mut header = [0u8; 6];
                if device.read_exact(&mut header).await.is_err() {
                    return;
                }
                let mut rest = vec![0u8; usize::from(header[5])];
                if device.read_exact(&mut rest).await.is_err() {
                    return;
                }
                let mut packet = header.to_vec();
                packet.extend_from_slice(&rest);
                log.lock().unwrap().push(packet);

                let code = match fail {
                    Some((did, cid)) if header[2] == did && header[3] == cid => 0x08,
                    _ => 0x00,
                };
                let frame = regular_frame(code, header[4], &[]);
                if device.write_all(&frame).await.is_err() {
                    return;
                }
            }
        });
        seen
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if condition() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn ok_roll_response_updates_movement_and_notifies_once() {
        let (host, device) = tokio::io::duplex(1024);
        spawn_device(device, None);

        let robot = Robot::new(RobotSetting::default());
        let recorder = Arc::new(Recorder::default());
        robot.add_listener(recorder.clone());
        robot.connect(host).unwrap();

        robot.roll(90, 0.5);
        wait_until(|| robot.movement().heading == 90).await;

        let movement = robot.movement();
        assert_eq!(movement.heading, 90);
        assert_eq!(movement.velocity, 0.5);
        assert!(!movement.stop);

        // Only the user roll surfaces; the init sequence is all system.
        let responses = recorder.responses();
        assert_eq!(responses, vec![(CommandId::Roll, ResponseCode::Ok)]);

        robot.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn failed_roll_response_leaves_state_unchanged() {
        let (host, device) = tokio::io::duplex(1024);
        spawn_device(device, Some((0x02, 0x30))); // reject every roll

        let robot = Robot::new(RobotSetting::default());
        let recorder = Arc::new(Recorder::default());
        robot.add_listener(recorder.clone());
        robot.connect(host).unwrap();

        robot.roll(90, 0.5);
        wait_until(|| !recorder.responses().is_empty()).await;

        assert_eq!(
            recorder.responses(),
            vec![(CommandId::Roll, ResponseCode::ExecutionFailed)]
        );
        let movement = robot.movement();
        assert_eq!(movement.heading, 0);
        assert_eq!(movement.velocity, 0.0);

        robot.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn responses_correlate_fifo_across_a_burst() {
        let (host, device) = tokio::io::duplex(4096);
        spawn_device(device, None);

        let robot = Robot::new(RobotSetting::default());
        let recorder = Arc::new(Recorder::default());
        robot.add_listener(recorder.clone());
        robot.connect(host).unwrap();

        robot.send_command(Command::Ping);
        robot.send_command(Command::roll(45, 0.3, false));
        robot.send_command(Command::Versioning);
        wait_until(|| recorder.responses().len() == 3).await;

        let order: Vec<CommandId> = recorder.responses().iter().map(|(id, _)| *id).collect();
        assert_eq!(
            order,
            vec![CommandId::Ping, CommandId::Roll, CommandId::Versioning]
        );

        robot.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_sends_one_safety_sequence() {
        let (host, device) = tokio::io::duplex(4096);
        let seen = spawn_device(device, None);

        let robot = Robot::new(RobotSetting::default());
        let recorder = Arc::new(Recorder::default());
        robot.add_listener(recorder.clone());
        robot.connect(host).unwrap();
        wait_until(|| robot.name().is_some() || !seen.lock().unwrap().is_empty()).await;

        robot.disconnect().await.unwrap();
        assert!(!robot.is_connected());
        robot.disconnect().await.unwrap();

        // One abort from connect's init plus exactly one from the single
        // safety sequence.
        let aborts = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p[2] == 0x02 && p[3] == 0x55)
            .count();
        assert_eq!(aborts, 2);

        let events = recorder.events();
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == EventCode::Disconnected)
                .count(),
            1
        );
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == EventCode::NoConnectionExists)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn connect_twice_is_rejected() {
        let (host, device) = tokio::io::duplex(1024);
        spawn_device(device, None);
        let (host2, _device2) = tokio::io::duplex(1024);

        let robot = Robot::new(RobotSetting::default());
        robot.connect(host).unwrap();
        assert!(matches!(
            robot.connect(host2),
            Err(SpheroError::AlreadyConnected)
        ));
        robot.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn device_name_is_captured_from_bluetooth_info() {
        let (host, mut device) = tokio::io::duplex(4096);

        let robot = Robot::new(RobotSetting::default());
        robot.connect(host).unwrap();

        // Hand-rolled device: ack everything, answer the bluetooth-info
        // query with a real name record.
        tokio::spawn(async move {
            loop {
                let mut header = [0u8; 6];
                if device.read_exact(&mut header).await.is_err() {
                    return;
                }
                let mut rest = vec![0u8; usize::from(header[5])];
                if device.read_exact(&mut rest).await.is_err() {
                    return;
                }
                let frame = if header[2] == 0x00 && header[3] == 0x11 {
                    let mut payload = Vec::new();
                    payload.extend_from_slice(b"Sphero-YGB\0\0\0\0\0\0");
                    payload.extend_from_slice(b"00066B541234");
                    regular_frame(0x00, header[4], &payload)
                } else {
                    regular_frame(0x00, header[4], &[])
                };
                if device.write_all(&frame).await.is_err() {
                    return;
                }
            }
        });

        wait_until(|| robot.name().is_some()).await;
        assert_eq!(robot.name().as_deref(), Some("Sphero-YGB"));
        robot.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn unexpected_transport_close_raises_event() {
        let (host, device) = tokio::io::duplex(1024);

        let robot = Robot::new(RobotSetting::default());
        let recorder = Arc::new(Recorder::default());
        robot.add_listener(recorder.clone());
        robot.connect(host).unwrap();

        drop(device); // peer vanishes
        wait_until(|| {
            recorder
                .events()
                .contains(&EventCode::ConnectionClosedUnexpected)
        })
        .await;
        assert!(!robot.is_connected());
    }

    #[tokio::test]
    async fn streamed_macro_finishes_and_raises_macro_done() {
        let (host, mut device) = tokio::io::duplex(8192);

        let robot = Robot::new(RobotSetting::default());
        let recorder = Arc::new(Recorder::default());
        robot.add_listener(recorder.clone());
        robot.connect(host).unwrap();

        // Device sim: ack every command; when a streamed chunk (save-macro to
        // the streaming destination) is acked, also emit its consumption.
        tokio::spawn(async move {
            let mut emitted = 0u8;
            loop {
                let mut header = [0u8; 6];
                if device.read_exact(&mut header).await.is_err() {
                    return;
                }
                let mut rest = vec![0u8; usize::from(header[5])];
                if device.read_exact(&mut rest).await.is_err() {
                    return;
                }
                let ack = regular_frame(0x00, header[4], &[]);
                if device.write_all(&ack).await.is_err() {
                    return;
                }
                let is_stream_chunk =
                    header[2] == 0x02 && header[3] == 0x52 && rest.first() == Some(&0xFE);
                if is_stream_chunk {
                    emitted = emitted.wrapping_add(1).max(1);
                    let mut emit = vec![0xFF, 0xFE, 0x06, 0x00, 0x02, emitted];
                    emit.push(sphero_protocol::checksum(&emit[2..]));
                    if device.write_all(&emit).await.is_err() {
                        return;
                    }
                }
            }
        });

        let mut object = MacroObject::new(MacroMode::CachedStreaming);
        for _ in 0..400 {
            object.add(MacroCommand::Rgb {
                color: Rgb::RED,
                delay: 1,
            });
        }
        robot.send_macro(&object);

        wait_until(|| recorder.events().contains(&EventCode::MacroDone)).await;
        robot.disconnect().await.unwrap();
    }
}
