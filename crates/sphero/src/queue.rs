//! Asynchronous sending queue.
//!
//! All outgoing traffic funnels through one unbounded channel into a single
//! writer task that owns the transport write half. The writer takes one
//! command, then opportunistically drains further already-queued commands
//! into the same buffer while it stays within the configured byte budget, and
//! issues one `write_all` + `flush` per batch. Commands are registered in the
//! pending-response queue in the exact order their bytes are staged; response
//! correlation depends on that order.
//!
//! Delayed and periodic sends are tokio timer tasks owned by the queue, with
//! their handles kept for cancellation.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sphero_protocol::{Command, CommandMessage};
use tokio::io::{self, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::pending::PendingQueue;

pub(crate) enum QueueEntry {
    Command { message: CommandMessage, system: bool },
    Shutdown,
}

/// Acceptance gate over the queue's lifecycle. `cancel` moves the gate to
/// `Draining`: scheduled and ordinary sends are refused but forced sends
/// still pass, so the final safety sequence can reach the wire. `stop_all`
/// closes the gate entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Accepting,
    Draining,
    Stopped,
}

pub(crate) struct SendingQueue {
    tx: mpsc::UnboundedSender<QueueEntry>,
    gate: Mutex<Gate>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

/// Spawn the writer task over `write` and return the queue handle plus the
/// writer's join handle. The writer exits after a shutdown entry (having
/// flushed everything staged before it) or when every sender is dropped.
pub(crate) fn start(
    write: Box<dyn AsyncWrite + Send + Unpin>,
    pending: Arc<PendingQueue>,
    budget: usize,
) -> (Arc<SendingQueue>, JoinHandle<io::Result<()>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(writer_loop(write, rx, pending, budget));
    let queue = Arc::new(SendingQueue {
        tx,
        gate: Mutex::new(Gate::Accepting),
        timers: Mutex::new(Vec::new()),
    });
    (queue, writer)
}

impl SendingQueue {
    /// Enqueue for immediate transmission. Returns `false` when the gate
    /// refuses the command (cancelled or stopped queue).
    pub fn send(&self, message: CommandMessage, system: bool) -> bool {
        if self.gate() != Gate::Accepting {
            debug!(command = ?message.id(), "queue not accepting; command dropped");
            return false;
        }
        self.tx
            .send(QueueEntry::Command { message, system })
            .is_ok()
    }

    /// Enqueue past the acceptance gate. Used only for the safety sequence
    /// while disconnecting; refused only once the queue is fully stopped.
    pub fn force_send(&self, message: CommandMessage) -> bool {
        if self.gate() == Gate::Stopped {
            return false;
        }
        self.tx
            .send(QueueEntry::Command { message, system: true })
            .is_ok()
    }

    /// Enqueue `command` once after `delay`.
    pub fn send_delayed(self: &Arc<Self>, command: Command, system: bool, delay: Duration) {
        if self.gate() != Gate::Accepting {
            return;
        }
        let queue = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.send(CommandMessage::new(command), system);
        });
        self.timers().push(handle);
    }

    /// Enqueue `command` every `period` after `initial_delay`, `repeat` times
    /// (`None` repeats until the queue is cancelled).
    pub fn send_periodically(
        self: &Arc<Self>,
        command: Command,
        system: bool,
        initial_delay: Duration,
        period: Duration,
        repeat: Option<u32>,
    ) {
        if self.gate() != Gate::Accepting {
            return;
        }
        // tokio::time::interval panics on a zero period.
        let period = period.max(Duration::from_millis(1));
        let queue = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            let mut remaining = repeat;
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if !queue.send(CommandMessage::new(command.clone()), system) {
                    break;
                }
                if let Some(left) = remaining.as_mut() {
                    if *left <= 1 {
                        break;
                    }
                    *left -= 1;
                }
            }
        });
        self.timers().push(handle);
    }

    /// Stop accepting scheduled and ordinary sends and abort all timers.
    /// Forced sends keep working until [`stop_all`](Self::stop_all).
    pub fn cancel(&self) {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if *gate == Gate::Accepting {
            *gate = Gate::Draining;
        }
        drop(gate);
        self.abort_timers();
    }

    /// Close the gate and tell the writer to exit once everything staged so
    /// far has been flushed.
    pub fn stop_all(&self) {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Gate::Stopped;
        self.abort_timers();
        let _ = self.tx.send(QueueEntry::Shutdown);
    }

    fn gate(&self) -> Gate {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timers(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn abort_timers(&self) {
        for timer in self.timers().drain(..) {
            timer.abort();
        }
    }
}

async fn writer_loop(
    mut write: Box<dyn AsyncWrite + Send + Unpin>,
    mut rx: mpsc::UnboundedReceiver<QueueEntry>,
    pending: Arc<PendingQueue>,
    budget: usize,
) -> io::Result<()> {
    let mut buf: Vec<u8> = Vec::with_capacity(budget);
    // A command pulled out by the batching pass that no longer fit the
    // budget; it opens the next batch instead.
    let mut carry: Option<(CommandMessage, bool)> = None;
    loop {
        let (message, system) = match carry.take() {
            Some(entry) => entry,
            None => match rx.recv().await {
                Some(QueueEntry::Command { message, system }) => (message, system),
                Some(QueueEntry::Shutdown) | None => break,
            },
        };

        buf.clear();
        stage(&mut buf, message, system, &pending);

        let mut shutdown = false;
        while buf.len() < budget {
            match rx.try_recv() {
                Ok(QueueEntry::Command { message, system }) => {
                    if buf.len() + message.packet_len() > budget {
                        carry = Some((message, system));
                        break;
                    }
                    stage(&mut buf, message, system, &pending);
                }
                Ok(QueueEntry::Shutdown) => {
                    shutdown = true;
                    break;
                }
                Err(_) => break,
            }
        }

        trace!(bytes = buf.len(), "flushing batch");
        write.write_all(&buf).await?;
        write.flush().await?;
        if shutdown {
            break;
        }
    }
    write.flush().await?;
    Ok(())
}

fn stage(buf: &mut Vec<u8>, message: CommandMessage, system: bool, pending: &PendingQueue) {
    debug!(
        command = ?message.id(),
        seq = message.seq(),
        system,
        "staging command"
    );
    buf.extend_from_slice(&message.encode());
    pending.push(message.command().clone(), system);
}
