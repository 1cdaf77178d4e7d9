//! Listener trait and the registry that fans notifications out.
//!
//! Callbacks run synchronously on whichever task produced the event (the
//! writer or the receive loop), so implementations must not block.

use std::sync::{Arc, PoisonError, RwLock};

use sphero_protocol::{Command, InformationResponse, ResponseMessage};
use sphero_types::EventCode;

/// Receives robot notifications.
///
/// Every method has an empty default body so implementors override only what
/// they care about.
pub trait RobotListener: Send + Sync {
    /// Connection lifecycle and macro playback events.
    fn on_event(&self, _event: EventCode) {}

    /// A regular response to a user command, paired with the command that
    /// caused it. System command responses are never surfaced here.
    fn on_response(&self, _response: &ResponseMessage, _command: &Command) {}

    /// An unsolicited information response (sensor data).
    fn on_information(&self, _info: &InformationResponse) {}
}

/// Set of registered listeners, notified in registration order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    inner: RwLock<Vec<Arc<dyn RobotListener>>>,
}

impl ListenerRegistry {
    pub fn add(&self, listener: Arc<dyn RobotListener>) {
        self.write().push(listener);
    }

    pub fn remove(&self, listener: &Arc<dyn RobotListener>) {
        self.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn notify_event(&self, event: EventCode) {
        for listener in self.read().iter() {
            listener.on_event(event);
        }
    }

    pub fn notify_response(&self, response: &ResponseMessage, command: &Command) {
        for listener in self.read().iter() {
            listener.on_response(response, command);
        }
    }

    pub fn notify_information(&self, info: &InformationResponse) {
        for listener in self.read().iter() {
            listener.on_information(info);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn RobotListener>>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn RobotListener>>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
