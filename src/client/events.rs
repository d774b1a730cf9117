use crate::protocol::{ControllerList, ControllerSnapshot, DeviceInfo, DeviceStatus, InsenError};
use tokio::sync::broadcast;
use tracing::trace;

/// Notifications published to every subscriber of an [`InsenClient`](super::InsenClient)
#[derive(Clone, Debug, PartialEq)]
pub enum InsenEvent {
    /// A snapshot was decoded and stored
    Snapshot(ControllerSnapshot),
    /// Device info was decoded and replaced the previous one
    DeviceInfo(DeviceInfo),
    /// Controller enumeration; not stored
    ControllerList(ControllerList),
    Status(DeviceStatus),
    LinkUp,
    LinkDown { reason: Option<String> },
    /// Non-fatal decode or transport failure
    Error(InsenError),
}

impl InsenEvent {
    pub fn as_snapshot(&self) -> Option<&ControllerSnapshot> {
        match self {
            InsenEvent::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, InsenEvent::Error(_))
    }
}

/// Send `event` to every subscriber; having none is not an error
pub(crate) fn publish(events: &broadcast::Sender<InsenEvent>, event: InsenEvent) -> usize {
    match events.send(event) {
        Ok(receivers) => receivers,
        Err(broadcast::error::SendError(event)) => {
            trace!("No subscribers for {:?}", event);
            0
        }
    }
}
