use std::fmt;
use thiserror::Error;

/// Record type a decoder was working on when it failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    DeviceInfo,
    ControllerSnapshot,
    ControllerList,
    DeviceStatus,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::DeviceInfo => write!(f, "device info"),
            RecordKind::ControllerSnapshot => write!(f, "controller snapshot"),
            RecordKind::ControllerList => write!(f, "controller list"),
            RecordKind::DeviceStatus => write!(f, "device status"),
        }
    }
}

/// Errors of the INSEN protocol core
///
/// None of these are fatal. Decode failures are published as events and the
/// line stream keeps flowing; only [`InsenError::TransportUnavailable`] is
/// expected to reach a direct caller as an immediate failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InsenError {
    /// A command was attempted while the link is not ready; nothing was sent
    #[error("Transport unavailable: device not connected")]
    TransportUnavailable,

    /// A classified response failed structural or numeric parsing
    #[error("Malformed {kind} record: {reason}")]
    MalformedRecord { kind: RecordKind, reason: String },

    /// Enveloped line with an unknown tag, tolerated for newer firmware
    #[error("Unrecognized response: {0}")]
    UnrecognizedResponse(String),

    /// The transport reported a failed write
    #[error("Transport write failure: {0}")]
    TransportWriteFailure(String),

    #[error("Invalid poll interval: must be greater than zero")]
    InvalidInterval,

    #[error("Protocol core stopped")]
    CoreStopped,
}

impl InsenError {
    pub(crate) fn malformed(kind: RecordKind, reason: impl Into<String>) -> Self {
        InsenError::MalformedRecord {
            kind,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = InsenError> = core::result::Result<T, E>;
