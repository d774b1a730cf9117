//! Transport boundary of the protocol core
//!
//! The core never touches a device directly. It consumes a [`TransportHandle`]:
//! a stream of [`TransportEvent`]s (ready, line, closed) plus a [`LineWriter`]
//! that hands encoded lines to whoever owns the device and waits for the write
//! result.
//!
//! ```text
//!            TransportEvent (mpsc)
//! Device ──► [Peer] ─────────────────► ProtocolCore
//!        ◄── [Peer] ◄───────────────── LineWriter
//!            WriteRequest + oneshot ack
//! ```
//!
//! [`SerialTransport`] drives a real serial port; [`link`] hands out the bare
//! channel pair for simulators and tests.

pub mod framer;
pub mod serial;

pub use framer::LineFramer;
pub use serial::{SerialSettings, SerialTransport};

use crate::protocol::InsenError;
use std::io;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Events emitted by a transport towards the core
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// Link is open; commands may be sent
    Ready,
    /// One complete line, terminator stripped
    Line(String),
    /// Link is gone; commands are refused until the next `Ready`
    Closed { reason: Option<String> },
}

/// A line to write, with a channel for the write result
#[derive(Debug)]
pub struct WriteRequest {
    pub line: String,
    pub ack: oneshot::Sender<io::Result<()>>,
}

impl WriteRequest {
    /// Report the outcome of the write back to the requester
    pub fn complete(self, result: io::Result<()>) {
        if self.ack.send(result).is_err() {
            debug!("Write requester went away before the ack");
        }
    }
}

/// Errors raised while setting up a transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to open serial port {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Failed to split serial port handle: {0}")]
    Clone(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Write side of a transport, cheap to clone
#[derive(Clone, Debug)]
pub struct LineWriter {
    sender: mpsc::Sender<WriteRequest>,
}

impl LineWriter {
    /// Hand one encoded line to the transport and wait for the result
    pub async fn write_line(&self, line: String) -> Result<(), InsenError> {
        let (ack, ack_rx) = oneshot::channel();
        self.sender
            .send(WriteRequest { line, ack })
            .await
            .map_err(|_| InsenError::TransportWriteFailure("transport writer closed".into()))?;

        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!("Transport write failed: {}", e);
                Err(InsenError::TransportWriteFailure(e.to_string()))
            }
            Err(_) => Err(InsenError::TransportWriteFailure(
                "write dropped without acknowledgement".into(),
            )),
        }
    }
}

/// Core-facing half of a transport link
#[derive(Debug)]
pub struct TransportHandle {
    pub events: mpsc::Receiver<TransportEvent>,
    pub writer: LineWriter,
}

/// Device-facing half of a transport link
#[derive(Debug)]
pub struct TransportPeer {
    events: mpsc::Sender<TransportEvent>,
    writes: mpsc::Receiver<WriteRequest>,
}

impl TransportPeer {
    pub async fn ready(&self) -> bool {
        self.emit(TransportEvent::Ready).await
    }

    pub async fn push_line(&self, line: impl Into<String>) -> bool {
        self.emit(TransportEvent::Line(line.into())).await
    }

    pub async fn close(&self, reason: Option<String>) -> bool {
        self.emit(TransportEvent::Closed { reason }).await
    }

    /// Forward an event to the core; false once the core is gone
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Next write requested by the core
    pub async fn next_write(&mut self) -> Option<WriteRequest> {
        self.writes.recv().await
    }

    pub fn try_next_write(&mut self) -> Option<WriteRequest> {
        self.writes.try_recv().ok()
    }

    pub fn event_sender(&self) -> mpsc::Sender<TransportEvent> {
        self.events.clone()
    }

    pub fn into_parts(self) -> (mpsc::Sender<TransportEvent>, mpsc::Receiver<WriteRequest>) {
        (self.events, self.writes)
    }
}

/// Create a connected handle/peer pair with the given channel capacity
pub fn link(capacity: usize) -> (TransportHandle, TransportPeer) {
    let (event_tx, event_rx) = mpsc::channel(capacity);
    let (write_tx, write_rx) = mpsc::channel(capacity);
    (
        TransportHandle {
            events: event_rx,
            writer: LineWriter { sender: write_tx },
        },
        TransportPeer {
            events: event_tx,
            writes: write_rx,
        },
    )
}
