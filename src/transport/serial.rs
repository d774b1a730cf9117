//! Serial port transport for the INSEN bridge.
//!
//! The bridge enumerates as a USB CDC serial device running 8N1 without flow
//! control. `serialport` is blocking, so the port is split into a reader thread
//! (bytes → [`LineFramer`] → [`TransportEvent::Line`]) and a writer thread
//! (executes [`WriteRequest`]s and acks them).

use super::{link, LineFramer, TransportError, TransportEvent, TransportHandle, WriteRequest};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const READ_BUFFER_SIZE: usize = 1024;
const CHANNEL_CAPACITY: usize = 256;

#[cfg(windows)]
const DEFAULT_PORT: &str = "COM3";
#[cfg(not(windows))]
const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Serial link settings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct SerialSettings {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout; also bounds how quickly the reader notices shutdown
    pub timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: 115_200,
            timeout_ms: 1000,
        }
    }
}

/// Owner of the serial reader and writer threads
pub struct SerialTransport {
    port_name: String,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Open the port and start the I/O threads
    ///
    /// The returned handle sees [`TransportEvent::Ready`] as its first event.
    pub fn open(settings: &SerialSettings) -> Result<(Self, TransportHandle), TransportError> {
        info!(
            "Opening serial port {} at {} baud",
            settings.port, settings.baud_rate
        );

        let read_port = serialport::new(&settings.port, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .flow_control(FlowControl::None)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(settings.timeout_ms))
            .open()
            .map_err(|e| TransportError::Open {
                port: settings.port.clone(),
                reason: e.to_string(),
            })?;

        let write_port = read_port
            .try_clone()
            .map_err(|e| TransportError::Clone(e.to_string()))?;

        let (handle, peer) = link(CHANNEL_CAPACITY);
        let (event_tx, write_rx) = peer.into_parts();

        let port_name = settings.port.clone();
        let reader = thread::Builder::new()
            .name("insen-serial-reader".into())
            .spawn({
                let port_name = port_name.clone();
                move || run_reader(port_name, read_port, event_tx)
            })?;
        let writer = thread::Builder::new()
            .name("insen-serial-writer".into())
            .spawn(move || run_writer(write_port, write_rx))?;

        info!("Serial transport started on {}", port_name);
        Ok((
            Self {
                port_name,
                reader: Some(reader),
                writer: Some(writer),
            },
            handle,
        ))
    }

    /// Names of the serial ports visible on this host
    pub fn available_ports() -> Vec<String> {
        match serialport::available_ports() {
            Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
            Err(e) => {
                warn!("Unable to enumerate serial ports: {}", e);
                Vec::new()
            }
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Wait for both I/O threads to finish
    ///
    /// The threads exit once the core drops its [`TransportHandle`]; the
    /// reader notices within one read timeout.
    pub fn join(mut self) {
        for (name, handle) in [("reader", self.reader.take()), ("writer", self.writer.take())] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    error!("Serial {} thread panicked", name);
                }
            }
        }
        debug!("Serial transport on {} joined", self.port_name);
    }
}

fn run_reader<R: Read>(port_name: String, mut port: R, events: mpsc::Sender<TransportEvent>) {
    if events.blocking_send(TransportEvent::Ready).is_err() {
        return;
    }

    let mut framer = LineFramer::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        if events.is_closed() {
            debug!("Core dropped, stopping serial reader for {}", port_name);
            return;
        }

        match port.read(&mut buffer) {
            // Read timeouts surface as errors, so zero bytes means the device is gone
            Ok(0) => {
                warn!("Serial port {} reached end of stream", port_name);
                let _ = events.blocking_send(TransportEvent::Closed {
                    reason: Some("end of stream".into()),
                });
                return;
            }
            Ok(n) => {
                for line in framer.feed(&buffer[..n]) {
                    debug!("Serial line: {}", line);
                    if events.blocking_send(TransportEvent::Line(line)).is_err() {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("Serial read on {} failed: {}", port_name, e);
                let _ = events.blocking_send(TransportEvent::Closed {
                    reason: Some(e.to_string()),
                });
                return;
            }
        }
    }
}

fn run_writer(mut port: Box<dyn SerialPort>, mut writes: mpsc::Receiver<WriteRequest>) {
    while let Some(request) = writes.blocking_recv() {
        let result = port
            .write_all(request.line.as_bytes())
            .and_then(|_| port.flush());
        if let Err(e) = &result {
            error!("Serial write of {:?} failed: {}", request.line.trim_end(), e);
        }
        request.complete(result);
    }
    debug!("Write channel closed, stopping serial writer");
}
