//! Client Handle - consumer API of the protocol core
//!
//! Spawns the [`LineProcessor`] on a [`TransportHandle`] and exposes reads of
//! the controller store, command sending and the poll driver.
//!
//! ```text
//!                  ┌────────────── InsenClient ──────────────┐
//! TransportEvent ─►│ LineProcessor ─► ControllerStore         │─► snapshot(id)
//!                  │       └────────► broadcast InsenEvent    │─► subscribe()
//! LineWriter ◄─────│ send(Command) / PollSlot ticker          │◄─ start / stop
//!                  └──────────────────────────────────────────┘
//! ```

use super::events::InsenEvent;
use super::line_processor::{LineProcessor, ProcessorStats};
use super::poll_driver::{PollSlot, PollTarget};
use super::store::StoreReader;
use crate::protocol::{Command, ControllerId, ControllerSnapshot, DeviceInfo, InsenError, Result};
use crate::transport::{LineWriter, TransportHandle};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runtime settings of the protocol core
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ClientSettings {
    /// Capacity of the event broadcast; slow subscribers lag beyond this
    pub event_capacity: usize,

    /// Send `INFO` each time the transport reports ready
    pub request_info_on_ready: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            request_info_on_ready: true,
        }
    }
}

pub struct InsenClient {
    writer: LineWriter,
    events: broadcast::Sender<InsenEvent>,
    store: StoreReader,
    device_info: watch::Receiver<Option<DeviceInfo>>,
    link: watch::Receiver<bool>,
    poller: Mutex<Option<PollSlot>>,
    cancel: CancellationToken,
    core: JoinHandle<ProcessorStats>,
}

impl InsenClient {
    /// Spawn the protocol core on the given transport
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(transport: TransportHandle, settings: ClientSettings) -> Self {
        info!("Spawning INSEN client with settings: {:?}", settings);

        let TransportHandle { events: transport_events, writer } = transport;
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));

        let processor =
            LineProcessor::new(events.clone(), writer.clone(), settings.request_info_on_ready);
        let store = processor.store().reader();
        let device_info = processor.device_info();
        let link = processor.link_state();

        let poller = PollSlot::new(writer.clone(), link.clone(), events.clone());

        let cancel = CancellationToken::new();
        let core = tokio::spawn(processor.run(transport_events, cancel.clone()));
        debug!("Line processor task spawned");

        Self {
            writer,
            events,
            store,
            device_info,
            link,
            poller: Mutex::new(Some(poller)),
            cancel,
            core,
        }
    }

    /// New receiver for all events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<InsenEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self, id: ControllerId) -> Option<ControllerSnapshot> {
        self.store.get(id)
    }

    /// All known snapshots ordered by controller id
    pub fn snapshots(&self) -> Vec<ControllerSnapshot> {
        self.store.all()
    }

    /// Cloneable read view, e.g. for a UI task waiting on changes
    pub fn store(&self) -> StoreReader {
        self.store.clone()
    }

    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.device_info.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.link.borrow()
    }

    /// Wait until the transport has reported ready
    pub async fn wait_connected(&self) -> Result<()> {
        let mut link = self.link.clone();
        link.wait_for(|up| *up)
            .await
            .map(|_| ())
            .map_err(|_| InsenError::CoreStopped)
    }

    /// Encode and send one command
    ///
    /// Fails with [`InsenError::TransportUnavailable`] without sending anything
    /// while the link is down.
    pub async fn send(&self, command: Command) -> Result<()> {
        self.ensure_running()?;
        if !self.is_connected() {
            debug!("Refusing {} while link is down", command);
            return Err(InsenError::TransportUnavailable);
        }

        debug!("Sending {}", command);
        self.writer.write_line(command.encode()).await
    }

    pub async fn request_info(&self) -> Result<()> {
        self.send(Command::Info).await
    }

    pub async fn request_status(&self) -> Result<()> {
        self.send(Command::Status).await
    }

    pub async fn list_controllers(&self) -> Result<()> {
        self.send(Command::List).await
    }

    pub async fn request_input(&self, id: ControllerId) -> Result<()> {
        self.send(Command::Get(id)).await
    }

    /// Poll `id` every `interval`, replacing any active polling
    ///
    /// The first `GET` goes out immediately.
    pub async fn start(&self, id: ControllerId, interval: Duration) -> Result<()> {
        self.ensure_running()?;
        if interval.is_zero() {
            return Err(InsenError::InvalidInterval);
        }

        let target = PollTarget {
            controller_id: id,
            interval,
        };

        let mut guard = self.poller.lock().await;
        let slot = guard.take().ok_or(InsenError::CoreStopped)?;
        *guard = Some(slot.start(target).await);
        Ok(())
    }

    /// Stop polling; returns once no further `GET` can be sent
    pub async fn stop(&self) {
        let mut guard = self.poller.lock().await;
        if let Some(slot) = guard.take() {
            *guard = Some(slot.stop().await);
        }
    }

    pub async fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .await
            .as_ref()
            .is_some_and(PollSlot::is_polling)
    }

    /// Active poll target, if any
    pub async fn poll_target(&self) -> Option<PollTarget> {
        self.poller.lock().await.as_ref().and_then(PollSlot::target)
    }

    /// Stop polling and the core task, returning the processor counters
    pub async fn shutdown(self) -> Result<ProcessorStats> {
        info!("Shutting down INSEN client");
        self.stop().await;
        self.poller.lock().await.take();

        self.cancel.cancel();
        match self.core.await {
            Ok(stats) => {
                info!("INSEN client stopped");
                Ok(stats)
            }
            Err(e) => {
                error!("Line processor task failed: {}", e);
                Err(InsenError::CoreStopped)
            }
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.cancel.is_cancelled() || self.core.is_finished() {
            warn!("Protocol core is not running");
            return Err(InsenError::CoreStopped);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::link;

    #[tokio::test]
    async fn test_send_refused_before_ready() {
        let (handle, mut peer) = link(8);
        let client = InsenClient::spawn(handle, ClientSettings::default());

        assert_eq!(
            client.request_status().await,
            Err(InsenError::TransportUnavailable)
        );
        assert!(peer.try_next_write().is_none());

        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let (handle, _peer) = link(8);
        let client = InsenClient::spawn(handle, ClientSettings::default());

        assert_eq!(
            client.start(0, Duration::ZERO).await,
            Err(InsenError::InvalidInterval)
        );
        assert!(!client.is_polling().await);

        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_core_stops_when_transport_drops() {
        let (handle, peer) = link(8);
        let client = InsenClient::spawn(handle, ClientSettings::default());
        let mut store = client.store();

        drop(peer);
        // Store sender is dropped together with the processor
        assert!(!store.changed().await);

        assert_eq!(client.request_info().await, Err(InsenError::CoreStopped));
    }
}
