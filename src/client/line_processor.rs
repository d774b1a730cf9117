//! Line Processor - single owner of inbound protocol state
//!
//! Consumes [`TransportEvent`]s in arrival order, runs each line through the
//! classifier and decoders, and is the only writer of the [`ControllerStore`]
//! and the device info slot. Every outcome is published as an [`InsenEvent`].
//!
//! ```text
//! TransportEvent ──► classify ──► decode ──► store / device info
//!                                   │
//!                                   └──────► broadcast InsenEvent
//! ```
//!
//! Decoding is synchronous; the only suspension point of the loop is waiting
//! for the next transport event.

use super::events::{publish, InsenEvent};
use super::store::ControllerStore;
use crate::protocol::{
    classify, decode_controller_list, decode_device_info, decode_snapshot, decode_status, Command,
    DeviceInfo, InsenError, RawResponse,
};
use crate::transport::{LineWriter, TransportEvent};
use chrono::Local;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Counters kept by the processor, logged on shutdown
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub lines: u64,
    pub ignored: u64,
    pub unrecognized: u64,
    pub decoded: u64,
    pub malformed: u64,
}

pub struct LineProcessor {
    store: ControllerStore,
    device_info: watch::Sender<Option<DeviceInfo>>,
    link: watch::Sender<bool>,
    events: broadcast::Sender<InsenEvent>,
    writer: LineWriter,
    request_info_on_ready: bool,
    stats: ProcessorStats,
}

impl LineProcessor {
    pub fn new(
        events: broadcast::Sender<InsenEvent>,
        writer: LineWriter,
        request_info_on_ready: bool,
    ) -> Self {
        let (device_info, _) = watch::channel(None);
        let (link, _) = watch::channel(false);
        Self {
            store: ControllerStore::new(),
            device_info,
            link,
            events,
            writer,
            request_info_on_ready,
            stats: ProcessorStats::default(),
        }
    }

    pub fn store(&self) -> &ControllerStore {
        &self.store
    }

    pub fn device_info(&self) -> watch::Receiver<Option<DeviceInfo>> {
        self.device_info.subscribe()
    }

    pub fn link_state(&self) -> watch::Receiver<bool> {
        self.link.subscribe()
    }

    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }

    /// Apply one transport event
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Ready => {
                info!("Transport ready");
                self.link.send_replace(true);
                self.publish(InsenEvent::LinkUp);
                if self.request_info_on_ready {
                    self.spawn_info_request();
                }
            }
            TransportEvent::Line(line) => {
                self.handle_line(&line);
            }
            TransportEvent::Closed { reason } => {
                warn!(
                    "Transport closed: {}",
                    reason.as_deref().unwrap_or("no reason given")
                );
                self.link.send_replace(false);
                self.publish(InsenEvent::LinkDown { reason });
            }
        }
    }

    /// Classify, decode and apply one line
    ///
    /// Returns the event that was published, or `None` when the line was not
    /// a response or carried an unknown tag.
    pub fn handle_line(&mut self, line: &str) -> Option<InsenEvent> {
        self.stats.lines += 1;

        let Some(response) = classify(line) else {
            trace!("Ignoring non-protocol line: {:?}", line);
            self.stats.ignored += 1;
            return None;
        };

        let outcome = match response {
            RawResponse::DeviceInfo(remainder) => decode_device_info(remainder).map(|info| {
                info!("Device info: {}", info);
                self.device_info.send_replace(Some(info.clone()));
                InsenEvent::DeviceInfo(info)
            }),
            RawResponse::ControllerSnapshot(remainder) => {
                decode_snapshot(remainder, Local::now()).map(|snapshot| {
                    debug!("Decoded snapshot: {}", snapshot);
                    self.store.apply(snapshot.clone());
                    InsenEvent::Snapshot(snapshot)
                })
            }
            RawResponse::ControllerList(remainder) => {
                let list = decode_controller_list(remainder);
                info!("Connected controllers: {:?}", list.ids);
                Ok(InsenEvent::ControllerList(list))
            }
            RawResponse::DeviceStatus(remainder) => decode_status(remainder).map(|status| {
                info!("Device status: {}", status.raw);
                InsenEvent::Status(status)
            }),
            RawResponse::Unrecognized(remainder) => {
                trace!(
                    "{}",
                    InsenError::UnrecognizedResponse(remainder.to_string())
                );
                self.stats.unrecognized += 1;
                return None;
            }
        };

        let event = match outcome {
            Ok(event) => {
                self.stats.decoded += 1;
                event
            }
            Err(e) => {
                warn!("Dropping line {:?}: {}", line, e);
                self.stats.malformed += 1;
                InsenEvent::Error(e)
            }
        };

        self.publish(event.clone());
        Some(event)
    }

    /// Process transport events until the stream ends or `cancel` fires
    pub async fn run(
        mut self,
        mut transport_events: mpsc::Receiver<TransportEvent>,
        cancel: CancellationToken,
    ) -> ProcessorStats {
        info!("Line processor started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown requested, stopping line processor");
                    break;
                }
                event = transport_events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        warn!("Transport event stream ended");
                        if *self.link.borrow() {
                            self.link.send_replace(false);
                            self.publish(InsenEvent::LinkDown {
                                reason: Some("transport dropped".into()),
                            });
                        }
                        break;
                    }
                }
            }
        }

        self.link.send_replace(false);
        info!(
            "Line processor stats: {} lines, {} decoded, {} malformed, {} ignored, {} unrecognized",
            self.stats.lines,
            self.stats.decoded,
            self.stats.malformed,
            self.stats.ignored,
            self.stats.unrecognized
        );
        self.stats
    }

    fn publish(&self, event: InsenEvent) {
        publish(&self.events, event);
    }

    // The write is awaited off the loop so inbound lines keep flowing
    fn spawn_info_request(&self) {
        let writer = self.writer.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            debug!("Requesting device info after link came up");
            if let Err(e) = writer.write_line(Command::Info.encode()).await {
                error!("Initial INFO request failed: {}", e);
                publish(&events, InsenEvent::Error(e));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ButtonMask, RecordKind, StickAxes, TriggerPair};
    use crate::transport::link;

    fn processor() -> (LineProcessor, broadcast::Receiver<InsenEvent>) {
        let (events, rx) = broadcast::channel(64);
        let (handle, _peer) = link(8);
        (LineProcessor::new(events, handle.writer, false), rx)
    }

    #[tokio::test]
    async fn test_snapshot_line_updates_store() {
        let (mut processor, mut rx) = processor();

        let event = processor.handle_line(">>> INPUT|0|10,-5|0,0|0,255|03|1|87");
        assert!(matches!(event, Some(InsenEvent::Snapshot(_))));

        let stored = processor.store().get(0).unwrap();
        assert_eq!(stored.left_stick, StickAxes { x: 10, y: -5 });
        assert_eq!(
            stored.triggers,
            TriggerPair {
                left: 0,
                right: 255
            }
        );
        assert_eq!(stored.buttons, ButtonMask(0x03));

        match rx.recv().await.unwrap() {
            InsenEvent::Snapshot(published) => assert_eq!(published, stored),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_protocol_lines_change_nothing() {
        let (mut processor, mut rx) = processor();
        processor.handle_line(">>> INPUT|0|1,1|1,1|1,1|01|0|50");
        let before = processor.store().get(0);
        let _ = rx.recv().await;

        for line in ["INPUT|0|9,9|9,9|9,9|FF|0|10", "boot ok", ""] {
            assert_eq!(processor.handle_line(line), None);
        }

        assert_eq!(processor.store().get(0), before);
        assert!(rx.try_recv().is_err());
        assert_eq!(processor.stats().ignored, 3);
    }

    #[tokio::test]
    async fn test_short_frame_keeps_previous_snapshot() {
        let (mut processor, _rx) = processor();
        processor.handle_line(">>> INPUT|0|1,1|1,1|1,1|01|0|50");
        let before = processor.store().get(0);

        let event = processor.handle_line(">>> INPUT|0|2,2|2,2|2,2|02|0");
        assert!(matches!(
            event,
            Some(InsenEvent::Error(InsenError::MalformedRecord {
                kind: RecordKind::ControllerSnapshot,
                ..
            }))
        ));
        assert_eq!(processor.store().get(0), before);
        assert_eq!(processor.stats().malformed, 1);
    }

    #[tokio::test]
    async fn test_unrecognized_tag_is_silent() {
        let (mut processor, mut rx) = processor();
        assert_eq!(processor.handle_line(">>> RUMBLE|0|100"), None);
        assert!(rx.try_recv().is_err());
        assert_eq!(processor.stats().unrecognized, 1);
    }

    #[tokio::test]
    async fn test_device_info_replaces_previous() {
        let (mut processor, _rx) = processor();
        let info = processor.device_info();

        processor.handle_line(">>> INSEN_FW_V2.1|BUILD_104|CONTROLLERS_2|IGNORED|RUNNING");
        assert_eq!(
            info.borrow().as_ref().map(|i| i.firmware_version.clone()),
            Some("2.1".to_string())
        );

        processor.handle_line(">>> INSEN_FW_V2.2|BUILD_110|CONTROLLERS_1|IGNORED|IDLE");
        let current = info.borrow().clone().unwrap();
        assert_eq!(current.firmware_version, "2.2");
        assert_eq!(current.controller_count, 1);
        assert_eq!(current.status, "IDLE");

        processor.handle_line(">>> INSEN_FW_V9|BUILD_1");
        assert_eq!(info.borrow().as_ref().map(|i| i.build_id.as_str()), Some("110"));
    }

    #[tokio::test]
    async fn test_controller_list_is_reported_not_stored() {
        let (mut processor, _rx) = processor();
        match processor.handle_line(">>> CONTROLLERS|0_XBOX_ONE|1_PS4") {
            Some(InsenEvent::ControllerList(list)) => {
                assert_eq!(list.ids, vec!["0_XBOX_ONE", "1_PS4"]);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(processor.store().is_empty());
    }

    #[tokio::test]
    async fn test_link_state_follows_transport() {
        let (mut processor, mut rx) = processor();
        let link = processor.link_state();

        processor.handle_event(TransportEvent::Ready);
        assert!(*link.borrow());
        assert!(matches!(rx.recv().await.unwrap(), InsenEvent::LinkUp));

        processor.handle_event(TransportEvent::Closed {
            reason: Some("unplugged".into()),
        });
        assert!(!*link.borrow());
        assert!(matches!(
            rx.recv().await.unwrap(),
            InsenEvent::LinkDown { reason: Some(_) }
        ));
    }
}
