//! Poll Driver - periodic `GET <id>` requests
//!
//! Two states, enforced at compile time with statum:
//!
//! ```text
//!          start(target)
//!   Idle ───────────────► Polling ──┐
//!    ▲                       │      │ start(target): stop, then start again
//!    └───────── stop() ──────┘ ◄────┘
//! ```
//!
//! While polling, a ticker task sends `GET <id>` immediately and then once per
//! interval. Each send runs in its own task, so a slow or unacknowledged write
//! never delays the next tick; a write not acknowledged within
//! [`WRITE_ACK_TIMEOUT`] is reported as a failure. The ticker only writes to
//! the transport; decoded answers arrive through the line processor like any
//! other line. A failed send is published as an error event and the next tick
//! still fires.

use super::events::{publish, InsenEvent};
use crate::protocol::{Command, ControllerId, InsenError};
use crate::transport::LineWriter;
use statum::{machine, state};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest wait for the transport to acknowledge one poll request
pub const WRITE_ACK_TIMEOUT: Duration = Duration::from_millis(1000);

/// What to poll and how often
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollTarget {
    pub controller_id: ControllerId,
    pub interval: Duration,
}

#[state]
#[derive(Debug, Clone)]
pub enum PollState {
    Idle,
    Polling(PollTarget),
}

/// Running ticker task and its stop signal
#[derive(Debug)]
pub struct Ticker {
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

#[machine]
#[derive(Debug)]
pub struct PollDriver<S: PollState> {
    // Shared write path to the transport
    writer: LineWriter,

    // Ticks are refused while the link is down
    link: watch::Receiver<bool>,

    // Where send failures are reported
    events: broadcast::Sender<InsenEvent>,

    // Only set while Polling
    ticker: Option<Ticker>,
}

impl PollDriver<Idle> {
    pub fn create(
        writer: LineWriter,
        link: watch::Receiver<bool>,
        events: broadcast::Sender<InsenEvent>,
    ) -> Self {
        debug!("Creating idle poll driver");
        Self::new(writer, link, events, None)
    }

    /// Spawn the ticker and transition to Polling
    pub fn start(mut self, target: PollTarget) -> PollDriver<Polling> {
        info!(
            "Polling controller {} every {} ms",
            target.controller_id,
            target.interval.as_millis()
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_ticker(
            target,
            self.writer.clone(),
            self.link.clone(),
            self.events.clone(),
            cancel.clone(),
        ));
        self.ticker = Some(Ticker { task, cancel });

        self.transition_with(target)
    }
}

impl PollDriver<Polling> {
    pub fn target(&self) -> Option<&PollTarget> {
        self.get_state_data()
    }

    /// Stop the ticker and transition to Idle
    ///
    /// Returns only after the ticker and every send it started are gone, so no
    /// `GET` can reach the transport afterwards. A write the transport already
    /// accepted is not waited for.
    pub async fn stop(mut self) -> PollDriver<Idle> {
        if let Some(Ticker { task, cancel }) = self.ticker.take() {
            cancel.cancel();
            if let Err(e) = task.await {
                warn!("Poll ticker ended abnormally: {}", e);
            }
        }

        info!("Polling stopped");
        self.transition()
    }
}

/// Runtime holder for a [`PollDriver`] in either state
#[derive(Debug)]
pub enum PollSlot {
    Idle(PollDriver<Idle>),
    Polling(PollDriver<Polling>),
}

impl PollSlot {
    pub fn new(
        writer: LineWriter,
        link: watch::Receiver<bool>,
        events: broadcast::Sender<InsenEvent>,
    ) -> Self {
        PollSlot::Idle(PollDriver::create(writer, link, events))
    }

    /// Start polling; an active ticker is stopped first
    pub async fn start(self, target: PollTarget) -> Self {
        match self {
            PollSlot::Idle(driver) => PollSlot::Polling(driver.start(target)),
            PollSlot::Polling(driver) => {
                debug!("Restarting poll driver with {:?}", target);
                PollSlot::Polling(driver.stop().await.start(target))
            }
        }
    }

    /// Stop polling; a no-op while idle
    pub async fn stop(self) -> Self {
        match self {
            PollSlot::Idle(driver) => {
                debug!("Stop requested while idle");
                PollSlot::Idle(driver)
            }
            PollSlot::Polling(driver) => PollSlot::Idle(driver.stop().await),
        }
    }

    pub fn target(&self) -> Option<PollTarget> {
        match self {
            PollSlot::Idle(_) => None,
            PollSlot::Polling(driver) => driver.target().copied(),
        }
    }

    pub fn is_polling(&self) -> bool {
        matches!(self, PollSlot::Polling(_))
    }
}

async fn run_ticker(
    target: PollTarget,
    writer: LineWriter,
    link: watch::Receiver<bool>,
    events: broadcast::Sender<InsenEvent>,
    cancel: CancellationToken,
) {
    let line = Command::Get(target.controller_id).encode();
    let mut interval = tokio::time::interval(target.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut sends = JoinSet::new();
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(result) = sends.join_next(), if !sends.is_empty() => {
                if let Err(e) = result {
                    warn!("Poll send task failed: {}", e);
                }
            }
            _ = interval.tick() => {
                ticks += 1;
                if !*link.borrow() {
                    debug!(
                        "Poll tick {} for controller {} while link is down",
                        ticks, target.controller_id
                    );
                    publish(&events, InsenEvent::Error(InsenError::TransportUnavailable));
                    continue;
                }

                sends.spawn(send_poll(
                    writer.clone(),
                    line.clone(),
                    events.clone(),
                ));
            }
        }
    }

    debug!(
        "Poll ticker for controller {} stopping after {} ticks, {} sends in flight",
        target.controller_id,
        ticks,
        sends.len()
    );
    sends.shutdown().await;
}

async fn send_poll(writer: LineWriter, line: String, events: broadcast::Sender<InsenEvent>) {
    let error = match tokio::time::timeout(WRITE_ACK_TIMEOUT, writer.write_line(line)).await {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e,
        Err(_) => InsenError::TransportWriteFailure(format!(
            "no acknowledgement within {} ms",
            WRITE_ACK_TIMEOUT.as_millis()
        )),
    };

    debug!("Poll request failed: {}", error);
    publish(&events, InsenEvent::Error(error));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::link;

    fn target(ms: u64) -> PollTarget {
        PollTarget {
            controller_id: 1,
            interval: Duration::from_millis(ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_sends_immediately() {
        let (handle, mut peer) = link(8);
        let (events, _rx) = broadcast::channel(8);
        let (_link_tx, link_rx) = watch::channel(true);

        let started = tokio::time::Instant::now();
        let slot = PollSlot::new(handle.writer, link_rx, events)
            .start(target(50))
            .await;
        assert_eq!(slot.target(), Some(target(50)));

        let request = peer.next_write().await.unwrap();
        assert_eq!(request.line, "GET 1\r\n");
        assert_eq!(started.elapsed(), Duration::ZERO);
        request.complete(Ok(()));

        let slot = slot.stop().await;
        assert!(!slot.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_while_link_down_report_errors() {
        let (handle, mut peer) = link(8);
        let (events, mut rx) = broadcast::channel(8);
        let (_link_tx, link_rx) = watch::channel(false);

        let slot = PollSlot::new(handle.writer, link_rx, events)
            .start(target(10))
            .await;

        assert_eq!(
            rx.recv().await.unwrap(),
            InsenEvent::Error(InsenError::TransportUnavailable)
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            InsenEvent::Error(InsenError::TransportUnavailable)
        );
        assert!(peer.try_next_write().is_none());

        slot.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_does_not_stop_polling() {
        let (handle, mut peer) = link(8);
        let (events, mut rx) = broadcast::channel(8);
        let (_link_tx, link_rx) = watch::channel(true);

        let slot = PollSlot::new(handle.writer, link_rx, events)
            .start(target(10))
            .await;

        let first = peer.next_write().await.unwrap();
        first.complete(Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "device busy",
        )));
        assert!(matches!(
            rx.recv().await.unwrap(),
            InsenEvent::Error(InsenError::TransportWriteFailure(_))
        ));

        let second = peer.next_write().await.unwrap();
        assert_eq!(second.line, "GET 1\r\n");
        second.complete(Ok(()));

        let slot = slot.stop().await;
        let slot = slot.stop().await;
        assert!(!slot.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_write_does_not_delay_ticks() {
        let (handle, mut peer) = link(64);
        let (events, mut rx) = broadcast::channel(64);
        let (_link_tx, link_rx) = watch::channel(true);

        let started = tokio::time::Instant::now();
        let slot = PollSlot::new(handle.writer, link_rx, events)
            .start(target(16))
            .await;

        // Held without an ack for the rest of the test
        let stalled = peer.next_write().await.unwrap();
        assert_eq!(stalled.line, "GET 1\r\n");

        for tick in 1..=5u32 {
            let request = peer.next_write().await.unwrap();
            assert_eq!(request.line, "GET 1\r\n");
            assert_eq!(started.elapsed(), Duration::from_millis(16) * tick);
            request.complete(Ok(()));
        }
        assert!(rx.try_recv().is_err());

        match rx.recv().await.unwrap() {
            InsenEvent::Error(InsenError::TransportWriteFailure(reason)) => {
                assert!(reason.contains("acknowledgement"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(started.elapsed() >= WRITE_ACK_TIMEOUT);

        drop(stalled);
        slot.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_sends() {
        let (handle, mut peer) = link(64);
        let (events, _rx) = broadcast::channel(64);
        let (_link_tx, link_rx) = watch::channel(true);

        let slot = PollSlot::new(handle.writer, link_rx, events)
            .start(target(10))
            .await;
        let _stalled = peer.next_write().await.unwrap();

        let slot = slot.stop().await;
        assert!(!slot.is_polling());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(peer.try_next_write().is_none());
    }
}
