use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use url::Url;
use uuid::Uuid;

use crate::config::RealtimeConfig;
use crate::error::{RealtimeError, Result};
use crate::metrics::{
    CONNECT_ATTEMPTS_TOTAL, FRAMES_RECEIVED_TOTAL, FRAMES_SENT_TOTAL, OUTBOUND_DROPPED_TOTAL,
    RECONNECT_ATTEMPTS_TOTAL, RECONNECT_GIVE_UPS_TOTAL,
};
use crate::protocol::{events, Frame};
use crate::reconnect::ReconnectPolicy;
use crate::transport::{Connector, DisconnectReason, Link, LinkEvent};

use super::state::{ConnectionState, Shared};

/// Client-side handle to one running session driver
pub(crate) struct SessionHandle {
    pub id: Uuid,
    pub generation: u64,
    pub outbound: mpsc::Sender<Frame>,
    shutdown: Option<oneshot::Sender<()>>,
    _task: JoinHandle<()>,
}

impl SessionHandle {
    /// Ask the driver to close its link and exit
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Everything a driver needs, fixed for the lifetime of the session
pub(crate) struct SessionParams {
    pub shared: Arc<Shared>,
    pub connector: Arc<dyn Connector>,
    pub endpoint: Url,
    pub config: RealtimeConfig,
    pub token: String,
    pub generation: u64,
}

/// Spawn the driver for a new session. `ready` settles once: with the
/// outcome of the first handshake, or is dropped if the session is shut
/// down before that.
pub(crate) fn spawn(params: SessionParams, ready: oneshot::Sender<Result<()>>) -> SessionHandle {
    let id = Uuid::new_v4();
    let generation = params.generation;
    let (outbound_tx, outbound_rx) = mpsc::channel(params.config.outbound_buffer.max(1));
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let driver = SessionDriver {
        id,
        policy: ReconnectPolicy::with_config(params.config.reconnect()),
        params,
        outbound: outbound_rx,
        shutdown: shutdown_rx,
        ready: Some(ready),
    };
    let task = tokio::spawn(driver.run());

    SessionHandle {
        id,
        generation,
        outbound: outbound_tx,
        shutdown: Some(shutdown_tx),
        _task: task,
    }
}

/// How a live link ended
enum Exit {
    Shutdown,
    Lost(DisconnectReason),
}

struct SessionDriver {
    id: Uuid,
    params: SessionParams,
    policy: ReconnectPolicy,
    outbound: mpsc::Receiver<Frame>,
    shutdown: oneshot::Receiver<()>,
    ready: Option<oneshot::Sender<Result<()>>>,
}

impl SessionDriver {
    async fn run(mut self) {
        tracing::info!(
            session_id = %self.id,
            endpoint = %self.params.endpoint,
            "Realtime session started"
        );

        loop {
            let mut link = match self.dial().await {
                Some(Ok(link)) => link,
                Some(Err(e)) => {
                    CONNECT_ATTEMPTS_TOTAL.with_label_values(&[e.code()]).inc();
                    tracing::warn!(
                        session_id = %self.id,
                        attempt = self.policy.attempt(),
                        error = %e,
                        "Realtime connection error"
                    );
                    if let Some(ready) = self.ready.take() {
                        let _ = ready.send(Err(e));
                    }
                    if self.wait_before_retry().await {
                        continue;
                    }
                    break;
                }
                None => break,
            };

            CONNECT_ATTEMPTS_TOTAL.with_label_values(&["OK"]).inc();
            self.policy.reset();

            if !self.on_connected(link.as_mut()).await {
                link.close().await;
                break;
            }

            match self.pump(link.as_mut()).await {
                Exit::Shutdown => {
                    self.flush(link.as_mut()).await;
                    link.close().await;
                    break;
                }
                Exit::Lost(reason) => {
                    link.close().await;
                    if !self.should_reconnect(&reason) {
                        tracing::info!(
                            session_id = %self.id,
                            reason = %reason,
                            "Realtime connection closed"
                        );
                        self.params.shared.retire(self.params.generation);
                        break;
                    }
                    tracing::warn!(
                        session_id = %self.id,
                        reason = %reason,
                        "Realtime connection lost"
                    );
                    if !self.wait_before_retry().await {
                        break;
                    }
                }
            }
        }

        tracing::debug!(session_id = %self.id, "Realtime session driver stopped");
    }

    /// One handshake, bounded by the connection timeout.
    /// `None` means the session was shut down meanwhile.
    async fn dial(&mut self) -> Option<Result<Box<dyn Link>>> {
        let params = &self.params;
        if !params.shared.publish(params.generation, ConnectionState::Connecting) {
            return None;
        }

        let timeout = params.config.connection_timeout();
        let open = params.connector.open(&params.endpoint, &params.token);

        tokio::select! {
            _ = &mut self.shutdown => None,
            result = time::timeout(timeout, open) => Some(match result {
                Ok(result) => result,
                Err(_) => Err(RealtimeError::ConnectTimeout(timeout)),
            }),
        }
    }

    /// Replay tracked rooms, then announce the connection.
    /// Returns false if the session was superseded during the replay.
    async fn on_connected(&mut self, link: &mut dyn Link) -> bool {
        let shared = self.params.shared.clone();

        // Frames queued before the previous link died are not carried over
        let mut stale = 0u64;
        while self.outbound.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            OUTBOUND_DROPPED_TOTAL.inc_by(stale);
            tracing::debug!(session_id = %self.id, dropped = stale, "Discarded stale outbound frames");
        }

        let rooms = shared.joined_rooms();
        for room in &rooms {
            if let Err(e) = link.send(room.join_frame()).await {
                tracing::warn!(session_id = %self.id, room = %room, error = %e, "Failed to rejoin room");
            } else {
                FRAMES_SENT_TOTAL.inc();
            }
        }

        if !shared.publish(self.params.generation, ConnectionState::Connected) {
            return false;
        }

        tracing::info!(
            session_id = %self.id,
            rejoined_rooms = rooms.len(),
            "Realtime connection established"
        );

        if let Some(ready) = self.ready.take() {
            let _ = ready.send(Ok(()));
        }
        true
    }

    /// Move frames both ways until the link ends or the session is shut down
    async fn pump(&mut self, link: &mut dyn Link) -> Exit {
        let ping_interval = self.params.config.ping_interval();
        let heartbeat = !ping_interval.is_zero();
        let silence_limit = ping_interval + self.params.config.ping_timeout();

        let mut ticker = time::interval(ping_interval.max(Duration::from_millis(1)));
        // Skip immediate first tick
        ticker.tick().await;
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                _ = &mut self.shutdown => return Exit::Shutdown,
                event = link.recv() => {
                    last_seen = Instant::now();
                    match event {
                        LinkEvent::Frame(frame) => self.handle_inbound(link, frame).await,
                        LinkEvent::Alive => {}
                        LinkEvent::Closed(reason) => return Exit::Lost(reason),
                    }
                }
                Some(frame) = self.outbound.recv() => {
                    let event = frame.event.clone();
                    if let Err(e) = link.send(frame).await {
                        tracing::warn!(session_id = %self.id, event = %event, error = %e, "Send failed");
                        return Exit::Lost(DisconnectReason::TransportError(e.to_string()));
                    }
                    FRAMES_SENT_TOTAL.inc();
                }
                _ = ticker.tick(), if heartbeat => {
                    if last_seen.elapsed() > silence_limit {
                        return Exit::Lost(DisconnectReason::PingTimeout);
                    }
                    if let Err(e) = link.send(Frame::ping()).await {
                        return Exit::Lost(DisconnectReason::TransportError(e.to_string()));
                    }
                }
            }
        }
    }

    /// Send whatever was queued before the shutdown request
    async fn flush(&mut self, link: &mut dyn Link) {
        while let Ok(frame) = self.outbound.try_recv() {
            if let Err(e) = link.send(frame).await {
                tracing::debug!(session_id = %self.id, error = %e, "Flush on shutdown failed");
                break;
            }
            FRAMES_SENT_TOTAL.inc();
        }
    }

    async fn handle_inbound(&mut self, link: &mut dyn Link, frame: Frame) {
        FRAMES_RECEIVED_TOTAL.inc();

        if frame.is_heartbeat() {
            if frame.event == events::PING {
                if let Err(e) = link.send(Frame::new(events::PONG, None)).await {
                    tracing::debug!(session_id = %self.id, error = %e, "Failed to answer ping");
                }
            }
            return;
        }

        let data = frame.data.unwrap_or(Value::Null);
        let handled = self.params.shared.listeners.dispatch(&frame.event, &data);
        tracing::trace!(
            session_id = %self.id,
            event = %frame.event,
            listeners = handled,
            "Dispatched event"
        );
    }

    fn should_reconnect(&self, reason: &DisconnectReason) -> bool {
        match reason {
            DisconnectReason::ServerDisconnect => true,
            DisconnectReason::ClientDisconnect => false,
            other => other.is_transport_loss() && self.params.config.reconnect_on_transport_loss,
        }
    }

    /// Schedule the next attempt. Returns false when the driver should stop,
    /// either because retries are exhausted or the session was shut down.
    async fn wait_before_retry(&mut self) -> bool {
        let Some(delay) = self.policy.next_delay() else {
            RECONNECT_GIVE_UPS_TOTAL.inc();
            tracing::error!(
                session_id = %self.id,
                attempts = self.policy.attempt(),
                "Giving up on realtime connection after max reconnect attempts"
            );
            self.params.shared.retire(self.params.generation);
            return false;
        };

        let attempt = self.policy.attempt();
        let state = ConnectionState::Reconnecting { attempt, delay };
        if !self.params.shared.publish(self.params.generation, state) {
            return false;
        }
        RECONNECT_ATTEMPTS_TOTAL.inc();

        tracing::info!(
            session_id = %self.id,
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        tokio::select! {
            _ = &mut self.shutdown => false,
            _ = time::sleep(delay) => true,
        }
    }
}
