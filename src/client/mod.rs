//! Realtime connection manager.
//!
//! [`RealtimeClient`] owns at most one live session to the backend and
//! exposes room joins, typed event registration and fire-and-forget
//! emitters on top of it. It is an ordinary value: build it once at
//! startup and hand clones to whatever needs it.
//!
//! - Joins and emits while not connected are dropped, never queued.
//! - Rooms joined while connected are replayed after every reconnect.
//! - Listeners belong to the client and survive reconnects.
//! - Named helpers (`on_message`, ...) replace their previous handler;
//!   [`RealtimeClient::on`] always adds.

mod listeners;
mod session;
mod state;

pub use listeners::{Handler, ListenerId};
pub use state::ConnectionState;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use url::Url;

use crate::config::RealtimeConfig;
use crate::error::{RealtimeError, Result};
use crate::metrics::OUTBOUND_DROPPED_TOTAL;
use crate::protocol::{
    events, AiEvent, ChatMessage, Frame, NotificationPayload, OutboundMessage, PresencePayload,
    Room, TaskDeleted, TaskPayload, TypingIndicator,
};
use crate::transport::{Connector, WsConnector};

use session::{SessionHandle, SessionParams};
use state::Shared;

/// Cloneable handle to the realtime connection manager
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: RealtimeConfig,
    endpoint: Url,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    session: Mutex<Option<SessionHandle>>,
    next_generation: AtomicU64,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let session = self.session.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = session.take() {
            session.shutdown();
        }
    }
}

impl RealtimeClient {
    /// Client speaking WebSocket to the configured endpoint
    pub fn new(config: RealtimeConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(WsConnector::new()))
    }

    /// Client using a custom transport
    pub fn with_connector(config: RealtimeConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let endpoint = config.endpoint()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                endpoint,
                connector,
                shared: Arc::new(Shared::new()),
                session: Mutex::new(None),
                next_generation: AtomicU64::new(1),
            }),
        })
    }

    fn session(&self) -> MutexGuard<'_, Option<SessionHandle>> {
        self.inner.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn shared(&self) -> &Shared {
        &self.inner.shared
    }

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the connection, presenting `token` as the credential.
    ///
    /// Resolves once the first handshake of this call succeeds. On failure the
    /// error is returned here and the bounded reconnect policy keeps trying in
    /// the background; later outcomes are only visible through
    /// [`watch_state`](Self::watch_state).
    ///
    /// Already connected: returns `Ok(())` without touching the session.
    /// Connecting or reconnecting: the pending session is torn down (its caller
    /// gets [`RealtimeError::Aborted`]) and a fresh one is started.
    pub async fn connect(&self, token: &str) -> Result<()> {
        let ready = {
            let mut session = self.session();

            if session.is_some() && self.is_connected() {
                tracing::debug!("connect() called while connected, ignoring");
                return Ok(());
            }

            if let Some(old) = session.take() {
                tracing::info!(session_id = %old.id, "Replacing pending realtime session");
                old.shutdown();
            }

            let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
            let (ready_tx, ready_rx) = oneshot::channel();

            self.inner.shared.activate(generation);
            *session = Some(session::spawn(
                SessionParams {
                    shared: self.inner.shared.clone(),
                    connector: self.inner.connector.clone(),
                    endpoint: self.inner.endpoint.clone(),
                    config: self.inner.config.clone(),
                    token: token.to_string(),
                    generation,
                },
                ready_tx,
            ));

            ready_rx
        };

        match ready.await {
            Ok(result) => result,
            Err(_) => Err(RealtimeError::Aborted),
        }
    }

    /// Close the connection and stop reconnecting. Idempotent.
    ///
    /// The state is `Disconnected` as soon as this returns. Tracked rooms are
    /// forgotten; listeners are kept.
    pub fn disconnect(&self) {
        let mut session = self.session();
        if let Some(old) = session.take() {
            tracing::info!(session_id = %old.id, "Disconnecting realtime session");
            old.shutdown();
        }
        self.shared().deactivate();
        self.shared().clear_rooms();
    }

    pub fn is_connected(&self) -> bool {
        self.shared().state().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared().state()
    }

    /// Observe every state change, across all reconnects
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared().subscribe()
    }

    /// Attempts made since the last successful connection
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared().attempts()
    }

    // ========================================================================
    // Rooms
    // ========================================================================

    /// Join `room`. A no-op returning false when not connected.
    pub fn join_room(&self, room: Room) -> bool {
        let frame = room.join_frame();
        if !self.send_frame(frame) {
            tracing::debug!(room = %room, "Not connected, join skipped");
            return false;
        }
        tracing::debug!(room = %room, "Joined room");
        self.shared().record_room(room);
        true
    }

    pub fn join_user_room(&self, user_id: &str) -> bool {
        self.join_room(Room::User(user_id.to_string()))
    }

    pub fn join_team_room(&self, team_id: &str) -> bool {
        self.join_room(Room::Team(team_id.to_string()))
    }

    pub fn join_notifications_room(&self, user_id: &str) -> bool {
        self.join_room(Room::Notifications(user_id.to_string()))
    }

    pub fn join_tasks_room(&self, user_id: &str) -> bool {
        self.join_room(Room::Tasks(user_id.to_string()))
    }

    pub fn join_chat_room(&self, conversation_id: &str) -> bool {
        self.join_room(Room::Chat(conversation_id.to_string()))
    }

    /// Stop replaying `room` on reconnect. The backend has no leave event, so
    /// the current session stays in the room until it ends.
    pub fn leave_room(&self, room: &Room) -> bool {
        self.shared().forget_room(room)
    }

    pub fn joined_rooms(&self) -> Vec<Room> {
        self.shared().joined_rooms()
    }

    // ========================================================================
    // Generic events
    // ========================================================================

    /// Add a raw handler for `event`
    pub fn on<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.shared().listeners.add(event, Arc::new(handler))
    }

    /// Remove one handler, or all handlers for `event` when `id` is `None`
    pub fn off(&self, event: &str, id: Option<ListenerId>) -> usize {
        self.shared().listeners.remove(event, id)
    }

    pub fn remove_all_listeners(&self, event: Option<&str>) {
        self.shared().listeners.clear(event);
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.shared().listeners.count(event)
    }

    /// Send `event` to the backend. Returns false, dropping the frame, when
    /// not connected or when the outbound buffer is full.
    pub fn emit(&self, event: &str, data: Option<Value>) -> bool {
        self.send_frame(Frame::new(event, data))
    }

    /// Serialize `payload` and send it as `event`
    pub fn emit_json<T: Serialize>(&self, event: &str, payload: &T) -> bool {
        match Frame::with_payload(event, payload) {
            Ok(frame) => self.send_frame(frame),
            Err(e) => {
                tracing::warn!(event = %event, error = %e, "Failed to serialize payload");
                false
            }
        }
    }

    fn send_frame(&self, frame: Frame) -> bool {
        let session = self.session();
        let sender = match session.as_ref() {
            Some(s) if self.is_connected() => &s.outbound,
            _ => {
                OUTBOUND_DROPPED_TOTAL.inc();
                tracing::debug!(event = %frame.event, "Not connected, dropping frame");
                return false;
            }
        };

        match sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                OUTBOUND_DROPPED_TOTAL.inc();
                tracing::warn!(event = %frame.event, "Outbound buffer full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(frame)) => {
                OUTBOUND_DROPPED_TOTAL.inc();
                tracing::debug!(event = %frame.event, "Session ended, dropping frame");
                false
            }
        }
    }

    // ========================================================================
    // Named listeners
    // ========================================================================

    /// Install the handler owned by helper `slot` on `event`, decoding the
    /// payload into `T`. Payloads that do not decode are logged and skipped.
    fn on_typed<T, F>(&self, slot: &'static str, event: &'static str, handler: F) -> ListenerId
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(move |data: &Value| match T::deserialize(data) {
            Ok(payload) => handler(payload),
            Err(e) => {
                tracing::warn!(event = event, error = %e, "Skipping malformed payload");
            }
        });
        self.shared().listeners.replace_slot(event, slot, handler)
    }

    pub fn on_task_update<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(TaskPayload) + Send + Sync + 'static,
    {
        self.on_typed("on_task_update", events::TASK_UPDATED, handler)
    }

    pub fn on_task_created<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(TaskPayload) + Send + Sync + 'static,
    {
        self.on_typed("on_task_created", events::TASK_CREATED, handler)
    }

    pub fn on_task_deleted<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(TaskDeleted) + Send + Sync + 'static,
    {
        self.on_typed("on_task_deleted", events::TASK_DELETED, handler)
    }

    pub fn on_notification<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(NotificationPayload) + Send + Sync + 'static,
    {
        self.on_typed("on_notification", events::NOTIFICATION, handler)
    }

    pub fn on_user_online<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(PresencePayload) + Send + Sync + 'static,
    {
        self.on_typed("on_user_online", events::USER_ONLINE, handler)
    }

    pub fn on_user_offline<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(PresencePayload) + Send + Sync + 'static,
    {
        self.on_typed("on_user_offline", events::USER_OFFLINE, handler)
    }

    pub fn on_message<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(ChatMessage) + Send + Sync + 'static,
    {
        self.on_typed("on_message", events::MESSAGE, handler)
    }

    pub fn on_typing<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(TypingIndicator) + Send + Sync + 'static,
    {
        self.on_typed("on_typing", events::TYPING, handler)
    }

    /// One handler for all AI insight events
    pub fn on_ai_event<F>(&self, handler: F) -> Vec<ListenerId>
    where
        F: Fn(AiEvent) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        events::AI_EVENTS
            .iter()
            .map(|&event| {
                let handler = handler.clone();
                let wrapped: Handler = Arc::new(move |data: &Value| {
                    if let Some(ai) = AiEvent::from_event(event, data.clone()) {
                        (*handler)(ai);
                    }
                });
                self.shared().listeners.replace_slot(event, "on_ai_event", wrapped)
            })
            .collect()
    }

    // ========================================================================
    // Named emitters
    // ========================================================================

    pub fn emit_task_update(&self, task: &TaskPayload) -> bool {
        self.emit_json(events::TASK_UPDATE, task)
    }

    pub fn emit_task_create(&self, task: &TaskPayload) -> bool {
        self.emit_json(events::TASK_CREATE, task)
    }

    pub fn emit_task_delete(&self, task_id: &str) -> bool {
        let payload = TaskDeleted {
            task_id: task_id.to_string(),
            extra: Default::default(),
        };
        self.emit_json(events::TASK_DELETE, &payload)
    }

    /// Send a chat message; dropped if not connected
    pub fn send_message(&self, message: &OutboundMessage) -> bool {
        self.emit_json(events::SEND_MESSAGE, message)
    }

    pub fn emit_typing(&self, conversation_id: &str, is_typing: bool) -> bool {
        let payload = TypingIndicator {
            conversation_id: conversation_id.to_string(),
            is_typing,
            user_id: None,
            extra: Default::default(),
        };
        self.emit_json(events::TYPING, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory;

    fn client() -> RealtimeClient {
        let (connector, _server) = memory::pair();
        RealtimeClient::with_connector(RealtimeConfig::default(), Arc::new(connector)).unwrap()
    }

    #[test]
    fn test_new_client_is_disconnected() {
        let client = client();
        assert!(!client.is_connected());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.reconnect_attempts(), 0);
        assert_eq!(client.endpoint().as_str(), "ws://localhost:5000/ws");
    }

    #[test]
    fn test_offline_calls_are_silent_noops() {
        let client = client();

        assert!(!client.join_user_room("u1"));
        assert!(!client.join_chat_room("c1"));
        assert!(!client.send_message(&OutboundMessage::new("c1", "hi")));
        assert!(!client.emit_typing("c1", true));
        assert!(!client.emit("custom", None));
        assert!(client.joined_rooms().is_empty());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let client = client();
        client.disconnect();
        client.disconnect();
        assert!(!client.is_connected());
    }

    #[test]
    fn test_named_helpers_replace_previous_registration() {
        let client = client();

        client.on_message(|_| {});
        client.on_message(|_| {});
        client.on(events::MESSAGE, |_| {});

        assert_eq!(client.listener_count(events::MESSAGE), 2);

        client.on_ai_event(|_| {});
        client.on_ai_event(|_| {});
        for event in events::AI_EVENTS {
            assert_eq!(client.listener_count(event), 1);
        }

        client.remove_all_listeners(None);
        assert_eq!(client.listener_count(events::MESSAGE), 0);
    }

    #[test]
    fn test_invalid_endpoint_is_config_error() {
        let (connector, _server) = memory::pair();
        let config = RealtimeConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        let err = RealtimeClient::with_connector(config, Arc::new(connector)).err().unwrap();
        assert!(matches!(err, RealtimeError::Config(_)));
    }
}
