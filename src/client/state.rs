use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;

use crate::metrics::CONNECTED;
use crate::protocol::Room;

use super::listeners::ListenerRegistry;

/// Lifecycle of the realtime connection, observable through
/// [`RealtimeClient::watch_state`](super::RealtimeClient::watch_state)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting `delay` before reconnect attempt number `attempt`
    Reconnecting { attempt: u32, delay: Duration },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Reconnecting { attempt, delay } => {
                write!(f, "reconnecting (attempt {} in {}ms)", attempt, delay.as_millis())
            }
        }
    }
}

/// State shared between the client handle and its session drivers.
///
/// Only the driver whose generation is live may publish state; a superseded
/// driver that is still winding down is silently ignored.
pub(crate) struct Shared {
    pub listeners: ListenerRegistry,
    rooms: Mutex<BTreeSet<Room>>,
    state_tx: watch::Sender<ConnectionState>,
    /// Generation of the live session, 0 when there is none
    live: Mutex<u64>,
    attempts: AtomicU32,
}

impl Shared {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            listeners: ListenerRegistry::new(),
            rooms: Mutex::new(BTreeSet::new()),
            state_tx,
            live: Mutex::new(0),
            attempts: AtomicU32::new(0),
        }
    }

    fn live(&self) -> MutexGuard<'_, u64> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn rooms(&self) -> MutexGuard<'_, BTreeSet<Room>> {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    fn send_state(&self, state: ConnectionState) {
        CONNECTED.set(i64::from(state.is_connected()));
        self.state_tx.send_replace(state);
    }

    /// Make `generation` the live session and move to `Connecting`
    pub fn activate(&self, generation: u64) {
        let mut live = self.live();
        *live = generation;
        self.attempts.store(0, Ordering::Relaxed);
        self.send_state(ConnectionState::Connecting);
    }

    /// Drop whatever session is live and move to `Disconnected`
    pub fn deactivate(&self) {
        let mut live = self.live();
        *live = 0;
        self.attempts.store(0, Ordering::Relaxed);
        self.send_state(ConnectionState::Disconnected);
    }

    /// Publish a state change from the driver of `generation`.
    /// Returns false if that driver has been superseded.
    pub fn publish(&self, generation: u64, state: ConnectionState) -> bool {
        let live = self.live();
        if *live != generation {
            return false;
        }
        if let ConnectionState::Reconnecting { attempt, .. } = state {
            self.attempts.store(attempt, Ordering::Relaxed);
        }
        if state.is_connected() {
            self.attempts.store(0, Ordering::Relaxed);
        }
        self.send_state(state);
        true
    }

    /// Final transition of the driver of `generation`: mark it dead and
    /// publish `Disconnected`, keeping the attempt count for inspection
    pub fn retire(&self, generation: u64) -> bool {
        let mut live = self.live();
        if *live != generation {
            return false;
        }
        *live = 0;
        self.send_state(ConnectionState::Disconnected);
        true
    }

    pub fn record_room(&self, room: Room) -> bool {
        self.rooms().insert(room)
    }

    pub fn forget_room(&self, room: &Room) -> bool {
        self.rooms().remove(room)
    }

    pub fn clear_rooms(&self) {
        self.rooms().clear();
    }

    pub fn joined_rooms(&self) -> Vec<Room> {
        self.rooms().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superseded_generation_cannot_publish() {
        let shared = Shared::new();
        shared.activate(1);
        shared.activate(2);

        assert!(!shared.publish(1, ConnectionState::Connected));
        assert_eq!(shared.state(), ConnectionState::Connecting);

        assert!(shared.publish(2, ConnectionState::Connected));
        assert!(shared.state().is_connected());
    }

    #[test]
    fn test_reconnecting_tracks_attempts() {
        let shared = Shared::new();
        shared.activate(7);
        shared.publish(
            7,
            ConnectionState::Reconnecting {
                attempt: 3,
                delay: Duration::from_secs(3),
            },
        );
        assert_eq!(shared.attempts(), 3);

        assert!(shared.retire(7));
        assert_eq!(shared.state(), ConnectionState::Disconnected);
        assert_eq!(shared.attempts(), 3);
        // Retired generation can no longer publish
        assert!(!shared.publish(7, ConnectionState::Connected));
    }

    #[test]
    fn test_rooms_are_a_set() {
        let shared = Shared::new();
        assert!(shared.record_room(Room::Team("1".into())));
        assert!(!shared.record_room(Room::Team("1".into())));
        shared.record_room(Room::User("u".into()));

        assert_eq!(shared.joined_rooms().len(), 2);
        assert!(shared.forget_room(&Room::User("u".into())));
        shared.clear_rooms();
        assert!(shared.joined_rooms().is_empty());
    }

    #[test]
    fn test_state_display() {
        let state = ConnectionState::Reconnecting {
            attempt: 2,
            delay: Duration::from_millis(2000),
        };
        assert_eq!(state.to_string(), "reconnecting (attempt 2 in 2000ms)");
    }
}
