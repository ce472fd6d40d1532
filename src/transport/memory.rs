//! In-process transport with a scriptable server side.
//!
//! ```no_run
//! # async fn demo() {
//! use taskflow_realtime::transport::memory::{self, Handshake};
//!
//! let (connector, mut server) = memory::pair();
//! server.push_handshake(Handshake::Reject("maintenance".into()));
//! // hand `connector` to a RealtimeClient, then:
//! let conn = server.accept().await.unwrap();
//! conn.emit("notification", serde_json::json!({"message": "hi"}));
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use crate::error::{RealtimeError, Result};
use crate::protocol::Frame;

use super::{Connector, DisconnectReason, Link, LinkEvent};

/// How the fake server answers one handshake
#[derive(Debug, Clone, PartialEq)]
pub enum Handshake {
    Accept,
    Reject(String),
    Unauthorized(String),
    /// Never answer; the client's handshake timeout decides
    Hang,
}

#[derive(Debug)]
struct ServerState {
    script: VecDeque<Handshake>,
    default: Handshake,
    tokens: Vec<String>,
    opened_at: Vec<Instant>,
}

/// Create a connected connector/server pair
pub fn pair() -> (MemoryConnector, MemoryServer) {
    let state = Arc::new(Mutex::new(ServerState {
        script: VecDeque::new(),
        default: Handshake::Accept,
        tokens: Vec::new(),
        opened_at: Vec::new(),
    }));
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();

    (
        MemoryConnector {
            state: state.clone(),
            accepted: accepted_tx,
        },
        MemoryServer {
            state,
            accepted: accepted_rx,
        },
    )
}

#[derive(Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<ServerState>>,
    accepted: mpsc::UnboundedSender<ServerConnection>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, _endpoint: &Url, token: &str) -> Result<Box<dyn Link>> {
        let handshake = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.tokens.push(token.to_string());
            state.opened_at.push(Instant::now());
            let default = state.default.clone();
            state.script.pop_front().unwrap_or(default)
        };

        match handshake {
            Handshake::Accept => {}
            Handshake::Reject(reason) => return Err(RealtimeError::Handshake(reason)),
            Handshake::Unauthorized(reason) => return Err(RealtimeError::Unauthorized(reason)),
            Handshake::Hang => std::future::pending::<()>().await,
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();

        self.accepted
            .send(ServerConnection {
                to_client,
                from_client,
            })
            .map_err(|_| RealtimeError::Handshake("memory server is gone".to_string()))?;

        Ok(Box::new(MemoryLink {
            to_server: Some(to_server),
            from_server,
        }))
    }
}

/// Server half of the pair
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
    accepted: mpsc::UnboundedReceiver<ServerConnection>,
}

impl MemoryServer {
    /// Queue the answer for the next handshake
    pub fn push_handshake(&self, handshake: Handshake) {
        self.lock().script.push_back(handshake);
    }

    /// Answer used once the queued script is exhausted
    pub fn set_default(&self, handshake: Handshake) {
        self.lock().default = handshake;
    }

    /// Number of handshakes attempted so far
    pub fn attempts(&self) -> usize {
        self.lock().tokens.len()
    }

    /// Credentials presented, one per handshake
    pub fn tokens(&self) -> Vec<String> {
        self.lock().tokens.clone()
    }

    /// When each handshake started, on the tokio clock
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.lock().opened_at.clone()
    }

    /// Wait for the next accepted connection
    pub async fn accept(&mut self) -> Option<ServerConnection> {
        self.accepted.recv().await
    }

    pub fn try_accept(&mut self) -> Option<ServerConnection> {
        self.accepted.try_recv().ok()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One accepted session, seen from the server
pub struct ServerConnection {
    to_client: mpsc::UnboundedSender<LinkEvent>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

impl ServerConnection {
    /// Push an event to the client; returns false if the client is gone
    pub fn emit(&self, event: &str, data: Value) -> bool {
        self.to_client
            .send(LinkEvent::Frame(Frame::new(event, Some(data))))
            .is_ok()
    }

    /// Transport-level keepalive with no application payload
    pub fn keep_alive(&self) -> bool {
        self.to_client.send(LinkEvent::Alive).is_ok()
    }

    /// End the session with the given reason
    pub fn disconnect(&self, reason: DisconnectReason) {
        let _ = self.to_client.send(LinkEvent::Closed(reason));
    }

    /// Next frame sent by the client, `None` once the client closed the link
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Frame> {
        self.from_client.try_recv().ok()
    }

    /// Drain everything the client has sent so far
    pub fn drain(&mut self) -> Vec<Frame> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

struct MemoryLink {
    to_server: Option<mpsc::UnboundedSender<Frame>>,
    from_server: mpsc::UnboundedReceiver<LinkEvent>,
}

#[async_trait]
impl Link for MemoryLink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        match &self.to_server {
            Some(tx) => tx
                .send(frame)
                .map_err(|_| RealtimeError::Transport("memory server dropped the link".to_string())),
            None => Err(RealtimeError::Transport("link is closed".to_string())),
        }
    }

    async fn recv(&mut self) -> LinkEvent {
        self.from_server
            .recv()
            .await
            .unwrap_or(LinkEvent::Closed(DisconnectReason::TransportClose))
    }

    async fn close(&mut self) {
        self.to_server = None;
        self.from_server.close();
    }
}
