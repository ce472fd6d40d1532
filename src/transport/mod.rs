//! Transport seam between the connection manager and the network.
//!
//! A [`Connector`] performs the handshake and yields a [`Link`]; the
//! connection manager owns the link exclusively for the lifetime of one
//! session. Two implementations ship with the crate:
//! - [`WsConnector`]: WebSocket over `tokio-tungstenite`
//! - [`memory`]: in-process pair with a scriptable server side

pub mod memory;
mod ws;

use std::fmt;

use async_trait::async_trait;
use url::Url;

use crate::error::Result;
use crate::protocol::Frame;

pub use ws::WsConnector;

/// Why a live link went away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the session on purpose
    ServerDisconnect,
    /// This client closed the session
    ClientDisconnect,
    /// The connection ended without a close handshake
    TransportClose,
    /// I/O or protocol failure
    TransportError(String),
    /// Nothing was received within the heartbeat window
    PingTimeout,
}

impl DisconnectReason {
    /// Reason string as reported on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::ServerDisconnect => "io server disconnect",
            DisconnectReason::ClientDisconnect => "io client disconnect",
            DisconnectReason::TransportClose => "transport close",
            DisconnectReason::TransportError(_) => "transport error",
            DisconnectReason::PingTimeout => "ping timeout",
        }
    }

    /// Losses the underlying transport would normally recover from by itself
    pub fn is_transport_loss(&self) -> bool {
        matches!(
            self,
            DisconnectReason::TransportClose
                | DisconnectReason::TransportError(_)
                | DisconnectReason::PingTimeout
        )
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::TransportError(detail) if !detail.is_empty() => {
                write!(f, "{}: {}", self.as_str(), detail)
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Something received from a live link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Frame(Frame),
    /// Transport-level keepalive (WebSocket ping or pong); proves the peer is there
    Alive,
    Closed(DisconnectReason),
}

/// Opens links to the realtime backend
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Perform the handshake, presenting `token` as the credential.
    /// The caller enforces the handshake timeout.
    async fn open(&self, endpoint: &Url, token: &str) -> Result<Box<dyn Link>>;
}

/// One established bidirectional session
#[async_trait]
pub trait Link: Send {
    async fn send(&mut self, frame: Frame) -> Result<()>;

    /// Wait for the next inbound event. Must be cancel safe: the manager
    /// polls it inside `tokio::select!`.
    async fn recv(&mut self) -> LinkEvent;

    /// Close gracefully; errors are ignored
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let reason = DisconnectReason::TransportError("parse error".to_string());
        assert!(reason.is_transport_loss());
        assert_eq!(reason.to_string(), "transport error: parse error");
        assert_eq!(DisconnectReason::PingTimeout.to_string(), "ping timeout");
    }

    #[test]
    fn test_server_disconnect_is_not_transport_loss() {
        assert!(!DisconnectReason::ServerDisconnect.is_transport_loss());
        assert!(!DisconnectReason::ClientDisconnect.is_transport_loss());
    }
}
