use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::{RealtimeError, Result};
use crate::protocol::Frame;

use super::{Connector, DisconnectReason, Link, LinkEvent};

/// WebSocket connector carrying JSON event frames
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Attach the credential as a `token` query parameter; the Authorization
/// header is added to the upgrade request separately.
fn authorized_url(endpoint: &Url, token: &str) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut().append_pair("token", token);
    url
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, endpoint: &Url, token: &str) -> Result<Box<dyn Link>> {
        let url = authorized_url(endpoint, token);

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidEndpoint(e.to_string()))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| RealtimeError::Handshake("token is not a valid header value".to_string()))?;
        request.headers_mut().insert(header::AUTHORIZATION, bearer);

        tracing::debug!(endpoint = %endpoint, "Opening WebSocket");

        let (stream, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(ok) => ok,
            Err(tungstenite::Error::Http(response)) => {
                let status = response.status();
                return Err(match status.as_u16() {
                    401 | 403 => RealtimeError::Unauthorized(format!(
                        "server rejected credentials ({})",
                        status
                    )),
                    _ => RealtimeError::Handshake(format!("unexpected HTTP status {}", status)),
                });
            }
            Err(e) => return Err(RealtimeError::Handshake(e.to_string())),
        };

        Ok(Box::new(WsLink {
            stream,
            closed: false,
        }))
    }
}

struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl Link for WsLink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let text = frame.to_json()?;
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> LinkEvent {
        if self.closed {
            return LinkEvent::Closed(DisconnectReason::TransportClose);
        }

        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed))
                | None => {
                    self.closed = true;
                    return LinkEvent::Closed(DisconnectReason::TransportClose);
                }
                Some(Err(e)) => {
                    self.closed = true;
                    return LinkEvent::Closed(DisconnectReason::TransportError(e.to_string()));
                }
            };

            match message {
                Message::Text(text) => match Frame::from_json(text.as_str()) {
                    Ok(frame) => return LinkEvent::Frame(frame),
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring malformed frame");
                    }
                },
                Message::Close(frame) => {
                    tracing::debug!(close_frame = ?frame, "Server closed the connection");
                    self.closed = true;
                    return LinkEvent::Closed(DisconnectReason::ServerDisconnect);
                }
                Message::Binary(_) => {
                    tracing::debug!("Ignoring binary frame");
                }
                // tungstenite answers pings itself; both still count as traffic
                Message::Ping(_) | Message::Pong(_) => return LinkEvent::Alive,
                Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "WebSocket close failed");
        }
    }
}
