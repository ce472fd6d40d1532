//! WebSocket transport tests against a local tokio-tungstenite server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use taskflow_realtime::config::RealtimeConfig;
use taskflow_realtime::protocol::events;
use taskflow_realtime::{ConnectionState, RealtimeClient, RealtimeError};

const WAIT: Duration = Duration::from_secs(5);

struct Upgrade {
    uri: String,
    authorization: Option<String>,
}

async fn bind() -> (TcpListener, RealtimeConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = RealtimeConfig {
        url: format!("http://127.0.0.1:{}", port),
        ping_interval_secs: 0,
        ..Default::default()
    };
    (listener, config)
}

/// Accept one upgrade, reporting what the client presented
async fn accept(listener: &TcpListener) -> (WebSocketStream<TcpStream>, Upgrade) {
    let (stream, _) = listener.accept().await.unwrap();
    let (tx, rx) = oneshot::channel();
    let inspect = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let _ = tx.send(Upgrade {
            uri: req.uri().to_string(),
            authorization: req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        });
        Ok(resp)
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, inspect)
        .await
        .unwrap();
    (ws, rx.await.unwrap())
}

async fn next_frame(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let message = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_handshake_presents_token_and_exchanges_events() {
    let (listener, config) = bind().await;
    let client = RealtimeClient::new(config).unwrap();

    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
    client.on_notification(move |n| {
        let _ = notify_tx.send(n.message);
    });

    let (connect, accepted) = tokio::join!(client.connect("secret"), accept(&listener));
    connect.unwrap();
    let (mut ws, upgrade) = accepted;

    assert_eq!(upgrade.uri, "/ws?token=secret");
    assert_eq!(upgrade.authorization.as_deref(), Some("Bearer secret"));

    assert!(client.join_tasks_room("project-1"));
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame, json!({"event": events::JOIN_TASKS, "data": "project-1"}));

    let push = json!({"event": events::NOTIFICATION, "data": {"type": "info", "message": "deployed"}});
    ws.send(Message::Text(push.to_string().into())).await.unwrap();

    let message = timeout(WAIT, notify_rx.recv()).await.unwrap().unwrap();
    assert_eq!(message, "deployed");

    client.disconnect();
}

#[tokio::test]
async fn test_server_close_triggers_reconnect_with_room_replay() {
    let (listener, config) = bind().await;
    let client = RealtimeClient::new(config).unwrap();
    let mut state_rx = client.watch_state();

    let (connect, (mut ws, _)) = tokio::join!(client.connect("t"), accept(&listener));
    connect.unwrap();

    assert!(client.join_team_room("team-9"));
    assert_eq!(next_frame(&mut ws).await["event"], events::JOIN_TEAM);

    ws.close(None).await.unwrap();

    let reconnecting = timeout(WAIT, async {
        loop {
            state_rx.changed().await.unwrap();
            let state = *state_rx.borrow_and_update();
            if let ConnectionState::Reconnecting { attempt, delay } = state {
                return (attempt, delay);
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(reconnecting, (1, Duration::from_millis(1000)));

    let (mut second, _) = timeout(WAIT, accept(&listener)).await.unwrap();
    let replayed = next_frame(&mut second).await;
    assert_eq!(replayed, json!({"event": events::JOIN_TEAM, "data": "team-9"}));

    client.disconnect();
}

#[tokio::test]
async fn test_websocket_pings_count_as_activity() {
    let (listener, mut config) = bind().await;
    config.ping_interval_secs = 1;
    config.ping_timeout_secs = 1;
    let client = RealtimeClient::new(config).unwrap();

    let (connect, (mut ws, _)) = tokio::join!(client.connect("t"), accept(&listener));
    connect.unwrap();

    // Control frames only, for three times the silence limit
    let keepalive = async {
        for _ in 0..20 {
            ws.send(Message::Ping(Vec::new().into())).await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
    };
    let redial = timeout(Duration::from_secs(6), listener.accept());
    let (_, redial) = tokio::join!(keepalive, redial);

    assert!(redial.is_err(), "client dialed again while the server was pinging");
    assert!(client.is_connected());

    client.disconnect();
}

#[tokio::test]
async fn test_rejected_upgrade_maps_to_unauthorized() {
    let (listener, config) = bind().await;
    let client = RealtimeClient::new(config).unwrap();

    let server = async {
        let (stream, _) = listener.accept().await.unwrap();
        let deny = |_: &Request, _: Response| -> Result<Response, ErrorResponse> {
            let mut reject = ErrorResponse::new(Some("invalid token".to_string()));
            *reject.status_mut() = StatusCode::UNAUTHORIZED;
            Err(reject)
        };
        let result = tokio_tungstenite::accept_hdr_async(stream, deny).await;
        assert!(result.is_err());
    };

    let (connect, ()) = tokio::join!(client.connect("expired"), server);
    let err = connect.unwrap_err();
    assert!(matches!(err, RealtimeError::Unauthorized(_)), "got {:?}", err);

    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
