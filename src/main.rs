use std::env;

use anyhow::{Context, Result};
use tokio::signal;

use taskflow_realtime::config::Settings;
use taskflow_realtime::metrics::encode_metrics;
use taskflow_realtime::protocol::{events, Room};
use taskflow_realtime::telemetry::init_tracing;
use taskflow_realtime::RealtimeClient;

/// Events logged by the tail; AI insights go through `on_ai_event`
const TAILED_EVENTS: [&str; 8] = [
    events::TASK_UPDATED,
    events::TASK_CREATED,
    events::TASK_DELETED,
    events::NOTIFICATION,
    events::USER_ONLINE,
    events::USER_OFFLINE,
    events::MESSAGE,
    events::TYPING,
];

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;
    init_tracing(&settings.log);
    tracing::info!("Configuration loaded");

    let token = env::var("REALTIME_TOKEN").context("REALTIME_TOKEN must be set")?;
    let rooms = parse_rooms(&env::var("REALTIME_ROOMS").unwrap_or_default());

    let client = RealtimeClient::new(settings.realtime.clone())?;

    for event in TAILED_EVENTS {
        client.on(event, move |data| {
            tracing::info!(event = event, payload = %data, "Event received");
        });
    }
    client.on_ai_event(|insight| {
        tracing::info!(
            event = insight.event_name(),
            payload = %insight.payload(),
            "AI insight received"
        );
    });

    // Log every state transition, including silent reconnects
    let mut state_rx = client.watch_state();
    let state_handle = tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow_and_update();
            tracing::info!(state = %state, "Connection state changed");
        }
    });

    tracing::info!(endpoint = %client.endpoint(), "Connecting");
    client.connect(&token).await?;

    for room in rooms {
        client.join_room(room);
    }
    tracing::info!(rooms = ?client.joined_rooms(), "Tailing realtime events");

    shutdown_signal().await;

    client.disconnect();
    state_handle.abort();
    tracing::debug!(metrics = %encode_metrics(), "Final client metrics");
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Parse a comma-separated list such as `user:42,team:7`
fn parse_rooms(spec: &str) -> Vec<Room> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|name| {
            let room = Room::parse(name);
            if room.is_none() {
                tracing::warn!(room = %name, "Ignoring unknown room");
            }
            room
        })
        .collect()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, disconnecting");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, disconnecting");
        }
    }
}
