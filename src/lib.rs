//! Real-time client for the TaskFlow backend.
//!
//! ```no_run
//! use taskflow_realtime::{config::Settings, RealtimeClient};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = Settings::new()?;
//! let client = RealtimeClient::new(settings.realtime)?;
//!
//! client.on_notification(|n| println!("{}", n.message));
//! client.connect("jwt-token").await?;
//! client.join_notifications_room("user-42");
//! # Ok(())
//! # }
//! ```

// Infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Wire and transport
pub mod protocol;
pub mod transport;

// Connection management
pub mod client;
pub mod reconnect;

pub use client::{ConnectionState, ListenerId, RealtimeClient};
pub use error::{RealtimeError, Result};
