use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use url::Url;

use crate::reconnect::ReconnectConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Backend base URL (http, https, ws or wss)
    #[serde(default = "default_url")]
    pub url: String,
    /// WebSocket path appended to the base URL
    #[serde(default = "default_path")]
    pub path: String,
    /// Handshake timeout in milliseconds
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0) applied to each reconnect delay
    #[serde(default)]
    pub reconnect_jitter_factor: f64,
    /// Retry transport-level losses (close, error, ping timeout) with the same policy
    /// as server-initiated disconnects
    #[serde(default = "default_true")]
    pub reconnect_on_transport_loss: bool,
    /// Heartbeat interval in seconds (client sends ping)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// Extra grace period in seconds before a silent link is declared dead
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,
    /// Capacity of the outbound frame channel of a live session
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_path() -> String {
    "/ws".to_string()
}

fn default_connection_timeout_ms() -> u64 {
    20_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_true() -> bool {
    true
}

fn default_ping_interval() -> u64 {
    25
}

fn default_ping_timeout() -> u64 {
    20
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .set_default("realtime.url", default_url())?
            .set_default("realtime.path", default_path())?
            .set_default("realtime.connection_timeout_ms", default_connection_timeout_ms())?
            .set_default("realtime.max_reconnect_attempts", default_max_reconnect_attempts())?
            .set_default("realtime.reconnect_base_delay_ms", default_reconnect_base_delay_ms())?
            .set_default("log.level", default_log_level())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // REALTIME__URL, REALTIME__CONNECTION_TIMEOUT_MS, LOG__LEVEL, etc.
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        // The front end's public API URL wins over everything else
        if let Ok(url) = env::var("NEXT_PUBLIC_API_URL") {
            builder = builder.set_override("realtime.url", url)?;
        }

        builder.build()?.try_deserialize()
    }
}

impl RealtimeConfig {
    /// Derive the WebSocket endpoint from the base URL and path.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| ConfigError::Message(format!("invalid realtime url {:?}: {}", self.url, e)))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ConfigError::Message(format!(
                    "unsupported realtime url scheme: {}",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::Message(format!("cannot switch scheme to {}", scheme)))?;

        let base = url.path().trim_end_matches('/').to_string();
        let path = self.path.trim_start_matches('/');
        if path.is_empty() {
            url.set_path(if base.is_empty() { "/" } else { &base });
        } else {
            url.set_path(&format!("{}/{}", base, path));
        }

        Ok(url)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: self.max_reconnect_attempts,
            base_delay_ms: self.reconnect_base_delay_ms,
            jitter_factor: self.reconnect_jitter_factor,
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            path: default_path(),
            connection_timeout_ms: default_connection_timeout_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_jitter_factor: 0.0,
            reconnect_on_transport_loss: default_true(),
            ping_interval_secs: default_ping_interval(),
            ping_timeout_secs: default_ping_timeout(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
