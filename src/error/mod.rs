use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection attempt aborted")]
    Aborted,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RealtimeError {
    /// Stable code used in logs and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            RealtimeError::Config(_) => "CONFIG_ERROR",
            RealtimeError::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            RealtimeError::ConnectTimeout(_) => "TIMEOUT",
            RealtimeError::Handshake(_) => "HANDSHAKE_FAILED",
            RealtimeError::Unauthorized(_) => "UNAUTHORIZED",
            RealtimeError::Transport(_) => "TRANSPORT_ERROR",
            RealtimeError::Aborted => "ABORTED",
            RealtimeError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RealtimeError::ConnectTimeout(_))
    }
}

pub type Result<T> = std::result::Result<T, RealtimeError>;
