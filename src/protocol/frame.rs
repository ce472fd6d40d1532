use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::events;

/// A single event frame exchanged with the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Build a frame from any serializable payload
    pub fn with_payload<T: Serialize>(
        event: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event, Some(serde_json::to_value(payload)?)))
    }

    pub fn ping() -> Self {
        Self::new(events::PING, None)
    }

    pub fn is_heartbeat(&self) -> bool {
        self.event == events::PING || self.event == events::PONG
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
