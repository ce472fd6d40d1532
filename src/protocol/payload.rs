use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::events;

/// Task as broadcast on `task-updated` / `task-created`, also used for outbound task edits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Fields this client does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskPayload {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            status: None,
            priority: None,
            assigned_to: None,
            due_date: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDeleted {
    pub task_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of `user-online` / `user-offline`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub user_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Chat message delivered on `message`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub conversation_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of `send-message`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub conversation_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OutboundMessage {
    pub fn new(conversation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message: message.into(),
            attachments: None,
            extra: Map::new(),
        }
    }

    pub fn attachments(mut self, attachments: Vec<Value>) -> Self {
        self.attachments = Some(attachments);
        self
    }
}

/// Payload of `typing`, in both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub conversation_id: String,
    pub is_typing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// AI insight pushed by the backend; the payload is passed through untouched
#[derive(Debug, Clone, PartialEq)]
pub enum AiEvent {
    TaskAssigned(Value),
    BurnoutAlert(Value),
    PerformanceInsight(Value),
    AnomalyDetected(Value),
    ModelTrained(Value),
}

impl AiEvent {
    pub fn from_event(event: &str, payload: Value) -> Option<Self> {
        match event {
            events::AI_TASK_ASSIGNED => Some(AiEvent::TaskAssigned(payload)),
            events::BURNOUT_ALERT => Some(AiEvent::BurnoutAlert(payload)),
            events::PERFORMANCE_INSIGHT => Some(AiEvent::PerformanceInsight(payload)),
            events::ANOMALY_DETECTED => Some(AiEvent::AnomalyDetected(payload)),
            events::MODEL_TRAINED => Some(AiEvent::ModelTrained(payload)),
            _ => None,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            AiEvent::TaskAssigned(_) => events::AI_TASK_ASSIGNED,
            AiEvent::BurnoutAlert(_) => events::BURNOUT_ALERT,
            AiEvent::PerformanceInsight(_) => events::PERFORMANCE_INSIGHT,
            AiEvent::AnomalyDetected(_) => events::ANOMALY_DETECTED,
            AiEvent::ModelTrained(_) => events::MODEL_TRAINED,
        }
    }

    pub fn payload(&self) -> &Value {
        match self {
            AiEvent::TaskAssigned(v)
            | AiEvent::BurnoutAlert(v)
            | AiEvent::PerformanceInsight(v)
            | AiEvent::AnomalyDetected(v)
            | AiEvent::ModelTrained(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_task_keeps_unknown_fields() {
        let task: TaskPayload = serde_json::from_value(json!({
            "_id": "t1",
            "title": "Write report",
            "status": "in-progress",
            "assignedTo": "u2",
            "tags": ["q3"]
        }))
        .unwrap();

        assert_eq!(task.id, "t1");
        assert_eq!(task.assigned_to.as_deref(), Some("u2"));
        assert_eq!(task.extra.get("tags"), Some(&json!(["q3"])));
    }

    #[test]
    fn test_outbound_message_wire_shape() {
        let msg = OutboundMessage::new("c1", "hello");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"conversationId": "c1", "message": "hello"})
        );

        let msg = msg.attachments(vec![json!({"url": "https://files/x.png"})]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["attachments"][0]["url"], "https://files/x.png");
    }

    #[test]
    fn test_typing_wire_shape() {
        let typing = TypingIndicator {
            conversation_id: "c1".to_string(),
            is_typing: true,
            user_id: None,
            extra: Map::new(),
        };
        assert_eq!(
            serde_json::to_value(&typing).unwrap(),
            json!({"conversationId": "c1", "isTyping": true})
        );
    }

    #[test]
    fn test_inbound_typing_keeps_unknown_fields() {
        let typing: TypingIndicator = serde_json::from_value(json!({
            "conversationId": "c1",
            "isTyping": false,
            "userId": "u7",
            "userName": "Ada"
        }))
        .unwrap();

        assert_eq!(typing.user_id.as_deref(), Some("u7"));
        assert_eq!(typing.extra["userName"], "Ada");
        assert_eq!(serde_json::to_value(&typing).unwrap()["userName"], "Ada");
    }

    #[test]
    fn test_outbound_message_extra_fields_are_sent() {
        let mut msg = OutboundMessage::new("c1", "hi");
        msg.extra.insert("replyTo".to_string(), json!("m-3"));

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["replyTo"], "m-3");
        assert_eq!(value["message"], "hi");
    }

    #[test]
    fn test_parse_notification() {
        let n: NotificationPayload = serde_json::from_value(json!({
            "_id": "n1",
            "type": "task_assigned",
            "message": "You have a new task",
            "createdAt": "2026-03-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(n.kind, "task_assigned");
        assert!(!n.read);
        assert!(n.created_at.is_some());
    }

    #[test]
    fn test_ai_event_mapping() {
        let event = AiEvent::from_event("burnout-alert", json!({"userId": "u1", "score": 0.8})).unwrap();
        assert_eq!(event.event_name(), "burnout-alert");
        assert_eq!(event.payload()["score"], 0.8);
        assert!(AiEvent::from_event("task-updated", Value::Null).is_none());
    }
}
