//! Event names understood by the backend.

// Room joins (client -> server, payload = identifier string)
pub const JOIN_USER: &str = "join-user";
pub const JOIN_TEAM: &str = "join-team";
pub const JOIN_NOTIFICATIONS: &str = "join-notifications";
pub const JOIN_TASKS: &str = "join-tasks";
pub const JOIN_CHAT: &str = "join-chat";

// Server -> client
pub const TASK_UPDATED: &str = "task-updated";
pub const TASK_CREATED: &str = "task-created";
pub const TASK_DELETED: &str = "task-deleted";
pub const NOTIFICATION: &str = "notification";
pub const USER_ONLINE: &str = "user-online";
pub const USER_OFFLINE: &str = "user-offline";
pub const MESSAGE: &str = "message";
pub const TYPING: &str = "typing";

// AI insights pushed by the backend
pub const AI_TASK_ASSIGNED: &str = "ai-task-assigned";
pub const BURNOUT_ALERT: &str = "burnout-alert";
pub const PERFORMANCE_INSIGHT: &str = "performance-insight";
pub const ANOMALY_DETECTED: &str = "anomaly-detected";
pub const MODEL_TRAINED: &str = "model-trained";

pub const AI_EVENTS: [&str; 5] = [
    AI_TASK_ASSIGNED,
    BURNOUT_ALERT,
    PERFORMANCE_INSIGHT,
    ANOMALY_DETECTED,
    MODEL_TRAINED,
];

// Client -> server
pub const TASK_UPDATE: &str = "task-update";
pub const TASK_CREATE: &str = "task-create";
pub const TASK_DELETE: &str = "task-delete";
pub const SEND_MESSAGE: &str = "send-message";

// Heartbeat
pub const PING: &str = "ping";
pub const PONG: &str = "pong";
