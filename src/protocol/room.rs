use std::fmt;

use serde_json::Value;

use super::events;
use super::Frame;

/// A server-side broadcast channel the client can ask to join
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Room {
    User(String),
    Team(String),
    Notifications(String),
    Tasks(String),
    Chat(String),
}

impl Room {
    /// Event emitted to join this room
    pub fn join_event(&self) -> &'static str {
        match self {
            Room::User(_) => events::JOIN_USER,
            Room::Team(_) => events::JOIN_TEAM,
            Room::Notifications(_) => events::JOIN_NOTIFICATIONS,
            Room::Tasks(_) => events::JOIN_TASKS,
            Room::Chat(_) => events::JOIN_CHAT,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Room::User(id)
            | Room::Team(id)
            | Room::Notifications(id)
            | Room::Tasks(id)
            | Room::Chat(id) => id,
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Room::User(_) => "user",
            Room::Team(_) => "team",
            Room::Notifications(_) => "notifications",
            Room::Tasks(_) => "tasks",
            Room::Chat(_) => "chat",
        }
    }

    /// Room name as the backend knows it, e.g. `team:42`
    pub fn name(&self) -> String {
        format!("{}:{}", self.prefix(), self.id())
    }

    pub fn join_frame(&self) -> Frame {
        Frame::new(self.join_event(), Some(Value::String(self.id().to_string())))
    }

    /// Parse a `kind:id` room name
    pub fn parse(name: &str) -> Option<Self> {
        let (kind, id) = name.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        let id = id.to_string();
        match kind {
            "user" => Some(Room::User(id)),
            "team" => Some(Room::Team(id)),
            "notifications" => Some(Room::Notifications(id)),
            "tasks" => Some(Room::Tasks(id)),
            "chat" => Some(Room::Chat(id)),
            _ => None,
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_frame_carries_identifier() {
        let frame = Room::Team("42".to_string()).join_frame();
        assert_eq!(frame.event, "join-team");
        assert_eq!(frame.data, Some(Value::String("42".to_string())));
    }

    #[test]
    fn test_room_names() {
        assert_eq!(Room::User("u1".into()).name(), "user:u1");
        assert_eq!(Room::Notifications("u1".into()).name(), "notifications:u1");
        assert_eq!(Room::Chat("c9".into()).to_string(), "chat:c9");
    }

    #[test]
    fn test_parse_round_names() {
        assert_eq!(Room::parse("tasks:7"), Some(Room::Tasks("7".into())));
        assert_eq!(Room::parse("chat:abc:def"), Some(Room::Chat("abc:def".into())));
        assert_eq!(Room::parse("team:"), None);
        assert_eq!(Room::parse("lobby:1"), None);
        assert_eq!(Room::parse("user"), None);
    }
}
