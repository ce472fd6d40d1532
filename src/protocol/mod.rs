//! Wire protocol spoken with the realtime backend.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`.

pub mod events;
mod frame;
mod payload;
mod room;

pub use frame::Frame;
pub use payload::{
    AiEvent, ChatMessage, NotificationPayload, OutboundMessage, PresencePayload, TaskDeleted,
    TaskPayload, TypingIndicator,
};
pub use room::Room;
