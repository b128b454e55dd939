use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{NotificationKind, PresenceStatus};

// -- Bus payloads --

/// A persisted chat message, published on `chat_outgoing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: i64,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Delivery acknowledgement for the sender of `message_id`. `timestamp` is
/// unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckPayload {
    pub user_id: Uuid,
    pub message_id: i64,
    pub timestamp: i64,
}

/// Read receipt. On `read_incoming` `user_id` is the reader; the same payload
/// goes out on `read_outgoing` addressed to `recipient_id`, the original sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadPayload {
    pub user_id: Uuid,
    pub recipient_id: Uuid,
    pub timestamp: i64,
}

/// Per-peer presence change on `presence_outgoing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub user_id: Uuid,
    pub recipient_id: Uuid,
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub id: i64,
    pub recipient_id: Uuid,
    /// Empty when the notification has no originating user.
    pub sender_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub created_at: DateTime<Utc>,
}

/// Client chat send after the gateway injected the authenticated sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatIncoming {
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
}

/// Self-presence announced by the gateway on `presence_event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfPresence {
    pub user_id: Uuid,
    pub status: PresenceStatus,
}

// -- WebSocket frames --

/// Frames sent FROM client TO gateway. Anything else fails to parse and is
/// dropped by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    ChatEvent(ChatSend),
    ReadEvent(ReadSend),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSend {
    pub recipient_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadSend {
    pub recipient_id: Uuid,
    pub timestamp: i64,
}

/// Frames sent FROM gateway TO client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    NotificationEvent(NotificationPayload),
    ChatEvent(MessagePayload),
    AckEvent(AckPayload),
    PresenceEvent(PresencePayload),
    ReadEvent(ReadPayload),
}

impl ServerEvent {
    /// The user whose connection this frame must be written to.
    pub fn addressee(&self) -> Uuid {
        match self {
            Self::NotificationEvent(p) => p.recipient_id,
            Self::ChatEvent(p) => p.recipient_id,
            Self::AckEvent(p) => p.user_id,
            Self::PresenceEvent(p) => p.recipient_id,
            Self::ReadEvent(p) => p.recipient_id,
        }
    }
}
