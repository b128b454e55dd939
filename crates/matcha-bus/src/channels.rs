//! Stable channel names. Gateways and subscribers on different hosts agree on
//! these strings, so never rename them.

use uuid::Uuid;

/// Client chat sends, after the gateway injected the sender.
pub const CHAT_INCOMING: &str = "chat_incoming";
/// Client read receipts, after the gateway injected the reader.
pub const READ_INCOMING: &str = "read_incoming";

pub const CHAT_OUTGOING: &str = "chat_outgoing";
pub const READ_OUTGOING: &str = "read_outgoing";
pub const ACK: &str = "ack";
pub const NOTIFICATION: &str = "notification";
pub const PRESENCE_OUTGOING: &str = "presence_outgoing";

/// Gateway self-presence (`online` / `offline`), consumed by the subscriber.
pub const PRESENCE_EVENT: &str = "presence_event";

/// Key-store entry holding a user's status while connected.
pub fn status_key(user_id: Uuid) -> String {
    format!("user:status:{user_id}")
}
